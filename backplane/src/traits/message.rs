/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
use std::any::Any;
use std::fmt::Debug;

use dyn_clone::DynClone;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message::MessageError;

/// The typed message contract: every value that crosses the bus implements
/// this trait.
///
/// A message is a closed, fixed-schema record identified by a stable
/// [`TYPE_TAG`](Message::TYPE_TAG) that must not change across processes or
/// versions — it is the dispatch key on the receiving side. Messages are
/// immutable once constructed and must be cheap to clone.
///
/// # Example
///
/// ```rust,ignore
/// use backplane::prelude::*;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct FrameCaptured {
///     sequence: u64,
///     jpeg: Vec<u8>,
/// }
///
/// impl Message for FrameCaptured {
///     const TYPE_TAG: &'static str = "camera.frame";
/// }
/// ```
pub trait Message:
    Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static
{
    /// Stable identifier of this message type on the wire.
    const TYPE_TAG: &'static str;
}

/// Object-safe, type-erased view of a [`Message`].
///
/// The framework moves payloads around as `Box<dyn Payload>` wherever the
/// concrete type is only known at runtime (service input frames, codec
/// output). A blanket implementation covers every `Message`, so user code
/// never implements this trait directly; it recovers concrete types with
/// [`Payload::as_any`] and `downcast_ref`.
pub trait Payload: DynClone + Any + Send + Sync + Debug {
    /// The stable type tag of the underlying message.
    fn type_tag(&self) -> &'static str;

    /// Returns the payload as a dynamic [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Serializes the underlying message into envelope bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SerializeFailed`] on serializer failure.
    fn to_bytes(&self) -> Result<Vec<u8>, MessageError>;
}

// Implement DynClone for the trait object itself.
dyn_clone::clone_trait_object!(Payload);

/// Blanket implementation: every [`Message`] is a [`Payload`].
impl<T> Payload for T
where
    T: Message,
{
    #[inline]
    fn type_tag(&self) -> &'static str {
        T::TYPE_TAG
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::SerializeFailed(e.to_string()))
    }
}

/// Configuration bundle for components that take no parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoConfig;

impl Message for NoConfig {
    const TYPE_TAG: &'static str = "backplane.config.none";
}
