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

//! Component role interfaces.
//!
//! A component is composed from a small capability set rather than built by
//! subclassing: the role trait supplies the computation (`sample`, `execute`,
//! or `transform` plus `shutdown`), while the framework's runner owns the
//! execution loop, the bus subscriptions, and stop handling. The role is
//! selected at descriptor construction
//! ([`ComponentDescriptor`](crate::component::ComponentDescriptor)).
//!
//! Every role carries a `Config` associated type: an immutable parameter
//! bundle deserialized once before the first execution cycle. Components
//! without parameters use [`NoConfig`](crate::traits::NoConfig).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::common::BoxPayload;
use crate::traits::Message;

/// An error raised by a component's own computation.
///
/// These are *remote execution* errors from the caller's point of view: for
/// an actuator they are encoded into the reply envelope and surfaced to the
/// requester, who decides whether to retry. They are never confused with
/// transport failures or timeouts.
#[derive(Debug, Clone)]
pub enum ComponentError {
    /// The action, transform, or sample failed.
    Failed(String),
    /// The external source backing the component misbehaved (camera
    /// unplugged, socket reset).
    Source(String),
}

impl ComponentError {
    /// Convenience constructor for [`ComponentError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Convenience constructor for [`ComponentError::Source`].
    pub fn source(reason: impl Into<String>) -> Self {
        Self::Source(reason.into())
    }
}

impl std::fmt::Display for ComponentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentError::Failed(reason) => write!(f, "component action failed: {reason}"),
            ComponentError::Source(reason) => write!(f, "component source failed: {reason}"),
        }
    }
}

impl std::error::Error for ComponentError {}

/// A component that produces messages by sampling an external source.
///
/// The runner drives `sample` in a loop on the sensor's own task and
/// publishes every produced message to the sensor's output topic. A sensor
/// has no message inputs and terminates only on explicit stop. A blocking
/// source (waiting for a hardware frame) blocks only this sensor's task;
/// pace the loop inside `sample` (a timer, or the source's own cadence).
#[async_trait]
pub trait Sensor: Send + 'static {
    /// The message type this sensor publishes.
    type Output: Message;
    /// Immutable parameter bundle accepted at construction.
    type Config: Message + Default;

    /// Produces the next output message.
    ///
    /// # Errors
    ///
    /// A failed sample is logged by the runner and the loop continues; the
    /// sensor decides internally when a fault is fatal enough to panic.
    async fn sample(&mut self) -> Result<Self::Output, ComponentError>;

    /// Releases any external resource the sensor holds (camera handles,
    /// sockets). Invoked exactly once when the component stops, on both the
    /// normal and the error path.
    async fn shutdown(&mut self) {}
}

/// A component that executes side-effecting actions on request.
///
/// The runner consumes request envelopes from the actuator's input topic and
/// executes them strictly serialized in receipt order — concurrent requests
/// are queued, not parallelized, because the side effects mutate shared
/// external hardware state. Exactly one reply is published per request: the
/// outcome on success, an error indicator when `execute` fails.
#[async_trait]
pub trait Actuator: Send + 'static {
    /// The request payload this actuator accepts.
    type Command: Message;
    /// The reply payload a successful execution produces.
    type Outcome: Message;
    /// Immutable parameter bundle accepted at construction.
    type Config: Message + Default;

    /// Executes one command against the external resource.
    ///
    /// # Errors
    ///
    /// The error is encoded into the reply envelope and propagated to the
    /// awaiting caller as a remote execution error.
    async fn execute(&mut self, command: Self::Command) -> Result<Self::Outcome, ComponentError>;

    /// Releases any external resource the actuator holds. Invoked exactly
    /// once when the component stops.
    async fn shutdown(&mut self) {}
}

/// A pure or semi-pure transform over one or more input streams.
///
/// The runner feeds the service every event arriving on its declared inputs
/// (its own input topic plus any wired upstream outputs) and publishes each
/// produced message to the service's output topic. How multiple inputs pair
/// up is explicit per descriptor via
/// [`JoinPolicy`](crate::component::JoinPolicy), never implicit.
#[async_trait]
pub trait Service: Send + 'static {
    /// The message type this service publishes.
    type Output: Message;
    /// Immutable parameter bundle accepted at construction.
    type Config: Message + Default;

    /// Derives an output from the current input frame. Returning `Ok(None)`
    /// consumes the input without publishing.
    ///
    /// # Errors
    ///
    /// A failed transform is logged by the runner and the input is dropped;
    /// downstream subscribers see nothing for it.
    async fn transform(
        &mut self,
        frame: &InputFrame,
    ) -> Result<Option<Self::Output>, ComponentError>;

    /// Releases any external resource the service holds. Invoked exactly
    /// once when the component stops.
    async fn shutdown(&mut self) {}
}

/// The inputs presented to one [`Service::transform`] invocation, keyed by
/// message type tag.
///
/// Under [`JoinPolicy::PerMessage`](crate::component::JoinPolicy) the frame
/// holds exactly the message that just arrived; under
/// [`JoinPolicy::LatestJoin`](crate::component::JoinPolicy) it holds the
/// latest value of every declared input.
#[derive(Debug, Clone, Default)]
pub struct InputFrame {
    slots: HashMap<&'static str, BoxPayload>,
}

impl InputFrame {
    /// Creates an empty frame.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Creates a frame holding a single payload.
    #[must_use]
    pub(crate) fn single(payload: BoxPayload) -> Self {
        let mut frame = Self::new();
        frame.insert(payload);
        frame
    }

    /// Inserts a payload into its type slot, replacing any previous value.
    pub(crate) fn insert(&mut self, payload: BoxPayload) {
        self.slots.insert(payload.type_tag(), payload);
    }

    /// Returns the slot for message type `M`, if present.
    #[must_use]
    pub fn get<M: Message>(&self) -> Option<&M> {
        self.slots
            .get(M::TYPE_TAG)
            .and_then(|payload| payload.as_any().downcast_ref::<M>())
    }

    /// Whether the frame holds a value for `type_tag`.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.slots.contains_key(type_tag)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the frame is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
