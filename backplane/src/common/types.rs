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

//! Common type aliases used throughout the framework.

use uuid::Uuid;

use crate::traits::Payload;

/// A type-erased message payload.
///
/// [`Payload`]'s supertraits guarantee the box is `Send + Sync` and
/// cloneable as a trait object.
pub type BoxPayload = Box<dyn Payload>;

/// Identifier of a single bus subscription.
pub(crate) type SubscriberId = Uuid;
