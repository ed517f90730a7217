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

//! Wire-level types: topic addressing, envelopes, the codec, and the
//! control directives served by component managers.

pub use codec::{decode_typed, EnvelopeCodec};
pub use directive::{
    Ack, PingRequest, PongReply, StartComponentReply, StartComponentRequest, StopComponentRequest,
    UnwireInputRequest, WireInputRequest,
};
pub use envelope::{monotonic_stamp, EnvelopeKind, RequestId, WireEnvelope, ERROR_TYPE_TAG};
pub use message_error::MessageError;
pub use topic::Topic;

mod codec;
pub(crate) mod directive;
mod envelope;
mod message_error;
pub(crate) mod topic;
