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

//! Control directives served by a [`ComponentManager`](crate::component::ComponentManager).
//!
//! Directives travel as ordinary request envelopes on the manager's control
//! topic (`manager:{host}`), out-of-band from steady-state data flow. Each
//! request type has exactly one reply type.

use serde::{Deserialize, Serialize};

use crate::message::{EnvelopeCodec, Topic};
use crate::traits::Message;

/// Asks the host manager to start the named component type, or to attach to
/// it when an instance for the derived topic is already running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartComponentRequest {
    /// Registered component type name.
    pub type_name: String,
    /// Optional instance qualifier for multi-instance components.
    pub instance: Option<String>,
    /// Serialized configuration bundle, applied once before the component's
    /// first execution cycle. Ignored when attaching to a running instance;
    /// reconfiguration requires a restart.
    pub config: Option<Vec<u8>>,
}

impl Message for StartComponentRequest {
    const TYPE_TAG: &'static str = "backplane.manager.start";
}

/// Reply to [`StartComponentRequest`]: the deterministic topics of the
/// running instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartComponentReply {
    /// Topic the component consumes from.
    pub input_topic: Topic,
    /// Topic the component publishes to.
    pub output_topic: Topic,
    /// `true` when an already-running instance was reused.
    pub attached: bool,
}

impl Message for StartComponentReply {
    const TYPE_TAG: &'static str = "backplane.manager.started";
}

/// Asks the host manager to stop the instance bound to `topic`. Stopping is
/// idempotent: a second stop acknowledges without effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopComponentRequest {
    /// The instance's input topic.
    pub topic: Topic,
}

impl Message for StopComponentRequest {
    const TYPE_TAG: &'static str = "backplane.manager.stop";
}

/// Asks the host manager to subscribe `component`'s input to an upstream
/// component's output topic, establishing a pipeline edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireInputRequest {
    /// Input topic of the downstream component.
    pub component: Topic,
    /// Output topic of the upstream component.
    pub source_output: Topic,
}

impl Message for WireInputRequest {
    const TYPE_TAG: &'static str = "backplane.manager.wire";
}

/// Reverses an earlier [`WireInputRequest`] without restarting either end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwireInputRequest {
    /// Input topic of the downstream component.
    pub component: Topic,
    /// Output topic of the upstream component.
    pub source_output: Topic,
}

impl Message for UnwireInputRequest {
    const TYPE_TAG: &'static str = "backplane.manager.unwire";
}

/// Liveness probe; a reachable manager answers with [`PongReply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest;

impl Message for PingRequest {
    const TYPE_TAG: &'static str = "backplane.manager.ping";
}

/// Reply to [`PingRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongReply {
    /// The answering manager's host identity.
    pub host: String,
}

impl Message for PongReply {
    const TYPE_TAG: &'static str = "backplane.manager.pong";
}

/// Bare acknowledgement reply for directives with no result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack;

impl Message for Ack {
    const TYPE_TAG: &'static str = "backplane.manager.ack";
}

/// Registers every built-in directive type with the codec. Called once at
/// application launch.
pub(crate) fn register_builtin(codec: &EnvelopeCodec) {
    codec.register::<StartComponentRequest>();
    codec.register::<StartComponentReply>();
    codec.register::<StopComponentRequest>();
    codec.register::<WireInputRequest>();
    codec.register::<UnwireInputRequest>();
    codec.register::<PingRequest>();
    codec.register::<PongReply>();
    codec.register::<Ack>();
}
