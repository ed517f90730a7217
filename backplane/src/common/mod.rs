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

//! Common structures: the application context, the message bus, the
//! connector, and framework configuration.

pub use app::BackplaneApp;
pub use bus::{BusError, MessageBus};
pub use config::{
    BackplaneConfig, BehaviorConfig, DefaultsConfig, LimitsConfig, TimeoutConfig, CONFIG,
};
pub use connector::{Connector, PendingReply};
pub use correlator::RequestError;
pub use runtime::HostRuntime;
pub use subscription::Subscription;
pub use types::BoxPayload;

pub(crate) use types::SubscriberId;

mod app;
mod bus;
pub(crate) mod config;
mod connector;
pub(crate) mod correlator;
mod runtime;
mod subscription;
mod types;
