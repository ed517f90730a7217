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

#![forbid(unsafe_code)]

//! # Backplane
//!
//! A component messaging framework for distributed device and service
//! pipelines, built on Tokio. It layers synchronous request/reply and
//! component lifecycle management over an ordered topic-addressed
//! publish/subscribe bus, and composes data-producing and data-consuming
//! components into pipelines without the application relaying messages.
//!
//! ## Key Concepts
//!
//! - **Message Bus ([`MessageBus`](common::MessageBus))**: the lowest
//!   layer — ordered, topic-addressed pub/sub moving typed envelopes.
//! - **Components**: units of computation bound to one host, composed from
//!   a small capability set by role — [`Sensor`](traits::Sensor) (produce),
//!   [`Actuator`](traits::Actuator) (execute on request),
//!   [`Service`](traits::Service) (transform).
//! - **Connector ([`Connector`](common::Connector))**: the client-side
//!   handle to a (possibly remote) component, adding fire-and-forget
//!   sends, request/reply correlation, callbacks, and pipeline wiring.
//! - **Component Manager ([`ComponentManager`](component::ComponentManager))**:
//!   the per-host supervisor registering component types and driving
//!   instance lifecycles.
//! - **Topics ([`Topic`](message::Topic))**: deterministic
//!   `{type}:{host}[:{instance}]` addresses, derivable by any party that
//!   knows the triple.
//! - **Runtime ([`HostRuntime`](common::HostRuntime))**: the explicit
//!   application context constructed once by
//!   [`BackplaneApp`](common::BackplaneApp) and torn down by the caller.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use backplane::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = BackplaneApp::launch();
//!
//!     let registry = ComponentRegistry::new()
//!         .with(ComponentDescriptor::sensor::<CameraSensor, _>("camera", |conf| {
//!             CameraSensor::open(conf)
//!         }));
//!     ComponentManager::start(&runtime, registry).await?;
//!
//!     let camera = Connector::attach(&runtime, "camera", runtime.host_id()).await?;
//!     let _frames = camera.register_callback(|frame: FrameCaptured| {
//!         println!("frame {}", frame.sequence);
//!     })?;
//!
//!     runtime.shutdown_all().await
//! }
//! ```

/// Common structures: application context, bus, connector, configuration.
pub(crate) mod common;

/// Component machinery: descriptors, registry, runner, manager.
pub(crate) mod component;

/// Wire-level types: topics, envelopes, codec, control directives.
pub(crate) mod message;

/// Core trait definitions: the message contract and component roles.
pub(crate) mod traits;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait): the macro for defining async
///     functions in traits, used by the component role interfaces.
///
/// ## Core Types
/// *   [`crate::common::BackplaneApp`]: entry point for initializing the runtime.
/// *   [`crate::common::HostRuntime`]: the explicit application context.
/// *   [`crate::common::MessageBus`]: the ordered topic pub/sub hub.
/// *   [`crate::common::Subscription`]: teardown handle for one subscription.
/// *   [`crate::common::Connector`]: client-side handle to a component.
/// *   [`crate::common::PendingReply`]: handle to a detached request's reply.
/// *   [`crate::common::BackplaneConfig`]: framework tuning configuration.
/// *   [`crate::common::BusError`] / [`crate::common::RequestError`]: transport
///     and request failure taxonomies.
/// *   [`crate::component::ComponentDescriptor`]: how a component type is built.
/// *   [`crate::component::ComponentRegistry`]: the types available on a host.
/// *   [`crate::component::ComponentManager`]: the per-host supervisor.
/// *   [`crate::component::ComponentRole`] / [`crate::component::JoinPolicy`]:
///     role selection and multi-input pairing.
/// *   [`crate::message::Topic`] / [`crate::message::WireEnvelope`] /
///     [`crate::message::EnvelopeKind`] / [`crate::message::EnvelopeCodec`]:
///     addressing and the wire model.
/// *   [`crate::traits::Message`] / [`crate::traits::Payload`]: the message
///     contract.
/// *   [`crate::traits::Sensor`] / [`crate::traits::Actuator`] /
///     [`crate::traits::Service`]: the component role interfaces.
/// *   [`crate::traits::InputFrame`] / [`crate::traits::ComponentError`] /
///     [`crate::traits::NoConfig`]: role support types.
pub mod prelude {
    // External crate re-exports
    pub use async_trait::async_trait;

    // Core types
    pub use crate::common::{
        BackplaneApp, BackplaneConfig, BusError, Connector, HostRuntime, MessageBus, PendingReply,
        RequestError, Subscription,
    };
    pub use crate::component::{
        ComponentDescriptor, ComponentManager, ComponentRegistry, ComponentRole, JoinPolicy,
        ManagerError,
    };
    pub use crate::message::{
        decode_typed, EnvelopeCodec, EnvelopeKind, MessageError, RequestId, Topic, WireEnvelope,
    };
    pub use crate::traits::{
        Actuator, ComponentError, InputFrame, Message, NoConfig, Payload, Sensor, Service,
    };
}
