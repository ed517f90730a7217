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

use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::component::cells::{RoleCell, TypedActuator, TypedSensor, TypedService};
use crate::message::EnvelopeCodec;
use crate::traits::{Actuator, Message, Sensor, Service};

/// The role a component plays, fixed at descriptor construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRole {
    /// Produces messages from an external source; no message inputs.
    Sensor,
    /// Executes side-effecting actions on request, one reply per request.
    Actuator,
    /// Transforms input messages into derived output messages.
    Service,
}

impl std::fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentRole::Sensor => write!(f, "sensor"),
            ComponentRole::Actuator => write!(f, "actuator"),
            ComponentRole::Service => write!(f, "service"),
        }
    }
}

/// How a service pairs messages across its declared inputs.
///
/// The policy is part of the descriptor, so every service documents its
/// pairing behavior explicitly instead of leaving it implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// One `transform` per arriving message; the frame holds exactly that
    /// message. The natural policy for single-input services.
    #[default]
    PerMessage,
    /// Latest-value join: every arrival updates its slot, and `transform`
    /// runs once per arrival as soon as every declared input has a value,
    /// seeing the latest snapshot of all of them.
    LatestJoin,
}

/// Factory erased over the concrete component type: configuration bytes in,
/// runnable role cell out.
type FactoryFn = Arc<dyn Fn(Option<&[u8]>) -> anyhow::Result<RoleCell> + Send + Sync>;

/// Deferred codec registration for one message type.
type RegisterFn = Arc<dyn Fn(&EnvelopeCodec) + Send + Sync>;

/// Everything a component manager needs to instantiate a component type:
/// its role, its message schema (input tags, output tag), its join policy,
/// and a factory closing over whatever the concrete type needs.
///
/// Descriptors are built with the typed constructors
/// [`ComponentDescriptor::sensor`], [`ComponentDescriptor::actuator`], and
/// [`ComponentDescriptor::service`], which also capture the codec
/// registrations for the role's message types. Registering the descriptor
/// with a [`ComponentRegistry`] applies those registrations.
#[derive(Clone)]
pub struct ComponentDescriptor {
    type_name: String,
    role: ComponentRole,
    inputs: Vec<&'static str>,
    output: &'static str,
    join_policy: JoinPolicy,
    factory: FactoryFn,
    registrations: Vec<RegisterFn>,
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("type_name", &self.type_name)
            .field("role", &self.role)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish()
    }
}

impl ComponentDescriptor {
    /// Describes a sensor type. `build` constructs the sensor from its
    /// (already deserialized) configuration; it runs on the manager's
    /// control task, so open external resources there, not lazily.
    pub fn sensor<S, F>(type_name: &str, build: F) -> Self
    where
        S: Sensor,
        F: Fn(S::Config) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let name_for_errors = type_name.to_string();
        let factory: FactoryFn = Arc::new(move |config_bytes: Option<&[u8]>| {
            let config = decode_config::<S::Config>(&name_for_errors, config_bytes)?;
            Ok(RoleCell::Sensor(Box::new(TypedSensor::new(build(config)?))))
        });
        Self {
            type_name: type_name.to_string(),
            role: ComponentRole::Sensor,
            inputs: Vec::new(),
            output: S::Output::TYPE_TAG,
            join_policy: JoinPolicy::default(),
            factory,
            registrations: vec![
                Arc::new(|codec: &EnvelopeCodec| codec.register::<S::Output>()),
                Arc::new(|codec: &EnvelopeCodec| codec.register::<S::Config>()),
            ],
        }
    }

    /// Describes an actuator type. `build` constructs the actuator from
    /// its configuration.
    pub fn actuator<A, F>(type_name: &str, build: F) -> Self
    where
        A: Actuator,
        F: Fn(A::Config) -> anyhow::Result<A> + Send + Sync + 'static,
    {
        let name_for_errors = type_name.to_string();
        let factory: FactoryFn = Arc::new(move |config_bytes: Option<&[u8]>| {
            let config = decode_config::<A::Config>(&name_for_errors, config_bytes)?;
            Ok(RoleCell::Actuator(Box::new(TypedActuator::new(build(
                config,
            )?))))
        });
        Self {
            type_name: type_name.to_string(),
            role: ComponentRole::Actuator,
            inputs: vec![A::Command::TYPE_TAG],
            output: A::Outcome::TYPE_TAG,
            join_policy: JoinPolicy::default(),
            factory,
            registrations: vec![
                Arc::new(|codec: &EnvelopeCodec| codec.register::<A::Command>()),
                Arc::new(|codec: &EnvelopeCodec| codec.register::<A::Outcome>()),
                Arc::new(|codec: &EnvelopeCodec| codec.register::<A::Config>()),
            ],
        }
    }

    /// Describes a service type. Declare the service's inputs with
    /// [`ComponentDescriptor::with_input`]; a service with no declared
    /// inputs consumes nothing.
    pub fn service<S, F>(type_name: &str, build: F) -> Self
    where
        S: Service,
        F: Fn(S::Config) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let name_for_errors = type_name.to_string();
        let factory: FactoryFn = Arc::new(move |config_bytes: Option<&[u8]>| {
            let config = decode_config::<S::Config>(&name_for_errors, config_bytes)?;
            Ok(RoleCell::Service(Box::new(TypedService::new(build(
                config,
            )?))))
        });
        Self {
            type_name: type_name.to_string(),
            role: ComponentRole::Service,
            inputs: Vec::new(),
            output: S::Output::TYPE_TAG,
            join_policy: JoinPolicy::default(),
            factory,
            registrations: vec![
                Arc::new(|codec: &EnvelopeCodec| codec.register::<S::Output>()),
                Arc::new(|codec: &EnvelopeCodec| codec.register::<S::Config>()),
            ],
        }
    }

    /// Declares message type `M` as an accepted input and captures its
    /// decoder registration. Inputs arrive from the component's own input
    /// topic and from any wired upstream output.
    #[must_use]
    pub fn with_input<M>(mut self) -> Self
    where
        M: Message,
    {
        self.inputs.push(M::TYPE_TAG);
        self.registrations
            .push(Arc::new(|codec: &EnvelopeCodec| codec.register::<M>()));
        self
    }

    /// Sets the pairing policy across this component's declared inputs.
    #[must_use]
    pub fn with_join_policy(mut self, join_policy: JoinPolicy) -> Self {
        self.join_policy = join_policy;
        self
    }

    /// The registered type name.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The component's role.
    #[inline]
    #[must_use]
    pub fn role(&self) -> ComponentRole {
        self.role
    }

    /// Accepted input message type tags.
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[&'static str] {
        &self.inputs
    }

    /// Produced output message type tag.
    #[inline]
    #[must_use]
    pub fn output_tag(&self) -> &'static str {
        self.output
    }

    /// The pairing policy across declared inputs.
    #[inline]
    #[must_use]
    pub fn join_policy(&self) -> JoinPolicy {
        self.join_policy
    }

    /// Builds a runnable cell from configuration bytes.
    pub(crate) fn instantiate(&self, config_bytes: Option<&[u8]>) -> anyhow::Result<RoleCell> {
        (self.factory)(config_bytes)
    }

    /// Applies this descriptor's captured codec registrations.
    pub(crate) fn register_message_types(&self, codec: &EnvelopeCodec) {
        for registration in &self.registrations {
            registration(codec);
        }
    }
}

fn decode_config<C>(type_name: &str, config_bytes: Option<&[u8]>) -> anyhow::Result<C>
where
    C: Message + Default,
{
    match config_bytes {
        Some(bytes) => serde_json::from_slice(bytes)
            .with_context(|| format!("invalid configuration for component type '{type_name}'")),
        None => Ok(C::default()),
    }
}

/// The component types available on a host, registered with its manager at
/// startup.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: Arc<DashMap<String, ComponentDescriptor>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor under its type name, replacing any previous
    /// registration of that name.
    pub fn register(&self, descriptor: ComponentDescriptor) -> &Self {
        if descriptor.role() == ComponentRole::Service && descriptor.inputs().is_empty() {
            warn!(
                component = %descriptor.type_name(),
                "service registered with no declared inputs; it will consume nothing"
            );
        }
        trace!(component = %descriptor.type_name(), role = %descriptor.role(), "descriptor registered");
        self.descriptors
            .insert(descriptor.type_name().to_string(), descriptor);
        self
    }

    /// Builder-style registration for chaining at construction.
    #[must_use]
    pub fn with(self, descriptor: ComponentDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Looks a descriptor up by type name.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<ComponentDescriptor> {
        self.descriptors
            .get(type_name)
            .map(|entry| entry.value().clone())
    }

    /// The registered type names.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Applies every descriptor's codec registrations.
    pub(crate) fn register_message_types(&self, codec: &EnvelopeCodec) {
        for entry in self.descriptors.iter() {
            entry.value().register_message_types(codec);
        }
    }
}
