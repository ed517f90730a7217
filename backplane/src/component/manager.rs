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

use dashmap::DashMap;
use parking_lot::Mutex;
use static_assertions::assert_impl_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::common::{HostRuntime, LimitsConfig, MessageBus, Subscription};
use crate::component::descriptor::{ComponentDescriptor, ComponentRegistry, ComponentRole};
use crate::component::runner::{ComponentRunner, RunnerCommand};
use crate::message::directive::{
    Ack, PingRequest, PongReply, StartComponentReply, StartComponentRequest, StopComponentRequest,
    UnwireInputRequest, WireInputRequest,
};
use crate::message::{
    decode_typed, EnvelopeCodec, EnvelopeKind, MessageError, RequestId, Topic, WireEnvelope,
};
use crate::traits::Message;

/// Errors raised by component lifecycle operations.
#[derive(Debug)]
pub enum ManagerError {
    /// Fatal startup condition: the manager could not come up at all
    /// (duplicate manager for the host, bus unavailable).
    StartupFailed(String),
    /// A start directive named a type this host has not registered.
    UnknownComponentType(String),
    /// The component's factory rejected instantiation.
    FactoryFailed(String),
    /// A directive addressed an instance that is not running.
    NoSuchInstance(String),
    /// A directive was structurally valid but not executable (reserved
    /// type name, wiring a sensor).
    InvalidDirective(String),
}

impl std::fmt::Display for ManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerError::StartupFailed(reason) => {
                write!(f, "component manager startup failed: {reason}")
            }
            ManagerError::UnknownComponentType(name) => {
                write!(f, "unknown component type '{name}'")
            }
            ManagerError::FactoryFailed(reason) => {
                write!(f, "component factory failed: {reason}")
            }
            ManagerError::NoSuchInstance(topic) => {
                write!(f, "no running component instance at '{topic}'")
            }
            ManagerError::InvalidDirective(reason) => write!(f, "invalid directive: {reason}"),
        }
    }
}

impl std::error::Error for ManagerError {}

/// The per-host supervisor of component instances.
///
/// One manager serves each host. It owns the registry of component types
/// available there, serves start/stop/wire/ping directives on its control
/// topic (`manager:{host}`), and supervises the instances it started:
/// a crashed instance is detected and removed so pending requests against
/// it time out instead of hanging, and shutdown stops all owned instances
/// in reverse start order, each releasing its external resources before
/// the manager itself exits.
///
/// The manager takes no part in steady-state message flow — once a
/// component is running, connectors talk to it directly over the bus.
#[derive(Clone)]
pub struct ComponentManager {
    inner: Arc<ManagerInner>,
}

assert_impl_all!(ComponentManager: Send, Sync);

struct ManagerInner {
    host: String,
    control_topic: Topic,
    registry: ComponentRegistry,
    bus: MessageBus,
    codec: Arc<EnvelopeCodec>,
    /// Running instances keyed by rendered input topic.
    instances: DashMap<String, InstanceRecord>,
    /// Keys in start order, for reverse-order shutdown.
    start_order: Mutex<Vec<String>>,
    /// Cancelled when the manager shuts down.
    cancel: CancellationToken,
    /// Tracks the control loop and instance watchers.
    tracker: TaskTracker,
    /// The control topic subscription, cancelled at shutdown.
    control_subscription: Mutex<Option<Subscription>>,
    limits: LimitsConfig,
    shutdown_timeout: std::time::Duration,
}

struct InstanceRecord {
    type_name: String,
    role: ComponentRole,
    input_topic: Topic,
    output_topic: Topic,
    commands: mpsc::Sender<RunnerCommand>,
    /// Cancelling stops the instance's loop.
    cancel: CancellationToken,
    /// Cancelled by the watcher once the instance's task has fully
    /// finished (shutdown hook included).
    done: CancellationToken,
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("host", &self.inner.host)
            .field("instances", &self.inner.instances.len())
            .finish()
    }
}

impl ComponentManager {
    /// Starts the component manager for this runtime's host and registers
    /// it with the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::StartupFailed`] when a manager already
    /// serves this host, the host identity does not form a valid topic, or
    /// the control topic cannot be bound. Startup failures are fatal by
    /// design: a half-reachable manager is worse than none.
    #[instrument(skip(runtime, registry), fields(host = %runtime.host_id()))]
    pub async fn start(
        runtime: &HostRuntime,
        registry: ComponentRegistry,
    ) -> Result<Self, ManagerError> {
        let host = runtime.host_id().to_string();
        if runtime.0.managers.contains_key(&host) {
            return Err(ManagerError::StartupFailed(format!(
                "a component manager is already serving host '{host}'"
            )));
        }
        let control_topic = Topic::manager(&host)
            .map_err(|error| ManagerError::StartupFailed(error.to_string()))?;

        // Every message type the registered components speak becomes
        // decodable before the first instance starts.
        registry.register_message_types(runtime.codec());

        let (control_subscription, control_rx) = runtime
            .bus()
            .subscribe(&control_topic)
            .map_err(|error| {
                ManagerError::StartupFailed(format!("cannot bind control topic: {error}"))
            })?;

        let inner = Arc::new(ManagerInner {
            host: host.clone(),
            control_topic,
            registry,
            bus: runtime.bus().clone(),
            codec: runtime.codec().clone(),
            instances: DashMap::new(),
            start_order: Mutex::new(Vec::new()),
            cancel: runtime.0.cancellation_token.child_token(),
            tracker: TaskTracker::new(),
            control_subscription: Mutex::new(Some(control_subscription)),
            limits: runtime.config().limits.clone(),
            shutdown_timeout: runtime.config().component_shutdown(),
        });
        let manager = Self { inner };

        manager.inner.tracker.spawn({
            let manager = manager.clone();
            async move { manager.control_loop(control_rx).await }
        });

        runtime.0.managers.insert(host.clone(), manager.clone());
        info!(host = %host, types = manager.inner.registry.len(), "component manager started");
        Ok(manager)
    }

    /// The host this manager serves.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// The manager's control topic.
    #[inline]
    #[must_use]
    pub fn control_topic(&self) -> &Topic {
        &self.inner.control_topic
    }

    /// Number of component instances currently running on this host.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.instances.len()
    }

    /// Stops all owned component instances in reverse start order, then
    /// the manager itself. Idempotent; per-instance failures are logged
    /// and never stall the remaining sequence.
    #[instrument(skip(self), fields(host = %self.inner.host))]
    pub async fn shutdown(&self) {
        if self.inner.cancel.is_cancelled() {
            trace!("manager already shut down");
            return;
        }
        info!(instances = self.inner.instances.len(), "component manager shutting down");

        let order: Vec<String> = {
            let mut start_order = self.inner.start_order.lock();
            let snapshot = start_order.clone();
            start_order.clear();
            snapshot
        };
        for key in order.into_iter().rev() {
            let Some((_, record)) = self.inner.instances.remove(&key) else {
                continue;
            };
            debug!(component = %record.type_name, topic = %key, "stopping component");
            record.cancel.cancel();
            if tokio::time::timeout(self.inner.shutdown_timeout, record.done.cancelled())
                .await
                .is_err()
            {
                error!(
                    component = %record.type_name,
                    topic = %key,
                    "component did not stop within {}ms; continuing shutdown",
                    self.inner.shutdown_timeout.as_millis()
                );
            }
        }

        if let Some(subscription) = self.inner.control_subscription.lock().take() {
            subscription.cancel();
        }
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        if tokio::time::timeout(self.inner.shutdown_timeout, self.inner.tracker.wait())
            .await
            .is_err()
        {
            error!("manager tasks did not finish in time");
        }
        info!("component manager stopped");
    }

    /// Serves control directives until shutdown.
    async fn control_loop(self, mut control_rx: mpsc::Receiver<WireEnvelope>) {
        loop {
            tokio::select! {
                () = self.inner.cancel.cancelled() => break,
                maybe = control_rx.recv() => {
                    let Some(envelope) = maybe else { break };
                    self.handle_directive(envelope).await;
                }
            }
        }
        trace!(host = %self.inner.host, "control loop finished");
    }

    /// Decodes and executes one control directive, publishing exactly one
    /// reply. Malformed directives are dropped and logged — the requester
    /// times out rather than receiving a guessed answer.
    async fn handle_directive(&self, envelope: WireEnvelope) {
        let EnvelopeKind::Request {
            request_id,
            reply_topic,
        } = envelope.kind.clone()
        else {
            trace!(type_tag = %envelope.type_tag, "non-request traffic on control topic; dropped");
            return;
        };

        let tag = envelope.type_tag.as_str();
        let reply = if tag == StartComponentRequest::TYPE_TAG {
            match decode_directive::<StartComponentRequest>(&envelope) {
                Some(request) => reply_from(self.start_component(request).await, request_id),
                None => return,
            }
        } else if tag == StopComponentRequest::TYPE_TAG {
            match decode_directive::<StopComponentRequest>(&envelope) {
                Some(request) => reply_from(self.stop_component(&request.topic).await, request_id),
                None => return,
            }
        } else if tag == WireInputRequest::TYPE_TAG {
            match decode_directive::<WireInputRequest>(&envelope) {
                Some(request) => reply_from(
                    self.rewire(&request.component, RunnerCommand::WireSource(request.source_output))
                        .await,
                    request_id,
                ),
                None => return,
            }
        } else if tag == UnwireInputRequest::TYPE_TAG {
            match decode_directive::<UnwireInputRequest>(&envelope) {
                Some(request) => reply_from(
                    self.rewire(
                        &request.component,
                        RunnerCommand::UnwireSource(request.source_output),
                    )
                    .await,
                    request_id,
                ),
                None => return,
            }
        } else if tag == PingRequest::TYPE_TAG {
            reply_from(
                Ok::<_, ManagerError>(PongReply {
                    host: self.inner.host.clone(),
                }),
                request_id,
            )
        } else {
            warn!(type_tag = %tag, "unknown directive type; dropped");
            return;
        };

        match reply {
            Ok(reply_envelope) => {
                if let Err(error) = self.inner.bus.publish(&reply_topic, reply_envelope) {
                    warn!(%error, "directive reply publish failed");
                }
            }
            Err(error) => error!(%error, "failed to encode directive reply"),
        }
    }

    /// Get-or-create semantics: the first start directive for a triple
    /// instantiates the component; later ones attach to the running
    /// instance. Configuration supplied on attach has no effect — a
    /// component wanting different configuration must be restarted.
    async fn start_component(
        &self,
        request: StartComponentRequest,
    ) -> Result<StartComponentReply, ManagerError> {
        if matches!(
            request.type_name.as_str(),
            crate::message::topic::MANAGER_SEGMENT | crate::message::topic::CONNECTOR_SEGMENT
        ) {
            return Err(ManagerError::InvalidDirective(format!(
                "'{}' is a reserved component type name",
                request.type_name
            )));
        }
        let descriptor = self
            .inner
            .registry
            .get(&request.type_name)
            .ok_or_else(|| ManagerError::UnknownComponentType(request.type_name.clone()))?;

        let input_topic = match request.instance.as_deref() {
            Some(instance) => Topic::with_instance(&request.type_name, &self.inner.host, instance),
            None => Topic::new(&request.type_name, &self.inner.host),
        }
        .map_err(|error| ManagerError::InvalidDirective(error.to_string()))?;
        let key = input_topic.to_string();

        if let Some(existing) = self.inner.instances.get(&key) {
            if request.config.is_some() {
                debug!(
                    component = %request.type_name,
                    "configuration on attach ignored; the instance keeps the configuration it started with"
                );
            }
            return Ok(StartComponentReply {
                input_topic: existing.input_topic.clone(),
                output_topic: existing.output_topic.clone(),
                attached: true,
            });
        }

        self.spawn_instance(&descriptor, request, input_topic, key)
    }

    /// Instantiates and launches one component instance, registering a
    /// watcher that detects crashes.
    fn spawn_instance(
        &self,
        descriptor: &ComponentDescriptor,
        request: StartComponentRequest,
        input_topic: Topic,
        key: String,
    ) -> Result<StartComponentReply, ManagerError> {
        let cell = descriptor
            .instantiate(request.config.as_deref())
            .map_err(|error| {
                ManagerError::FactoryFailed(format!("{}: {error:#}", request.type_name))
            })?;

        let output_topic = input_topic.output();
        let cancel = self.inner.cancel.child_token();
        let done = CancellationToken::new();
        let (command_tx, command_rx) =
            mpsc::channel(self.inner.limits.runner_command_capacity.max(1));

        let runner = ComponentRunner {
            type_name: request.type_name.clone(),
            input_topic: input_topic.clone(),
            output_topic: output_topic.clone(),
            cell,
            join_policy: descriptor.join_policy(),
            declared_inputs: descriptor.inputs().to_vec(),
            bus: self.inner.bus.clone(),
            codec: self.inner.codec.clone(),
            cancel: cancel.clone(),
            commands: command_rx,
            actuator_queue_depth: self.inner.limits.actuator_queue_depth.max(1),
            ingress_capacity: self.inner.limits.subscriber_buffer.max(1),
        };
        let instance_task = tokio::spawn(runner.run());

        self.inner.tracker.spawn({
            let inner = self.inner.clone();
            let key = key.clone();
            let type_name = request.type_name.clone();
            let done = done.clone();
            async move {
                match instance_task.await {
                    Ok(()) => trace!(component = %type_name, "instance task finished"),
                    Err(join_error) if join_error.is_panic() => {
                        error!(
                            component = %type_name,
                            topic = %key,
                            "component crashed; instance marked unavailable"
                        );
                        inner.instances.remove(&key);
                        inner.start_order.lock().retain(|entry| entry != &key);
                    }
                    Err(_) => trace!(component = %type_name, "instance task cancelled"),
                }
                done.cancel();
            }
        });

        self.inner.instances.insert(
            key.clone(),
            InstanceRecord {
                type_name: request.type_name.clone(),
                role: descriptor.role(),
                input_topic: input_topic.clone(),
                output_topic: output_topic.clone(),
                commands: command_tx,
                cancel,
                done,
            },
        );
        self.inner.start_order.lock().push(key);
        info!(component = %request.type_name, topic = %input_topic, "component started");

        Ok(StartComponentReply {
            input_topic,
            output_topic,
            attached: false,
        })
    }

    /// Idempotent stop of one instance: the second stop acknowledges
    /// without effect, and resources are released exactly once.
    async fn stop_component(&self, topic: &Topic) -> Result<Ack, ManagerError> {
        let key = topic.to_string();
        let Some((_, record)) = self.inner.instances.remove(&key) else {
            debug!(topic = %key, "stop for an instance that is not running; acknowledged");
            return Ok(Ack);
        };
        self.inner.start_order.lock().retain(|entry| entry != &key);
        debug!(component = %record.type_name, topic = %key, "stopping component");
        record.cancel.cancel();
        if tokio::time::timeout(self.inner.shutdown_timeout, record.done.cancelled())
            .await
            .is_err()
        {
            error!(
                component = %record.type_name,
                topic = %key,
                "component did not stop within {}ms",
                self.inner.shutdown_timeout.as_millis()
            );
        }
        Ok(Ack)
    }

    /// Forwards a wire/unwire command to a running instance.
    async fn rewire(&self, component: &Topic, command: RunnerCommand) -> Result<Ack, ManagerError> {
        let key = component.to_string();
        let (commands, role) = {
            let record = self
                .inner
                .instances
                .get(&key)
                .ok_or_else(|| ManagerError::NoSuchInstance(key.clone()))?;
            (record.commands.clone(), record.role)
        };
        if role == ComponentRole::Sensor {
            return Err(ManagerError::InvalidDirective(
                "sensors take no inputs".to_string(),
            ));
        }
        commands
            .send(command)
            .await
            .map_err(|_| ManagerError::NoSuchInstance(key))?;
        Ok(Ack)
    }
}

/// Decodes a directive payload, dropping (with a log line) anything
/// malformed so the requester times out instead of receiving a guess.
fn decode_directive<M>(envelope: &WireEnvelope) -> Option<M>
where
    M: Message,
{
    match decode_typed::<M>(envelope) {
        Ok(directive) => Some(directive),
        Err(error) => {
            warn!(type_tag = %envelope.type_tag, %error, "malformed directive dropped");
            None
        }
    }
}

/// Encodes a directive outcome as its reply envelope: the payload on
/// success, an error reply carrying the reason otherwise.
fn reply_from<R>(
    outcome: Result<R, ManagerError>,
    request_id: RequestId,
) -> Result<WireEnvelope, MessageError>
where
    R: Message,
{
    match outcome {
        Ok(payload) => WireEnvelope::reply(&payload, request_id),
        Err(error) => Ok(WireEnvelope::reply_error(request_id, &error.to_string())),
    }
}
