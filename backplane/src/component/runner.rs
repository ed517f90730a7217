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

//! The role-agnostic execution loop behind every running component
//! instance.
//!
//! A runner owns the instance's task, its bus subscriptions, and its
//! command channel. It guarantees the lifecycle contract: the loop starts
//! on its own task, stop is signalled through a cancellation token, queued
//! actuator requests are answered with errors instead of left hanging, and
//! the role's `shutdown` runs exactly once after the loop exits — on the
//! normal path and the error path alike.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::common::{BusError, MessageBus, Subscription};
use crate::component::cells::{ActuatorCell, RoleCell, SensorCell, ServiceCell};
use crate::component::JoinPolicy;
use crate::message::{EnvelopeCodec, EnvelopeKind, Topic, WireEnvelope};
use crate::traits::InputFrame;

/// Control-plane commands a manager forwards to a running instance.
#[derive(Debug)]
pub(crate) enum RunnerCommand {
    /// Subscribe the instance's input to an upstream output topic.
    WireSource(Topic),
    /// Tear the matching upstream subscription down.
    UnwireSource(Topic),
}

/// One component instance, ready to run.
pub(crate) struct ComponentRunner {
    pub(crate) type_name: String,
    pub(crate) input_topic: Topic,
    pub(crate) output_topic: Topic,
    pub(crate) cell: RoleCell,
    pub(crate) join_policy: JoinPolicy,
    pub(crate) declared_inputs: Vec<&'static str>,
    pub(crate) bus: MessageBus,
    pub(crate) codec: Arc<EnvelopeCodec>,
    pub(crate) cancel: CancellationToken,
    pub(crate) commands: mpsc::Receiver<RunnerCommand>,
    pub(crate) actuator_queue_depth: usize,
    pub(crate) ingress_capacity: usize,
}

/// The immutable parts of a runner, shared by the role loops.
struct RunnerShared {
    type_name: String,
    input_topic: Topic,
    output_topic: Topic,
    bus: MessageBus,
    codec: Arc<EnvelopeCodec>,
    join_policy: JoinPolicy,
    declared_inputs: Vec<&'static str>,
    ingress_capacity: usize,
    actuator_queue_depth: usize,
}

impl ComponentRunner {
    /// Drives the instance until its cancellation token fires, then runs
    /// the role's shutdown exactly once.
    pub(crate) async fn run(self) {
        let Self {
            type_name,
            input_topic,
            output_topic,
            cell,
            join_policy,
            declared_inputs,
            bus,
            codec,
            cancel,
            commands,
            actuator_queue_depth,
            ingress_capacity,
        } = self;
        let shared = RunnerShared {
            type_name,
            input_topic,
            output_topic,
            bus,
            codec,
            join_policy,
            declared_inputs,
            ingress_capacity,
            actuator_queue_depth,
        };
        debug!(component = %shared.type_name, topic = %shared.input_topic, "component loop starting");
        match cell {
            RoleCell::Sensor(cell) => run_sensor(cell, commands, cancel, &shared).await,
            RoleCell::Actuator(cell) => run_actuator(cell, commands, cancel, &shared).await,
            RoleCell::Service(cell) => run_service(cell, commands, cancel, &shared).await,
        }
        debug!(component = %shared.type_name, topic = %shared.input_topic, "component stopped");
    }
}

/// Sensor loop: sample, publish, repeat. No message inputs; terminates only
/// on stop. A blocking sample blocks only this task.
async fn run_sensor(
    mut cell: Box<dyn SensorCell>,
    mut commands: mpsc::Receiver<RunnerCommand>,
    cancel: CancellationToken,
    shared: &RunnerShared,
) {
    loop {
        tokio::select! {
            // Stop must win over further sampling.
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => {
                    warn!(component = %shared.type_name, ?command, "sensors take no inputs; command ignored");
                }
                None => break,
            },
            sampled = cell.sample_event() => match sampled {
                Ok(envelope) => {
                    if let Err(error) = shared.bus.publish(&shared.output_topic, envelope) {
                        warn!(component = %shared.type_name, %error, "output publish failed");
                        if matches!(error, BusError::Unavailable) {
                            break;
                        }
                    }
                }
                Err(error) => {
                    warn!(component = %shared.type_name, %error, "sample failed; continuing");
                }
            },
        }
    }
    cell.shutdown().await;
}

/// Actuator loop: requests execute strictly serialized in receipt order.
/// The input subscription's bounded buffer is the FIFO queue; on stop,
/// queued requests are drained and answered with error replies so no
/// caller hangs on a stopped component.
async fn run_actuator(
    mut cell: Box<dyn ActuatorCell>,
    mut commands: mpsc::Receiver<RunnerCommand>,
    cancel: CancellationToken,
    shared: &RunnerShared,
) {
    let (own_subscription, mut ingress) = match shared
        .bus
        .subscribe_buffered(&shared.input_topic, shared.actuator_queue_depth)
    {
        Ok(bound) => bound,
        Err(error) => {
            tracing::error!(component = %shared.type_name, %error, "cannot bind input topic");
            cell.shutdown().await;
            return;
        }
    };
    let (forward, mut wired) = mpsc::channel::<WireEnvelope>(shared.ingress_capacity);
    let mut sources: HashMap<String, Subscription> = HashMap::new();

    loop {
        tokio::select! {
            // Stop must win over queued requests so they drain to error
            // replies instead of executing against a stopping resource.
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(RunnerCommand::WireSource(topic)) => {
                    wire_source(&mut sources, shared, &forward, &topic);
                }
                Some(RunnerCommand::UnwireSource(topic)) => {
                    unwire_source(&mut sources, shared, &topic);
                }
                None => break,
            },
            maybe = ingress.recv() => {
                let Some(envelope) = maybe else { break };
                execute_one(&mut cell, shared, envelope).await;
            }
            maybe = wired.recv() => {
                let Some(envelope) = maybe else { break };
                execute_one(&mut cell, shared, envelope).await;
            }
        }
    }

    // Unexecuted queued requests resolve to errors, never hang.
    while let Ok(envelope) = ingress.try_recv() {
        if let EnvelopeKind::Request {
            request_id,
            reply_topic,
        } = &envelope.kind
        {
            let reply =
                WireEnvelope::reply_error(*request_id, "component stopped before the request was executed");
            if shared.bus.publish(reply_topic, reply).is_err() {
                trace!(component = %shared.type_name, "bus gone while draining queued requests");
            }
        }
    }

    drop(own_subscription);
    for (_, subscription) in sources.drain() {
        subscription.cancel();
    }
    cell.shutdown().await;
}

async fn execute_one(
    cell: &mut Box<dyn ActuatorCell>,
    shared: &RunnerShared,
    envelope: WireEnvelope,
) {
    match cell.execute_envelope(&envelope).await {
        Ok(Some(reply)) => {
            let EnvelopeKind::Request { reply_topic, .. } = &envelope.kind else {
                return;
            };
            if let Err(error) = shared.bus.publish(reply_topic, reply) {
                warn!(component = %shared.type_name, %error, "reply publish failed");
            }
        }
        Ok(None) => {}
        Err(error) => {
            warn!(component = %shared.type_name, %error, "input envelope dropped");
        }
    }
}

/// Service loop: every event arriving on the declared inputs — own input
/// topic or wired upstream outputs — feeds the transform according to the
/// join policy, and each produced message goes out on the output topic.
async fn run_service(
    mut cell: Box<dyn ServiceCell>,
    mut commands: mpsc::Receiver<RunnerCommand>,
    cancel: CancellationToken,
    shared: &RunnerShared,
) {
    let (own_subscription, mut ingress) = match shared.bus.subscribe(&shared.input_topic) {
        Ok(bound) => bound,
        Err(error) => {
            tracing::error!(component = %shared.type_name, %error, "cannot bind input topic");
            cell.shutdown().await;
            return;
        }
    };
    let (forward, mut wired) = mpsc::channel::<WireEnvelope>(shared.ingress_capacity);
    let mut sources: HashMap<String, Subscription> = HashMap::new();
    let mut latest = InputFrame::new();

    loop {
        tokio::select! {
            // Stop and rewiring must win over buffered input.
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(RunnerCommand::WireSource(topic)) => {
                    wire_source(&mut sources, shared, &forward, &topic);
                }
                Some(RunnerCommand::UnwireSource(topic)) => {
                    unwire_source(&mut sources, shared, &topic);
                }
                None => break,
            },
            maybe = ingress.recv() => {
                let Some(envelope) = maybe else { break };
                transform_one(&mut cell, shared, &mut latest, envelope).await;
            }
            maybe = wired.recv() => {
                let Some(envelope) = maybe else { break };
                transform_one(&mut cell, shared, &mut latest, envelope).await;
            }
        }
    }

    drop(own_subscription);
    for (_, subscription) in sources.drain() {
        subscription.cancel();
    }
    cell.shutdown().await;
}

async fn transform_one(
    cell: &mut Box<dyn ServiceCell>,
    shared: &RunnerShared,
    latest: &mut InputFrame,
    envelope: WireEnvelope,
) {
    if !matches!(envelope.kind, EnvelopeKind::Event) {
        trace!(component = %shared.type_name, "services consume events only; envelope dropped");
        return;
    }
    let payload = match shared.codec.decode(&envelope) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(component = %shared.type_name, %error, "undecodable input dropped");
            return;
        }
    };
    let type_tag = payload.type_tag();
    if !shared.declared_inputs.iter().any(|tag| *tag == type_tag) {
        trace!(component = %shared.type_name, type_tag, "payload is not a declared input; dropped");
        return;
    }
    let frame = match shared.join_policy {
        JoinPolicy::PerMessage => InputFrame::single(payload),
        JoinPolicy::LatestJoin => {
            latest.insert(payload);
            if !shared
                .declared_inputs
                .iter()
                .all(|tag| latest.contains(tag))
            {
                // The join is incomplete until every declared input has
                // delivered at least once.
                return;
            }
            latest.clone()
        }
    };
    match cell.transform_frame(&frame).await {
        Ok(Some(output)) => {
            if let Err(error) = shared.bus.publish(&shared.output_topic, output) {
                warn!(component = %shared.type_name, %error, "output publish failed");
            }
        }
        Ok(None) => {}
        Err(error) => {
            warn!(component = %shared.type_name, %error, "transform failed; input dropped");
        }
    }
}

/// Subscribes an upstream output topic and forwards its envelopes into the
/// instance's ingress. Idempotent per source topic.
fn wire_source(
    sources: &mut HashMap<String, Subscription>,
    shared: &RunnerShared,
    forward: &mpsc::Sender<WireEnvelope>,
    topic: &Topic,
) {
    let key = topic.to_string();
    if sources.contains_key(&key) {
        trace!(component = %shared.type_name, source = %key, "source already wired");
        return;
    }
    let forward = forward.clone();
    let component = shared.type_name.clone();
    match shared.bus.subscribe_with(topic, move |envelope| {
        if forward.try_send(envelope).is_err() {
            warn!(component = %component, "ingress full; wired envelope dropped");
        }
    }) {
        Ok(subscription) => {
            info!(component = %shared.type_name, source = %key, "input wired");
            sources.insert(key, subscription);
        }
        Err(error) => {
            warn!(component = %shared.type_name, source = %key, %error, "wiring failed");
        }
    }
}

/// Cancels the subscription on an upstream output topic, if wired.
fn unwire_source(sources: &mut HashMap<String, Subscription>, shared: &RunnerShared, topic: &Topic) {
    let key = topic.to_string();
    match sources.remove(&key) {
        Some(subscription) => {
            subscription.cancel();
            info!(component = %shared.type_name, source = %key, "input unwired");
        }
        None => {
            trace!(component = %shared.type_name, source = %key, "source was not wired");
        }
    }
}
