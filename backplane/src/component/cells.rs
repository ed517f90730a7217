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

//! Type-erased adapters between the typed role traits and the role-agnostic
//! runner: decode the envelope, call the typed implementation, encode the
//! result.

use async_trait::async_trait;

use crate::message::{decode_typed, EnvelopeKind, MessageError, WireEnvelope};
use crate::traits::{Actuator, ComponentError, InputFrame, Sensor, Service};

/// A runnable component instance, erased over its concrete type.
pub(crate) enum RoleCell {
    /// Sensor loop body.
    Sensor(Box<dyn SensorCell>),
    /// Actuator loop body.
    Actuator(Box<dyn ActuatorCell>),
    /// Service loop body.
    Service(Box<dyn ServiceCell>),
}

/// Erased sensor: sample and encode in one step.
#[async_trait]
pub(crate) trait SensorCell: Send {
    /// Produces the next output message as a ready-to-publish event
    /// envelope.
    async fn sample_event(&mut self) -> Result<WireEnvelope, ComponentError>;

    /// Releases external resources; invoked exactly once on stop.
    async fn shutdown(&mut self);
}

/// Erased actuator: decode, execute, and encode the reply in one step.
#[async_trait]
pub(crate) trait ActuatorCell: Send {
    /// Executes one inbound envelope.
    ///
    /// * `Request` envelopes yield `Ok(Some(reply))` — the outcome on
    ///   success, an error reply when the action failed.
    /// * `Event` envelopes execute fire-and-forget: `Ok(None)`, no reply.
    /// * Undecodable payloads and unexpected kinds are `Err`: the runner
    ///   drops and logs them, and a requester times out rather than
    ///   receiving a coerced reply.
    async fn execute_envelope(
        &mut self,
        envelope: &WireEnvelope,
    ) -> Result<Option<WireEnvelope>, MessageError>;

    /// Releases external resources; invoked exactly once on stop.
    async fn shutdown(&mut self);
}

/// Erased service: transform a frame and encode the output in one step.
#[async_trait]
pub(crate) trait ServiceCell: Send {
    /// Derives an output envelope from the current input frame, if the
    /// transform produces one.
    async fn transform_frame(
        &mut self,
        frame: &InputFrame,
    ) -> Result<Option<WireEnvelope>, ComponentError>;

    /// Releases external resources; invoked exactly once on stop.
    async fn shutdown(&mut self);
}

/// Adapter driving a concrete [`Sensor`].
pub(crate) struct TypedSensor<S>
where
    S: Sensor,
{
    sensor: S,
}

impl<S> TypedSensor<S>
where
    S: Sensor,
{
    pub(crate) fn new(sensor: S) -> Self {
        Self { sensor }
    }
}

#[async_trait]
impl<S> SensorCell for TypedSensor<S>
where
    S: Sensor,
{
    async fn sample_event(&mut self) -> Result<WireEnvelope, ComponentError> {
        let output = self.sensor.sample().await?;
        WireEnvelope::event(&output)
            .map_err(|error| ComponentError::Failed(format!("output encode failed: {error}")))
    }

    async fn shutdown(&mut self) {
        self.sensor.shutdown().await;
    }
}

/// Adapter driving a concrete [`Actuator`].
pub(crate) struct TypedActuator<A>
where
    A: Actuator,
{
    actuator: A,
}

impl<A> TypedActuator<A>
where
    A: Actuator,
{
    pub(crate) fn new(actuator: A) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl<A> ActuatorCell for TypedActuator<A>
where
    A: Actuator,
{
    async fn execute_envelope(
        &mut self,
        envelope: &WireEnvelope,
    ) -> Result<Option<WireEnvelope>, MessageError> {
        match &envelope.kind {
            EnvelopeKind::Request { request_id, .. } => {
                let command: A::Command = decode_typed(envelope)?;
                let reply = match self.actuator.execute(command).await {
                    Ok(outcome) => WireEnvelope::reply(&outcome, *request_id)?,
                    Err(error) => WireEnvelope::reply_error(*request_id, &error.to_string()),
                };
                Ok(Some(reply))
            }
            EnvelopeKind::Event => {
                // Fire-and-forget execution: a streamed command with no
                // caller awaiting an outcome.
                let command: A::Command = decode_typed(envelope)?;
                if let Err(error) = self.actuator.execute(command).await {
                    tracing::warn!(%error, "fire-and-forget execution failed");
                }
                Ok(None)
            }
            EnvelopeKind::Reply { .. } => Err(MessageError::Malformed {
                type_tag: envelope.type_tag.clone(),
                reason: "reply envelope on an actuator input topic".to_string(),
            }),
        }
    }

    async fn shutdown(&mut self) {
        self.actuator.shutdown().await;
    }
}

/// Adapter driving a concrete [`Service`].
pub(crate) struct TypedService<S>
where
    S: Service,
{
    service: S,
}

impl<S> TypedService<S>
where
    S: Service,
{
    pub(crate) fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> ServiceCell for TypedService<S>
where
    S: Service,
{
    async fn transform_frame(
        &mut self,
        frame: &InputFrame,
    ) -> Result<Option<WireEnvelope>, ComponentError> {
        match self.service.transform(frame).await? {
            Some(output) => WireEnvelope::event(&output)
                .map(Some)
                .map_err(|error| ComponentError::Failed(format!("output encode failed: {error}"))),
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self) {
        self.service.shutdown().await;
    }
}
