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

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use static_assertions::assert_impl_all;
use tokio::sync::oneshot;
use tracing::{instrument, trace, warn};
use uuid::Uuid;

use crate::common::correlator::{ReplyCorrelator, ReplyOutcome};
use crate::common::{BusError, HostRuntime, MessageBus, RequestError, Subscription};
use crate::message::directive::{
    Ack, PingRequest, PongReply, StartComponentReply, StartComponentRequest, StopComponentRequest,
    UnwireInputRequest, WireInputRequest,
};
use crate::message::{decode_typed, RequestId, Topic, WireEnvelope};
use crate::traits::{Message, Payload};

/// A clonable client-side handle to a (possibly remote) component.
///
/// A `Connector` is what an application holds instead of the component
/// itself. Attaching goes through the component's host manager — the first
/// connector for a `(type, host, instance)` triple instantiates the
/// component, later ones attach to the running instance — after which all
/// steady-state traffic flows directly over the bus:
///
/// * [`Connector::send_message`] — fire-and-forget publish to the
///   component's input topic.
/// * [`Connector::request`] — blocking request/reply with timeout;
///   [`Connector::request_detached`] for concurrent outstanding requests.
/// * [`Connector::register_callback`] — asynchronous consumption of the
///   component's output stream.
/// * [`Connector::connect_source`] / [`Connector::disconnect_source`] —
///   pipeline composition: feed this component from another component's
///   output without relaying through the application.
///
/// Handles can be cloned freely; clones share the private reply topic and
/// the correlator, so concurrent outstanding requests are each tracked by
/// their own identifier.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

assert_impl_all!(Connector: Send, Sync);

struct ConnectorInner {
    /// Unique identity of this connector; names the private reply topic.
    id: Uuid,
    /// Registered type name of the bound component.
    component_type: String,
    /// The bound component's input topic.
    input_topic: Topic,
    /// The bound component's output topic.
    output_topic: Topic,
    /// Control topic of the manager serving the component's host.
    manager_topic: Topic,
    /// This connector's private reply topic.
    reply_topic: Topic,
    bus: MessageBus,
    correlator: ReplyCorrelator,
    /// Keeps the reply-topic subscription alive for the connector lifetime.
    _reply_subscription: Subscription,
    /// Default bound for blocking requests.
    default_timeout: Duration,
    /// Bound for manager directives.
    manager_timeout: Duration,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.inner.id)
            .field("component_type", &self.inner.component_type)
            .field("input_topic", &self.inner.input_topic.to_string())
            .finish()
    }
}

impl Connector {
    /// Attaches to `type_name` on `host` with the component's default
    /// configuration, instantiating it if this is the first attach.
    ///
    /// # Errors
    ///
    /// Fails when the host manager is unreachable (timeout), rejects the
    /// directive (unknown type, factory failure), or the bus is down.
    #[instrument(skip(runtime))]
    pub async fn attach(
        runtime: &HostRuntime,
        type_name: &str,
        host: &str,
    ) -> anyhow::Result<Self> {
        Self::attach_inner(runtime, type_name, host, None, None).await
    }

    /// Attaches to `type_name` on `host`, supplying the configuration used
    /// if the component is instantiated by this call.
    ///
    /// Configuration is fixed at construction: when the component is
    /// already running the supplied bundle has no effect, and a component
    /// wanting different configuration must be stopped and started again.
    ///
    /// # Errors
    ///
    /// As for [`Connector::attach`], plus configuration serialization
    /// failures.
    #[instrument(skip(runtime, config))]
    pub async fn attach_configured<C>(
        runtime: &HostRuntime,
        type_name: &str,
        host: &str,
        config: &C,
    ) -> anyhow::Result<Self>
    where
        C: Message,
    {
        let bytes = config.to_bytes()?;
        Self::attach_inner(runtime, type_name, host, None, Some(bytes)).await
    }

    /// Attaches to a qualified instance of `type_name` on `host` (e.g. the
    /// second camera of a device).
    ///
    /// # Errors
    ///
    /// As for [`Connector::attach`].
    #[instrument(skip(runtime))]
    pub async fn attach_instance(
        runtime: &HostRuntime,
        type_name: &str,
        host: &str,
        instance: &str,
    ) -> anyhow::Result<Self> {
        Self::attach_inner(runtime, type_name, host, Some(instance), None).await
    }

    /// Attaches to `type_name` on `host` and wires its input to
    /// `upstream`'s output topic, establishing a pipeline edge in one step.
    ///
    /// # Errors
    ///
    /// As for [`Connector::attach`], plus wiring directive failures.
    #[instrument(skip(runtime, upstream))]
    pub async fn attach_with_source(
        runtime: &HostRuntime,
        type_name: &str,
        host: &str,
        upstream: &Connector,
    ) -> anyhow::Result<Self> {
        let connector = Self::attach_inner(runtime, type_name, host, None, None).await?;
        connector.connect_source(upstream).await?;
        Ok(connector)
    }

    async fn attach_inner(
        runtime: &HostRuntime,
        type_name: &str,
        host: &str,
        instance: Option<&str>,
        config: Option<Vec<u8>>,
    ) -> anyhow::Result<Self> {
        let manager_topic = Topic::manager(host)?;
        let id = Uuid::new_v4();
        let reply_topic = Topic::reply(runtime.host_id(), &id);
        let correlator = ReplyCorrelator::new();

        let reply_subscription = runtime.bus().subscribe_with(&reply_topic, {
            let correlator = correlator.clone();
            move |envelope| correlator.accept_reply(envelope)
        })?;

        let manager_timeout = runtime.config().manager_request_timeout();
        let directive = StartComponentRequest {
            type_name: type_name.to_string(),
            instance: instance.map(str::to_string),
            config,
        };
        let reply_envelope = raw_request(
            runtime.bus(),
            &correlator,
            &reply_topic,
            &manager_topic,
            &directive,
            manager_timeout,
        )
        .await?;
        let started: StartComponentReply = decode_typed(&reply_envelope)?;
        trace!(
            component = type_name,
            input = %started.input_topic,
            attached = started.attached,
            "connector bound"
        );

        Ok(Self {
            inner: Arc::new(ConnectorInner {
                id,
                component_type: type_name.to_string(),
                input_topic: started.input_topic,
                output_topic: started.output_topic,
                manager_topic,
                reply_topic,
                bus: runtime.bus().clone(),
                correlator,
                _reply_subscription: reply_subscription,
                default_timeout: runtime.config().request_default(),
                manager_timeout,
            }),
        })
    }

    /// Publishes a fire-and-forget message to the bound component's input
    /// topic. Returns as soon as the envelope is handed to the bus.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the message cannot be encoded or the bus
    /// is down. Delivery itself is not acknowledged.
    #[instrument(skip(self, message), fields(component = %self.inner.component_type))]
    pub fn send_message<M>(&self, message: &M) -> Result<(), BusError>
    where
        M: Message,
    {
        let envelope = WireEnvelope::event(message)?;
        self.inner.bus.publish(&self.inner.input_topic, envelope)
    }

    /// Publishes a request and suspends the caller until the correlated
    /// reply arrives or `timeout` (defaulting to the configured bound)
    /// elapses, whichever comes first.
    ///
    /// Every request is matched by at most one reply. On timeout the
    /// pending entry is discarded, so a late reply is dropped rather than
    /// delivered to a caller that already gave up.
    ///
    /// # Errors
    ///
    /// * [`RequestError::Timeout`] — no reply within the bound.
    /// * [`RequestError::Remote`] — the component's action failed.
    /// * [`RequestError::Transport`] / [`RequestError::Codec`] — the
    ///   request never made it onto the bus, or the reply did not decode
    ///   as `R`.
    #[instrument(skip(self, message), fields(component = %self.inner.component_type))]
    pub async fn request<M, R>(
        &self,
        message: &M,
        timeout: Option<Duration>,
    ) -> Result<R, RequestError>
    where
        M: Message,
        R: Message,
    {
        let bound = timeout.unwrap_or(self.inner.default_timeout);
        let reply_envelope = raw_request(
            &self.inner.bus,
            &self.inner.correlator,
            &self.inner.reply_topic,
            &self.inner.input_topic,
            message,
            bound,
        )
        .await?;
        Ok(decode_typed(&reply_envelope)?)
    }

    /// Publishes a request and returns immediately with a handle resolving
    /// to the reply. Multiple requests may be outstanding concurrently,
    /// each tracked by its own identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] when the request cannot be encoded or
    /// published.
    #[instrument(skip(self, message), fields(component = %self.inner.component_type))]
    pub fn request_detached<M, R>(&self, message: &M) -> Result<PendingReply<R>, RequestError>
    where
        M: Message,
        R: Message,
    {
        let request_id = Uuid::new_v4();
        let envelope =
            WireEnvelope::request(message, request_id, self.inner.reply_topic.clone())?;
        let receiver = self.inner.correlator.register(request_id);
        if let Err(error) = self.inner.bus.publish(&self.inner.input_topic, envelope) {
            self.inner.correlator.discard(request_id);
            return Err(RequestError::Transport(error));
        }
        Ok(PendingReply {
            request_id,
            receiver,
            correlator: self.inner.correlator.clone(),
            default_timeout: self.inner.default_timeout,
            _reply: PhantomData,
        })
    }

    /// Subscribes `handler` to the bound component's output topic. The
    /// handler runs on a bus-owned dispatch task, once per output message
    /// in publish order — keep it cheap, or hand off to your own context.
    ///
    /// Envelopes that do not decode as `M` are dropped and logged; they
    /// never reach the handler. The returned [`Subscription`] keeps the
    /// callback alive; cancel or drop it to stop observing.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] once the bus has shut down.
    pub fn register_callback<M, F>(&self, handler: F) -> Result<Subscription, BusError>
    where
        M: Message,
        F: Fn(M) + Send + Sync + 'static,
    {
        let component = self.inner.component_type.clone();
        self.inner
            .bus
            .subscribe_with(&self.inner.output_topic, move |envelope| {
                match decode_typed::<M>(&envelope) {
                    Ok(message) => handler(message),
                    Err(error) => {
                        warn!(component = %component, %error, "undecodable output envelope dropped");
                    }
                }
            })
    }

    /// Wires the bound component's input to `upstream`'s output topic.
    ///
    /// The subscription is established by the component itself — no relay
    /// through this process — so every message the upstream component
    /// publishes while connected reaches the downstream component exactly
    /// once. The application may independently observe the same upstream
    /// topic through its own callback.
    ///
    /// # Errors
    ///
    /// Fails when the component's host manager rejects the directive
    /// (unknown instance, sensors take no inputs) or is unreachable.
    #[instrument(skip(self, upstream), fields(component = %self.inner.component_type))]
    pub async fn connect_source(&self, upstream: &Connector) -> Result<(), RequestError> {
        let directive = WireInputRequest {
            component: self.inner.input_topic.clone(),
            source_output: upstream.output_topic().clone(),
        };
        let _: Ack = self.manager_request(&directive).await?;
        Ok(())
    }

    /// Reverses an earlier [`Connector::connect_source`] without restarting
    /// either component.
    ///
    /// # Errors
    ///
    /// As for [`Connector::connect_source`].
    #[instrument(skip(self, upstream), fields(component = %self.inner.component_type))]
    pub async fn disconnect_source(&self, upstream: &Connector) -> Result<(), RequestError> {
        let directive = UnwireInputRequest {
            component: self.inner.input_topic.clone(),
            source_output: upstream.output_topic().clone(),
        };
        let _: Ack = self.manager_request(&directive).await?;
        Ok(())
    }

    /// Round-trips a liveness probe through the component's host manager.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Timeout`] when the manager does not answer
    /// within `timeout` (defaulting to the manager directive bound).
    pub async fn ping(&self, timeout: Option<Duration>) -> Result<(), RequestError> {
        let bound = timeout.unwrap_or(self.inner.manager_timeout);
        let reply_envelope = raw_request(
            &self.inner.bus,
            &self.inner.correlator,
            &self.inner.reply_topic,
            &self.inner.manager_topic,
            &PingRequest,
            bound,
        )
        .await?;
        let _: PongReply = decode_typed(&reply_envelope)?;
        Ok(())
    }

    /// Asks the host manager to stop the bound component instance.
    /// Stopping is idempotent; asking again after the instance is gone
    /// still succeeds.
    ///
    /// # Errors
    ///
    /// Fails only when the manager is unreachable or the bus is down.
    #[instrument(skip(self), fields(component = %self.inner.component_type))]
    pub async fn stop_component(&self) -> Result<(), RequestError> {
        let directive = StopComponentRequest {
            topic: self.inner.input_topic.clone(),
        };
        let _: Ack = self.manager_request(&directive).await?;
        Ok(())
    }

    /// The bound component's input topic.
    #[inline]
    #[must_use]
    pub fn input_topic(&self) -> &Topic {
        &self.inner.input_topic
    }

    /// The bound component's output topic.
    #[inline]
    #[must_use]
    pub fn output_topic(&self) -> &Topic {
        &self.inner.output_topic
    }

    /// This connector's unique identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Number of requests this connector currently has outstanding.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    async fn manager_request<M, R>(&self, directive: &M) -> Result<R, RequestError>
    where
        M: Message,
        R: Message,
    {
        let reply_envelope = raw_request(
            &self.inner.bus,
            &self.inner.correlator,
            &self.inner.reply_topic,
            &self.inner.manager_topic,
            directive,
            self.inner.manager_timeout,
        )
        .await?;
        Ok(decode_typed(&reply_envelope)?)
    }
}

/// Publishes one request envelope and awaits its correlated reply or the
/// timeout, discarding the pending entry on expiry so a late reply cannot
/// resolve it.
async fn raw_request(
    bus: &MessageBus,
    correlator: &ReplyCorrelator,
    reply_topic: &Topic,
    target: &Topic,
    payload: &dyn Payload,
    timeout: Duration,
) -> Result<WireEnvelope, RequestError> {
    let request_id = Uuid::new_v4();
    let envelope = WireEnvelope::request(payload, request_id, reply_topic.clone())?;
    let receiver = correlator.register(request_id);
    if let Err(error) = bus.publish(target, envelope) {
        correlator.discard(request_id);
        return Err(RequestError::Transport(error));
    }
    await_outcome(receiver, correlator, request_id, timeout).await
}

/// Awaits one completion signal under a timeout.
async fn await_outcome(
    receiver: oneshot::Receiver<ReplyOutcome>,
    correlator: &ReplyCorrelator,
    request_id: RequestId,
    timeout: Duration,
) -> Result<WireEnvelope, RequestError> {
    match tokio::time::timeout(timeout, receiver).await {
        Err(_elapsed) => {
            correlator.discard(request_id);
            trace!(%request_id, "request timed out");
            Err(RequestError::Timeout(timeout))
        }
        Ok(Err(_recv_error)) => Err(RequestError::ChannelClosed),
        Ok(Ok(outcome)) => outcome,
    }
}

/// A future-like handle to the reply of a detached request.
///
/// Obtained from [`Connector::request_detached`]; consume it with
/// [`PendingReply::wait`].
#[derive(Debug)]
pub struct PendingReply<R>
where
    R: Message,
{
    request_id: RequestId,
    receiver: oneshot::Receiver<ReplyOutcome>,
    correlator: ReplyCorrelator,
    default_timeout: Duration,
    _reply: PhantomData<fn() -> R>,
}

impl<R> PendingReply<R>
where
    R: Message,
{
    /// The identifier correlating this handle with its reply.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Suspends the caller until the reply arrives or `timeout`
    /// (defaulting to the configured bound) elapses.
    ///
    /// # Errors
    ///
    /// As for [`Connector::request`].
    pub async fn wait(self, timeout: Option<Duration>) -> Result<R, RequestError> {
        let bound = timeout.unwrap_or(self.default_timeout);
        let reply_envelope =
            await_outcome(self.receiver, &self.correlator, self.request_id, bound).await?;
        Ok(decode_typed(&reply_envelope)?)
    }
}
