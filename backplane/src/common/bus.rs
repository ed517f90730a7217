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
use tracing::{instrument, trace, warn};
use uuid::Uuid;

use crate::common::{Subscription, SubscriberId};
use crate::message::{Topic, WireEnvelope};

/// Errors raised by bus operations and fire-and-forget sends.
#[derive(Debug)]
pub enum BusError {
    /// The bus has shut down; nothing can be published or subscribed.
    Unavailable,
    /// A payload could not be encoded for publishing.
    Codec(crate::message::MessageError),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Unavailable => write!(f, "message bus is unavailable"),
            BusError::Codec(inner) => write!(f, "publish failed: {inner}"),
        }
    }
}

impl std::error::Error for BusError {}

impl From<crate::message::MessageError> for BusError {
    fn from(inner: crate::message::MessageError) -> Self {
        BusError::Codec(inner)
    }
}

/// An ordered, topic-addressed publish/subscribe hub.
///
/// The bus is the lowest layer of the framework: it moves
/// [`WireEnvelope`]s from publishers to every current subscriber of a topic,
/// preserving per-topic publish order, and knows nothing about message
/// types, components, or request/reply semantics.
///
/// Delivery contract:
///
/// * `publish` is non-blocking for the caller. Each subscriber owns a
///   bounded delivery buffer; a full buffer drops that subscriber's copy
///   (with a warning), so a slow consumer can never back-pressure the
///   producer or starve other subscribers.
/// * Delivery is at-most-once per subscriber, in publish order. There is no
///   persistence or replay: a subscriber connecting after a message was
///   published will not see it.
/// * All subscribers of a topic observe the same interleaving of concurrent
///   publishes; no ordering holds *across* distinct topics.
///
/// Handles are cheap to clone — all clones share the same hub.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

assert_impl_all!(MessageBus: Send, Sync);

/// Shared state behind every [`MessageBus`] clone.
pub(crate) struct BusInner {
    /// Per-topic subscriber rosters, keyed by rendered topic.
    topics: DashMap<String, TopicRoster>,
    /// Default per-subscriber delivery buffer capacity.
    default_capacity: usize,
    /// Warn on every message dropped at a full subscriber buffer.
    warn_on_drop: bool,
    /// Cancelled when the bus shuts down; subscription tokens are children.
    cancellation_token: CancellationToken,
    /// Tracks bus-owned dispatch tasks for drain-on-shutdown.
    dispatch_tracker: TaskTracker,
}

/// The subscribers of one topic.
///
/// The roster is locked for the duration of a publish so that every
/// subscriber observes the same total order of concurrent publishes; the
/// lock is held only across non-blocking `try_send`s.
#[derive(Default)]
struct TopicRoster {
    slots: Mutex<Vec<SubscriberSlot>>,
}

struct SubscriberSlot {
    id: SubscriberId,
    tx: mpsc::Sender<WireEnvelope>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("topics", &self.inner.topics.len())
            .finish()
    }
}

impl MessageBus {
    /// Creates a bus whose subscription tokens descend from `parent_token`.
    pub(crate) fn new(default_capacity: usize, warn_on_drop: bool, parent_token: &CancellationToken) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: DashMap::new(),
                default_capacity: default_capacity.max(1),
                warn_on_drop,
                cancellation_token: parent_token.child_token(),
                dispatch_tracker: TaskTracker::new(),
            }),
        }
    }

    /// Publishes an envelope to every current subscriber of `topic`.
    ///
    /// Fire-and-forget: the call never waits for consumers. Publishing to a
    /// topic with no subscribers is a normal condition, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] once the bus has shut down.
    #[instrument(skip(self, envelope), fields(topic = %topic, type_tag = %envelope.type_tag))]
    pub fn publish(&self, topic: &Topic, envelope: WireEnvelope) -> Result<(), BusError> {
        if self.inner.cancellation_token.is_cancelled() {
            return Err(BusError::Unavailable);
        }
        let key = topic.to_string();
        let Some(roster) = self.inner.topics.get(&key) else {
            trace!("no subscribers; envelope discarded");
            return Ok(());
        };
        let mut slots = roster.slots.lock();
        slots.retain(|slot| match slot.tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                if self.inner.warn_on_drop {
                    warn!(subscriber = %slot.id, "subscriber buffer full; envelope dropped");
                }
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!(subscriber = %slot.id, "subscriber gone; slot removed");
                false
            }
        });
        Ok(())
    }

    /// Subscribes to `topic` with the default delivery buffer, returning the
    /// teardown handle and the raw envelope stream.
    ///
    /// This is the low-level form used by component runners that select over
    /// several inputs; most callers want [`MessageBus::subscribe_with`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] once the bus has shut down.
    pub fn subscribe(
        &self,
        topic: &Topic,
    ) -> Result<(Subscription, mpsc::Receiver<WireEnvelope>), BusError> {
        self.subscribe_buffered(topic, self.inner.default_capacity)
    }

    /// Subscribes to `topic` with an explicit delivery buffer capacity.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] once the bus has shut down.
    pub fn subscribe_buffered(
        &self,
        topic: &Topic,
        capacity: usize,
    ) -> Result<(Subscription, mpsc::Receiver<WireEnvelope>), BusError> {
        if self.inner.cancellation_token.is_cancelled() {
            return Err(BusError::Unavailable);
        }
        let key = topic.to_string();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.inner
            .topics
            .entry(key.clone())
            .or_default()
            .slots
            .lock()
            .push(SubscriberSlot { id, tx });
        trace!(topic = %key, subscriber = %id, "subscription added");
        let token = self.inner.cancellation_token.child_token();
        Ok((
            Subscription::new(self.inner.clone(), key, id, token),
            rx,
        ))
    }

    /// Subscribes `handler` to `topic`. The handler runs on a bus-owned
    /// dispatch task, once per envelope in publish order, for the lifetime
    /// of the returned [`Subscription`].
    ///
    /// Handlers run off the publisher's thread and off the application's
    /// main thread: keep them cheap, or hand the envelope off to your own
    /// execution context.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Unavailable`] once the bus has shut down.
    pub fn subscribe_with<F>(&self, topic: &Topic, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(WireEnvelope) + Send + Sync + 'static,
    {
        let (subscription, mut rx) = self.subscribe(topic)?;
        let token = subscription.token();
        self.inner.dispatch_tracker.spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    maybe = rx.recv() => {
                        let Some(envelope) = maybe else { break };
                        handler(envelope);
                    }
                }
            }
        });
        Ok(subscription)
    }

    /// Current number of subscribers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .topics
            .get(&topic.to_string())
            .map_or(0, |roster| roster.slots.lock().len())
    }

    /// Stops the bus: cancels every subscription token and drops all
    /// subscriber slots. Publishing afterwards yields
    /// [`BusError::Unavailable`].
    pub(crate) fn shutdown(&self) {
        trace!("message bus shutting down");
        self.inner.cancellation_token.cancel();
        self.inner.topics.clear();
    }

    /// Waits for every bus-owned dispatch task to finish. Call after
    /// [`MessageBus::shutdown`].
    pub(crate) async fn drained(&self) {
        self.inner.dispatch_tracker.close();
        self.inner.dispatch_tracker.wait().await;
    }
}

impl BusInner {
    /// Removes one subscriber slot; the topic entry is dropped when its
    /// roster empties.
    pub(crate) fn remove_subscriber(&self, topic_key: &str, id: SubscriberId) {
        let emptied = if let Some(roster) = self.topics.get(topic_key) {
            let mut slots = roster.slots.lock();
            slots.retain(|slot| slot.id != id);
            slots.is_empty()
        } else {
            false
        };
        if emptied {
            self.topics
                .remove_if(topic_key, |_, roster| roster.slots.lock().is_empty());
        }
        trace!(topic = %topic_key, subscriber = %id, "subscription removed");
    }
}
