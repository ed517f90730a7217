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

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::bus::BusInner;
use crate::common::SubscriberId;

/// Handle to one live bus subscription.
///
/// A subscription stays active for as long as this handle exists: dropping
/// it tears the subscription down, so pipeline rewiring has a well-defined
/// teardown step instead of relying on closures being garbage-collected.
/// Use [`Subscription::cancel`] to tear down explicitly, or
/// [`Subscription::detach`] to deliberately leave the subscription running
/// for the lifetime of the bus.
pub struct Subscription {
    bus: Arc<BusInner>,
    topic_key: String,
    id: SubscriberId,
    /// Child of the bus token; cancelling stops the dispatch task, if any.
    token: CancellationToken,
    torn_down: bool,
    detached: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic_key)
            .field("id", &self.id)
            .field("detached", &self.detached)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        bus: Arc<BusInner>,
        topic_key: String,
        id: SubscriberId,
        token: CancellationToken,
    ) -> Self {
        Self {
            bus,
            topic_key,
            id,
            token,
            torn_down: false,
            detached: false,
        }
    }

    /// The rendered topic this subscription listens on.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic_key
    }

    /// Cancels the subscription: no further envelopes are delivered and the
    /// dispatch task, if any, stops.
    pub fn cancel(mut self) {
        self.teardown();
    }

    /// Leaves the subscription running for the lifetime of the bus, even
    /// after this handle is dropped.
    pub fn detach(mut self) {
        self.detached = true;
        trace!(topic = %self.topic_key, subscriber = %self.id, "subscription detached");
    }

    /// Clone of the cancellation token driving this subscription's dispatch
    /// task.
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.bus.remove_subscriber(&self.topic_key, self.id);
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.teardown();
        }
    }
}
