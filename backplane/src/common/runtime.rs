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
use futures::future::join_all;
use static_assertions::assert_impl_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::common::{BackplaneConfig, MessageBus};
use crate::component::ComponentManager;
use crate::message::EnvelopeCodec;
use crate::traits::Message;

/// The application context: everything a process needs to participate in
/// the framework, constructed once by
/// [`BackplaneApp::launch`](crate::common::BackplaneApp) and passed by
/// reference to every connector and component manager that needs it.
///
/// There is no process-wide singleton: the caller owns this object's
/// lifecycle, initializing it at process start and tearing it down with
/// [`HostRuntime::shutdown_all`] at process end. Clones are cheap and share
/// the same bus, codec, and shutdown coordination.
#[derive(Debug, Clone)]
pub struct HostRuntime(pub(crate) Arc<HostInner>);

assert_impl_all!(HostRuntime: Send, Sync);

/// Shared state behind every [`HostRuntime`] clone.
#[derive(Debug)]
pub(crate) struct HostInner {
    /// This process's host identity; the `{host-id}` segment of every
    /// topic derived here.
    pub(crate) host_id: String,
    /// The message bus all local traffic flows over.
    pub(crate) bus: MessageBus,
    /// The shared decode registry.
    pub(crate) codec: Arc<EnvelopeCodec>,
    /// Framework configuration captured at launch.
    pub(crate) config: BackplaneConfig,
    /// Root token; cancelled at teardown.
    pub(crate) cancellation_token: CancellationToken,
    /// Component managers owned by this runtime, keyed by host.
    pub(crate) managers: DashMap<String, ComponentManager>,
}

impl HostRuntime {
    /// This runtime's host identity.
    #[inline]
    #[must_use]
    pub fn host_id(&self) -> &str {
        &self.0.host_id
    }

    /// The message bus.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.0.bus
    }

    /// The shared envelope codec.
    #[inline]
    #[must_use]
    pub fn codec(&self) -> &Arc<EnvelopeCodec> {
        &self.0.codec
    }

    /// The configuration captured at launch.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BackplaneConfig {
        &self.0.config
    }

    /// Registers an application message type with the shared codec so it
    /// can be decoded without static type knowledge.
    ///
    /// Component descriptors register their own message types when added to
    /// a manager's registry; this is for additional types an application
    /// decodes itself.
    pub fn register_message<M>(&self)
    where
        M: Message,
    {
        self.0.codec.register::<M>();
    }

    /// Tears the process's messaging down: stops every owned component
    /// manager (each stopping its components in reverse start order), shuts
    /// the bus down, and waits for dispatch tasks to drain.
    ///
    /// # Errors
    ///
    /// Returns an error when dispatch tasks fail to drain within the
    /// configured system shutdown bound. The teardown itself is
    /// best-effort: per-manager failures are logged, never block the rest
    /// of the sequence.
    #[instrument(skip(self))]
    pub async fn shutdown_all(&mut self) -> anyhow::Result<()> {
        info!(host = %self.0.host_id, "runtime shutting down");
        let managers: Vec<ComponentManager> = self
            .0
            .managers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        join_all(managers.iter().map(ComponentManager::shutdown)).await;
        self.0.managers.clear();

        self.0.bus.shutdown();
        self.0.cancellation_token.cancel();

        let bound = self.0.config.system_shutdown();
        if tokio::time::timeout(bound, self.0.bus.drained()).await.is_err() {
            anyhow::bail!(
                "bus dispatch tasks did not drain within {}ms",
                bound.as_millis()
            );
        }
        info!(host = %self.0.host_id, "runtime shutdown complete");
        Ok(())
    }
}
