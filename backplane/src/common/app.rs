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
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::config::CONFIG;
use crate::common::runtime::HostInner;
use crate::common::{HostRuntime, MessageBus};
use crate::message::directive;
use crate::message::EnvelopeCodec;

/// Entry point for initializing the Backplane messaging system.
///
/// This struct is a marker type that bootstraps the process's
/// [`HostRuntime`]: the bus, the codec (with the built-in control
/// directives registered), and the shutdown coordination the caller later
/// drives through [`HostRuntime::shutdown_all`].
///
/// The framework never installs logging or a global context of its own;
/// the application owns both.
#[derive(Default, Debug, Clone)]
pub struct BackplaneApp;

impl BackplaneApp {
    /// Initializes the messaging runtime under the configured default host
    /// identity.
    ///
    /// Configuration is loaded once per process from XDG-located TOML (see
    /// [`BackplaneConfig`](crate::common::BackplaneConfig)). The call
    /// itself is synchronous, but subscribing and spawning components
    /// require an ambient Tokio runtime — launch from within
    /// `#[tokio::main]` or an equivalent context.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use backplane::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut runtime = BackplaneApp::launch();
    ///     // attach connectors, start managers...
    ///     runtime.shutdown_all().await?;
    ///     Ok(())
    /// }
    /// ```
    #[must_use]
    pub fn launch() -> HostRuntime {
        Self::launch_on_host(CONFIG.defaults.host_id.clone())
    }

    /// Initializes the messaging runtime under an explicit host identity —
    /// the `{host-id}` segment of every topic this process derives.
    #[must_use]
    pub fn launch_on_host(host_id: impl Into<String>) -> HostRuntime {
        let host_id = host_id.into();
        trace!(host = %host_id, "starting Backplane runtime initialization");

        let config = CONFIG.clone();
        trace!("configuration loaded: {:?}", config);

        let cancellation_token = CancellationToken::new();
        let bus = MessageBus::new(
            config.limits.subscriber_buffer,
            config.behavior.warn_on_drop,
            &cancellation_token,
        );

        let codec = Arc::new(EnvelopeCodec::new());
        directive::register_builtin(&codec);

        let runtime = HostRuntime(Arc::new(HostInner {
            host_id,
            bus,
            codec,
            config,
            cancellation_token,
            managers: DashMap::new(),
        }));

        trace!("Backplane runtime initialization complete");
        runtime
    }
}
