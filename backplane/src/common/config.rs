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

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Backplane framework.
///
/// This struct contains all configurable values for the framework, loaded
/// from TOML files in XDG-compliant directories. It tunes the plumbing only;
/// per-component configuration travels in start directives and is opaque to
/// the framework.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackplaneConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
    /// Default values configuration
    pub defaults: DefaultsConfig,
    /// Behavioral configuration switches
    pub behavior: BehaviorConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Default timeout for a blocking `request()` in milliseconds
    pub request_default_ms: u64,
    /// Timeout for manager control directives in milliseconds
    pub manager_request_ms: u64,
    /// Per-component shutdown timeout in milliseconds
    pub component_shutdown_ms: u64,
    /// System-wide shutdown timeout in milliseconds
    pub system_shutdown_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Default per-subscriber delivery buffer; a full buffer drops at the
    /// consumer, never back-pressures the producer
    pub subscriber_buffer: usize,
    /// Queue depth of pending requests per actuator instance
    pub actuator_queue_depth: usize,
    /// Capacity of a component runner's control command channel
    pub runner_command_capacity: usize,
}

/// Default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Host identity used when the application does not name one
    pub host_id: String,
}

/// Behavioral configuration switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Log a warning for every message dropped at a full subscriber buffer
    pub warn_on_drop: bool,
    /// Log replies that arrive after their request already timed out
    pub log_late_replies: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_default_ms: 3_000,
            manager_request_ms: 2_000,
            component_shutdown_ms: 5_000,
            system_shutdown_ms: 30_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            actuator_queue_depth: 64,
            runner_command_capacity: 16,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            host_id: "local".to_string(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            warn_on_drop: true,
            log_late_replies: true,
        }
    }
}

impl BackplaneConfig {
    /// Default blocking request timeout as a Duration
    pub const fn request_default(&self) -> Duration {
        Duration::from_millis(self.timeouts.request_default_ms)
    }

    /// Manager directive timeout as a Duration
    pub const fn manager_request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.manager_request_ms)
    }

    /// Per-component shutdown timeout as a Duration
    pub const fn component_shutdown(&self) -> Duration {
        Duration::from_millis(self.timeouts.component_shutdown_ms)
    }

    /// System-wide shutdown timeout as a Duration
    pub const fn system_shutdown(&self) -> Duration {
        Duration::from_millis(self.timeouts.system_shutdown_ms)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// This function attempts to load configuration from the following locations
    /// in order of preference:
    /// 1. `$XDG_CONFIG_HOME/backplane/config.toml` (Linux/macOS)
    /// 2. `~/.config/backplane/config.toml` (Linux fallback)
    /// 3. `~/Library/Application Support/backplane/config.toml` (macOS fallback)
    /// 4. `%APPDATA%/backplane/config.toml` (Windows)
    ///
    /// If no configuration file is found, returns the default configuration.
    /// If a configuration file exists but is malformed, logs an error and uses defaults.
    pub fn load() -> Self {
        use tracing::{error, info};

        // Get the XDG base directories
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("backplane") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        // Try to find the configuration file
        let config_path = xdg_dirs.find_config_file("config.toml");

        if let Some(path) = config_path {
            info!("Loading configuration from: {}", path.display());
            match std::fs::read_to_string(&path) {
                Ok(config_str) => match toml::from_str::<Self>(&config_str) {
                    Ok(config) => {
                        info!("Successfully loaded configuration");
                        config
                    }
                    Err(e) => {
                        error!("Failed to parse configuration file {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    error!("Failed to read configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            }
        } else {
            info!("No configuration file found, using defaults");
            Self::default()
        }
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: BackplaneConfig = BackplaneConfig::load();
}
