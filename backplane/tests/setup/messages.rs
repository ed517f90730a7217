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
use backplane::prelude::*;
use serde::{Deserialize, Serialize};

/// An incrementing integer published by the counter sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterReading {
    pub value: u64,
}

impl Message for CounterReading {
    const TYPE_TAG: &'static str = "test.counter.reading";
}

/// Configuration for the counter sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// First value to publish.
    pub start: u64,
    /// Delay between samples, in milliseconds.
    pub period_ms: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            start: 1,
            period_ms: 50,
        }
    }
}

impl Message for CounterConfig {
    const TYPE_TAG: &'static str = "test.counter.config";
}

/// Output of the doubling service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoubledReading {
    pub value: u64,
}

impl Message for DoubledReading {
    const TYPE_TAG: &'static str = "test.doubled.reading";
}

/// Output of the summing fusion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SumReading {
    pub value: u64,
}

impl Message for SumReading {
    const TYPE_TAG: &'static str = "test.sum.reading";
}

/// Command executed by the gate actuator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateCommand {
    /// How long the simulated hardware action takes, in milliseconds.
    pub delay_ms: u64,
    /// When set, the action reports this failure instead of succeeding.
    pub fail_with: Option<String>,
}

impl GateCommand {
    pub fn quick() -> Self {
        Self {
            delay_ms: 0,
            fail_with: None,
        }
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            fail_with: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            delay_ms: 0,
            fail_with: Some(reason.to_string()),
        }
    }
}

impl Message for GateCommand {
    const TYPE_TAG: &'static str = "test.gate.command";
}

/// Outcome of a successfully executed gate command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateOutcome {
    /// Sequence number of this execution on the actuator, starting at 1.
    pub executed: u64,
}

impl Message for GateOutcome {
    const TYPE_TAG: &'static str = "test.gate.outcome";
}
