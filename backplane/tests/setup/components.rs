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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backplane::prelude::*;

use super::messages::{
    CounterConfig, CounterReading, DoubledReading, GateCommand, GateOutcome, SumReading,
};

/// Records which components released their resources, in order. Shared
/// between fixture components and assertions.
pub type ReleaseLog = Arc<Mutex<Vec<String>>>;

pub fn release_log() -> ReleaseLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Sensor publishing an incrementing integer on a fixed period.
pub struct CounterSensor {
    next: u64,
    period: Duration,
    name: String,
    releases: ReleaseLog,
}

#[async_trait]
impl Sensor for CounterSensor {
    type Output = CounterReading;
    type Config = CounterConfig;

    async fn sample(&mut self) -> Result<CounterReading, ComponentError> {
        tokio::time::sleep(self.period).await;
        let value = self.next;
        self.next += 1;
        Ok(CounterReading { value })
    }

    async fn shutdown(&mut self) {
        self.releases.lock().unwrap().push(self.name.clone());
    }
}

/// Builds a counter descriptor registered under `type_name`, recording
/// resource release into `releases`.
pub fn counter_descriptor(type_name: &str, releases: ReleaseLog) -> ComponentDescriptor {
    let name = type_name.to_string();
    ComponentDescriptor::sensor::<CounterSensor, _>(type_name, move |config: CounterConfig| {
        Ok(CounterSensor {
            next: config.start,
            period: Duration::from_millis(config.period_ms),
            name: name.clone(),
            releases: releases.clone(),
        })
    })
}

/// Service doubling every counter reading it consumes.
pub struct DoublingService {
    releases: ReleaseLog,
}

#[async_trait]
impl Service for DoublingService {
    type Output = DoubledReading;
    type Config = NoConfig;

    async fn transform(
        &mut self,
        frame: &InputFrame,
    ) -> Result<Option<DoubledReading>, ComponentError> {
        let Some(reading) = frame.get::<CounterReading>() else {
            return Ok(None);
        };
        Ok(Some(DoubledReading {
            value: reading.value * 2,
        }))
    }

    async fn shutdown(&mut self) {
        self.releases.lock().unwrap().push("doubler".to_string());
    }
}

pub fn doubler_descriptor(releases: ReleaseLog) -> ComponentDescriptor {
    ComponentDescriptor::service::<DoublingService, _>("doubler", move |_config: NoConfig| {
        Ok(DoublingService {
            releases: releases.clone(),
        })
    })
    .with_input::<CounterReading>()
}

/// Two-input service summing the latest counter and doubled readings.
pub struct FusionService;

#[async_trait]
impl Service for FusionService {
    type Output = SumReading;
    type Config = NoConfig;

    async fn transform(
        &mut self,
        frame: &InputFrame,
    ) -> Result<Option<SumReading>, ComponentError> {
        let (Some(counter), Some(doubled)) =
            (frame.get::<CounterReading>(), frame.get::<DoubledReading>())
        else {
            return Ok(None);
        };
        Ok(Some(SumReading {
            value: counter.value + doubled.value,
        }))
    }
}

/// A fusion descriptor using the latest-value join across its two inputs.
pub fn fusion_descriptor() -> ComponentDescriptor {
    ComponentDescriptor::service::<FusionService, _>("fusion", |_config: NoConfig| {
        Ok(FusionService)
    })
    .with_input::<CounterReading>()
    .with_input::<DoubledReading>()
    .with_join_policy(JoinPolicy::LatestJoin)
}

/// Actuator simulating a slow, exclusively-owned piece of hardware.
pub struct GateActuator {
    executed: Arc<AtomicU64>,
    releases: ReleaseLog,
}

#[async_trait]
impl Actuator for GateActuator {
    type Command = GateCommand;
    type Outcome = GateOutcome;
    type Config = NoConfig;

    async fn execute(&mut self, command: GateCommand) -> Result<GateOutcome, ComponentError> {
        if command.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(command.delay_ms)).await;
        }
        if let Some(reason) = command.fail_with {
            return Err(ComponentError::failed(reason));
        }
        let executed = self.executed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GateOutcome { executed })
    }

    async fn shutdown(&mut self) {
        self.releases.lock().unwrap().push("gate".to_string());
    }
}

/// Builds a gate descriptor; `executed` observes how many commands ran.
pub fn gate_descriptor(executed: Arc<AtomicU64>, releases: ReleaseLog) -> ComponentDescriptor {
    ComponentDescriptor::actuator::<GateActuator, _>("gate", move |_config: NoConfig| {
        Ok(GateActuator {
            executed: executed.clone(),
            releases: releases.clone(),
        })
    })
}

/// Actuator whose action panics, for crash-supervision tests.
pub struct PanickyActuator;

#[async_trait]
impl Actuator for PanickyActuator {
    type Command = GateCommand;
    type Outcome = GateOutcome;
    type Config = NoConfig;

    async fn execute(&mut self, _command: GateCommand) -> Result<GateOutcome, ComponentError> {
        panic!("simulated component crash");
    }
}

pub fn panicky_descriptor() -> ComponentDescriptor {
    ComponentDescriptor::actuator::<PanickyActuator, _>("panicky", |_config: NoConfig| {
        Ok(PanickyActuator)
    })
}

/// Polls `probe` every few milliseconds until it returns `true` or the
/// deadline passes; returns whether it succeeded.
pub async fn wait_until(deadline: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if probe() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    probe()
}
