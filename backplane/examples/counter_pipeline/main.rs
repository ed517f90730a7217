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

//! A complete pipeline in one process: a counter sensor feeds a doubling
//! service, while the application observes both the raw and the derived
//! stream through its own callbacks.
//!
//! Run with: `cargo run --example counter_pipeline`

use std::time::Duration;

use backplane::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tick {
    value: u64,
}

impl Message for Tick {
    const TYPE_TAG: &'static str = "demo.tick";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DoubledTick {
    value: u64,
}

impl Message for DoubledTick {
    const TYPE_TAG: &'static str = "demo.tick.doubled";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TickerConf {
    period_ms: u64,
}

impl Default for TickerConf {
    fn default() -> Self {
        Self { period_ms: 250 }
    }
}

impl Message for TickerConf {
    const TYPE_TAG: &'static str = "demo.tick.conf";
}

struct Ticker {
    next: u64,
    period: Duration,
}

#[async_trait]
impl Sensor for Ticker {
    type Output = Tick;
    type Config = TickerConf;

    async fn sample(&mut self) -> Result<Tick, ComponentError> {
        tokio::time::sleep(self.period).await;
        let value = self.next;
        self.next += 1;
        Ok(Tick { value })
    }
}

struct Doubler;

#[async_trait]
impl Service for Doubler {
    type Output = DoubledTick;
    type Config = NoConfig;

    async fn transform(&mut self, frame: &InputFrame) -> Result<Option<DoubledTick>, ComponentError> {
        let Some(tick) = frame.get::<Tick>() else {
            return Ok(None);
        };
        Ok(Some(DoubledTick {
            value: tick.value * 2,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("backplane=info")
        .init();

    let mut runtime = BackplaneApp::launch();
    let host = runtime.host_id().to_string();

    // The host manager knows how to build both ends of the pipeline.
    let registry = ComponentRegistry::new()
        .with(ComponentDescriptor::sensor::<Ticker, _>("ticker", |conf: TickerConf| {
            Ok(Ticker {
                next: 1,
                period: Duration::from_millis(conf.period_ms),
            })
        }))
        .with(
            ComponentDescriptor::service::<Doubler, _>("doubler", |_conf: NoConfig| Ok(Doubler))
                .with_input::<Tick>(),
        );
    ComponentManager::start(&runtime, registry).await?;

    // Wire the pipeline: ticker -> doubler, no relaying through main.
    let ticker = Connector::attach_configured(&runtime, "ticker", &host, &TickerConf { period_ms: 200 }).await?;
    let doubler = Connector::attach_with_source(&runtime, "doubler", &host, &ticker).await?;

    // Observe the raw stream and the derived stream side by side.
    let _raw = ticker.register_callback(|tick: Tick| {
        println!("raw     -> {}", tick.value);
    })?;
    let _doubled = doubler.register_callback(|tick: DoubledTick| {
        println!("doubled -> {}", tick.value);
    })?;

    tokio::time::sleep(Duration::from_secs(2)).await;

    runtime.shutdown_all().await
}
