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

//! Request/reply against an actuator that owns a slow external resource:
//! a blocking request, a timeout, and a remote failure with a retry.
//!
//! Run with: `cargo run --example relay_roundtrip`

use std::time::Duration;

use backplane::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SwitchRelay {
    channel: u8,
    on: bool,
    /// Simulated hardware latency.
    settle_ms: u64,
}

impl Message for SwitchRelay {
    const TYPE_TAG: &'static str = "demo.relay.switch";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelayState {
    channel: u8,
    on: bool,
}

impl Message for RelayState {
    const TYPE_TAG: &'static str = "demo.relay.state";
}

/// Eight relay channels behind one serial line: commands must execute one
/// at a time, which is exactly the actuator contract.
struct RelayBank {
    states: [bool; 8],
}

#[async_trait]
impl Actuator for RelayBank {
    type Command = SwitchRelay;
    type Outcome = RelayState;
    type Config = NoConfig;

    async fn execute(&mut self, command: SwitchRelay) -> Result<RelayState, ComponentError> {
        let Some(state) = self.states.get_mut(command.channel as usize) else {
            return Err(ComponentError::failed(format!(
                "no relay channel {}",
                command.channel
            )));
        };
        tokio::time::sleep(Duration::from_millis(command.settle_ms)).await;
        *state = command.on;
        Ok(RelayState {
            channel: command.channel,
            on: command.on,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("backplane=info")
        .init();

    let mut runtime = BackplaneApp::launch();
    let host = runtime.host_id().to_string();

    let registry = ComponentRegistry::new().with(ComponentDescriptor::actuator::<RelayBank, _>(
        "relay-bank",
        |_conf: NoConfig| Ok(RelayBank { states: [false; 8] }),
    ));
    ComponentManager::start(&runtime, registry).await?;

    let relays = Connector::attach(&runtime, "relay-bank", &host).await?;

    // A normal round trip.
    let state: RelayState = relays
        .request(
            &SwitchRelay {
                channel: 3,
                on: true,
                settle_ms: 50,
            },
            None,
        )
        .await?;
    println!("channel {} is now {}", state.channel, if state.on { "on" } else { "off" });

    // A request that cannot make its deadline.
    let slow: Result<RelayState, RequestError> = relays
        .request(
            &SwitchRelay {
                channel: 4,
                on: true,
                settle_ms: 2_000,
            },
            Some(Duration::from_millis(300)),
        )
        .await;
    match slow {
        Err(RequestError::Timeout(bound)) => {
            println!("channel 4 did not settle within {}ms", bound.as_millis());
        }
        other => println!("unexpected: {other:?}"),
    }

    // A remote failure the caller can inspect and retry differently.
    let bad: Result<RelayState, RequestError> = relays
        .request(
            &SwitchRelay {
                channel: 99,
                on: true,
                settle_ms: 0,
            },
            None,
        )
        .await;
    if let Err(RequestError::Remote(reason)) = bad {
        println!("hardware said no: {reason}");
    }

    runtime.shutdown_all().await
}
