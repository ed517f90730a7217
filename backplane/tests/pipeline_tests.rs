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
#![allow(dead_code, unused_doc_comments)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use backplane::prelude::*;

use crate::setup::components::{
    counter_descriptor, doubler_descriptor, fusion_descriptor, release_log, wait_until,
};
use crate::setup::initialize_tracing;
use crate::setup::messages::{CounterConfig, CounterReading, DoubledReading, SumReading};

mod setup;

async fn pipeline_fixture(
    period_ms: u64,
) -> anyhow::Result<(HostRuntime, Connector, Connector, Arc<Mutex<Vec<u64>>>)> {
    let runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new()
        .with(counter_descriptor("counter", release_log()))
        .with(doubler_descriptor(release_log()));
    ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let counter = Connector::attach_configured(
        &runtime,
        "counter",
        &host,
        &CounterConfig {
            start: 1,
            period_ms,
        },
    )
    .await?;
    let doubler = Connector::attach_with_source(&runtime, "doubler", &host, &counter).await?;

    let doubled: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let subscription = doubler.register_callback({
        let doubled = doubled.clone();
        move |reading: DoubledReading| doubled.lock().unwrap().push(reading.value)
    })?;
    subscription.detach();

    Ok((runtime, counter, doubler, doubled))
}

/// The canonical chain: sensor -> doubling service -> application
/// callback. Values [1, 2, 3] come out as [2, 4, 6], in order.
#[tokio::test]
async fn sensor_service_callback_chain_doubles_in_order() -> anyhow::Result<()> {
    initialize_tracing();
    // A slow sensor so wiring is complete well before the first sample.
    let (mut runtime, _counter, _doubler, doubled) = pipeline_fixture(150).await?;

    assert!(
        wait_until(Duration::from_secs(2), || doubled.lock().unwrap().len() >= 3).await,
        "pipeline produced too few values"
    );
    let doubled = doubled.lock().unwrap().clone();
    assert_eq!(&doubled[..3], &[2, 4, 6]);

    runtime.shutdown_all().await
}

/// Exactly-once: while connected, every message the sensor publishes is
/// processed by the service once — no loss, no duplication — which shows
/// up as a gap-free doubled sequence.
#[tokio::test]
async fn pipeline_delivers_exactly_once_while_connected() -> anyhow::Result<()> {
    initialize_tracing();
    let (mut runtime, _counter, _doubler, doubled) = pipeline_fixture(20).await?;

    assert!(
        wait_until(Duration::from_secs(3), || doubled.lock().unwrap().len() >= 10).await
    );
    let doubled = doubled.lock().unwrap().clone();
    assert!(
        doubled.windows(2).all(|pair| pair[1] == pair[0] + 2),
        "sequence has a gap or duplicate: {doubled:?}"
    );

    runtime.shutdown_all().await
}

/// Pipeline topology can be rewired without restarting either component:
/// disconnect stops the flow, reconnect resumes it, and the sequence never
/// duplicates.
#[tokio::test]
async fn pipeline_rewires_without_restarting_components() -> anyhow::Result<()> {
    initialize_tracing();
    let (mut runtime, counter, doubler, doubled) = pipeline_fixture(20).await?;

    assert!(wait_until(Duration::from_secs(2), || doubled.lock().unwrap().len() >= 3).await);

    doubler.disconnect_source(&counter).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_disconnect = doubled.lock().unwrap().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        doubled.lock().unwrap().len(),
        after_disconnect,
        "values kept flowing after disconnect"
    );

    doubler.connect_source(&counter).await?;
    assert!(
        wait_until(Duration::from_secs(2), || {
            doubled.lock().unwrap().len() > after_disconnect
        })
        .await,
        "flow did not resume after reconnect"
    );
    let doubled = doubled.lock().unwrap().clone();
    assert!(
        doubled.windows(2).all(|pair| pair[1] > pair[0]),
        "duplicate or reordered value after rewiring: {doubled:?}"
    );

    runtime.shutdown_all().await
}

/// The application can observe the raw upstream stream with its own
/// callback while the same topic feeds the pipeline.
#[tokio::test]
async fn application_observes_raw_stream_alongside_pipeline() -> anyhow::Result<()> {
    initialize_tracing();
    let (mut runtime, counter, _doubler, doubled) = pipeline_fixture(20).await?;

    let raw: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let _raw_subscription = counter.register_callback({
        let raw = raw.clone();
        move |reading: CounterReading| raw.lock().unwrap().push(reading.value)
    })?;

    assert!(
        wait_until(Duration::from_secs(2), || {
            raw.lock().unwrap().len() >= 5 && doubled.lock().unwrap().len() >= 5
        })
        .await
    );
    let raw = raw.lock().unwrap().clone();
    assert!(raw.windows(2).all(|pair| pair[1] == pair[0] + 1), "{raw:?}");

    runtime.shutdown_all().await
}

/// Latest-value join: a two-input service stays silent until every
/// declared input has delivered, then fires per arrival with the latest
/// snapshot of both.
#[tokio::test]
async fn latest_join_pairs_the_newest_values() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(fusion_descriptor());
    ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let fusion = Connector::attach(&runtime, "fusion", &host).await?;
    let sums: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = fusion.register_callback({
        let sums = sums.clone();
        move |reading: SumReading| sums.lock().unwrap().push(reading.value)
    })?;

    // One input alone completes no join.
    fusion.send_message(&CounterReading { value: 1 })?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sums.lock().unwrap().is_empty(), "join fired with a missing input");

    // The second input completes the frame: 1 + 4.
    fusion.send_message(&DoubledReading { value: 4 })?;
    assert!(wait_until(Duration::from_secs(1), || sums.lock().unwrap().len() == 1).await);

    // A fresh first input pairs with the *latest* second input: 2 + 4.
    fusion.send_message(&CounterReading { value: 2 })?;
    assert!(wait_until(Duration::from_secs(1), || sums.lock().unwrap().len() == 2).await);
    assert_eq!(*sums.lock().unwrap(), vec![5, 6]);

    runtime.shutdown_all().await
}

/// A service also consumes messages sent directly to its input topic,
/// without any pipeline wiring.
#[tokio::test]
async fn service_consumes_direct_sends() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(doubler_descriptor(release_log()));
    ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let doubler = Connector::attach(&runtime, "doubler", &host).await?;
    let doubled: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = doubler.register_callback({
        let doubled = doubled.clone();
        move |reading: DoubledReading| doubled.lock().unwrap().push(reading.value)
    })?;

    doubler.send_message(&CounterReading { value: 21 })?;
    assert!(wait_until(Duration::from_secs(1), || !doubled.lock().unwrap().is_empty()).await);
    assert_eq!(*doubled.lock().unwrap(), vec![42]);

    runtime.shutdown_all().await
}
