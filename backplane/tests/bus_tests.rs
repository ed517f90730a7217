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

use crate::setup::components::wait_until;
use crate::setup::initialize_tracing;
use crate::setup::messages::CounterReading;

mod setup;

fn reading_envelope(value: u64) -> WireEnvelope {
    WireEnvelope::event(&CounterReading { value }).expect("encode")
}

/// A single subscriber sees every published envelope in publish order.
#[tokio::test]
async fn publish_order_is_preserved_per_subscriber() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let topic = Topic::new("stream", runtime.host_id())?;

    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let subscription = runtime.bus().subscribe_with(&topic, {
        let seen = seen.clone();
        move |envelope| {
            if let Ok(reading) = decode_typed::<CounterReading>(&envelope) {
                seen.lock().unwrap().push(reading.value);
            }
        }
    })?;

    for value in 0..200 {
        runtime.bus().publish(&topic, reading_envelope(value))?;
    }

    assert!(
        wait_until(Duration::from_secs(2), || seen.lock().unwrap().len() == 200).await,
        "expected all 200 envelopes to be delivered"
    );
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, (0..200).collect::<Vec<_>>());

    subscription.cancel();
    runtime.shutdown_all().await
}

/// Every current subscriber of a topic receives every envelope.
#[tokio::test]
async fn all_subscribers_receive_independently() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let topic = Topic::new("stream", runtime.host_id())?;

    let first: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let second: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let _sub_a = runtime.bus().subscribe_with(&topic, {
        let first = first.clone();
        move |envelope| {
            if let Ok(reading) = decode_typed::<CounterReading>(&envelope) {
                first.lock().unwrap().push(reading.value);
            }
        }
    })?;
    let _sub_b = runtime.bus().subscribe_with(&topic, {
        let second = second.clone();
        move |envelope| {
            if let Ok(reading) = decode_typed::<CounterReading>(&envelope) {
                second.lock().unwrap().push(reading.value);
            }
        }
    })?;

    for value in 0..20 {
        runtime.bus().publish(&topic, reading_envelope(value))?;
    }

    assert!(
        wait_until(Duration::from_secs(2), || {
            first.lock().unwrap().len() == 20 && second.lock().unwrap().len() == 20
        })
        .await
    );
    assert_eq!(*first.lock().unwrap(), *second.lock().unwrap());

    runtime.shutdown_all().await
}

/// Cancelling a subscription stops delivery; the other subscriber keeps
/// receiving.
#[tokio::test]
async fn cancelled_subscription_receives_nothing_further() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let topic = Topic::new("stream", runtime.host_id())?;

    let cancelled: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let retained: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let sub_cancel = runtime.bus().subscribe_with(&topic, {
        let cancelled = cancelled.clone();
        move |envelope| {
            if let Ok(reading) = decode_typed::<CounterReading>(&envelope) {
                cancelled.lock().unwrap().push(reading.value);
            }
        }
    })?;
    let _sub_keep = runtime.bus().subscribe_with(&topic, {
        let retained = retained.clone();
        move |envelope| {
            if let Ok(reading) = decode_typed::<CounterReading>(&envelope) {
                retained.lock().unwrap().push(reading.value);
            }
        }
    })?;

    runtime.bus().publish(&topic, reading_envelope(1))?;
    assert!(wait_until(Duration::from_secs(1), || cancelled.lock().unwrap().len() == 1).await);

    sub_cancel.cancel();
    assert_eq!(runtime.bus().subscriber_count(&topic), 1);

    runtime.bus().publish(&topic, reading_envelope(2))?;
    assert!(wait_until(Duration::from_secs(1), || retained.lock().unwrap().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*cancelled.lock().unwrap(), vec![1]);

    runtime.shutdown_all().await
}

/// No persistence or replay: a subscriber connecting after a publish never
/// sees it.
#[tokio::test]
async fn late_subscriber_misses_earlier_messages() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let topic = Topic::new("stream", runtime.host_id())?;

    runtime.bus().publish(&topic, reading_envelope(1))?;
    runtime.bus().publish(&topic, reading_envelope(2))?;

    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let _subscription = runtime.bus().subscribe_with(&topic, {
        let seen = seen.clone();
        move |envelope| {
            if let Ok(reading) = decode_typed::<CounterReading>(&envelope) {
                seen.lock().unwrap().push(reading.value);
            }
        }
    })?;

    runtime.bus().publish(&topic, reading_envelope(3))?;
    assert!(wait_until(Duration::from_secs(1), || !seen.lock().unwrap().is_empty()).await);
    assert_eq!(*seen.lock().unwrap(), vec![3]);

    runtime.shutdown_all().await
}

/// A slow consumer's buffer overflows by dropping the newest envelopes for
/// that consumer only — the producer is never blocked.
#[tokio::test]
async fn slow_subscriber_drops_at_its_own_buffer() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let topic = Topic::new("stream", runtime.host_id())?;

    // A stream subscription that never consumes, with a tiny buffer.
    let (subscription, mut rx) = runtime.bus().subscribe_buffered(&topic, 4)?;

    for value in 0..10 {
        runtime.bus().publish(&topic, reading_envelope(value))?;
    }

    // Exactly the first four envelopes fit; the rest were dropped here,
    // not at the producer.
    let mut received = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        received.push(decode_typed::<CounterReading>(&envelope)?.value);
    }
    assert_eq!(received, vec![0, 1, 2, 3]);

    subscription.cancel();
    runtime.shutdown_all().await
}

/// Publishing after shutdown surfaces a transport error instead of
/// silently vanishing.
#[tokio::test]
async fn publish_after_shutdown_is_an_error() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let topic = Topic::new("stream", runtime.host_id())?;
    let bus = runtime.bus().clone();

    runtime.shutdown_all().await?;

    assert!(matches!(
        bus.publish(&topic, reading_envelope(1)),
        Err(BusError::Unavailable)
    ));
    Ok(())
}
