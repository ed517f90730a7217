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

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use backplane::prelude::*;

use crate::setup::components::{
    counter_descriptor, gate_descriptor, panicky_descriptor, release_log, wait_until,
};
use crate::setup::initialize_tracing;
use crate::setup::messages::{GateCommand, GateOutcome};

mod setup;

/// A reachable manager answers liveness probes.
#[tokio::test]
async fn manager_answers_ping() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(counter_descriptor("counter", release_log()));
    ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let counter = Connector::attach(&runtime, "counter", &host).await?;
    counter.ping(None).await?;

    runtime.shutdown_all().await
}

/// Starting an unregistered component type is rejected with a clear
/// remote error.
#[tokio::test]
async fn unknown_component_type_is_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    ComponentManager::start(&runtime, ComponentRegistry::new()).await?;
    let host = runtime.host_id().to_string();

    let error = Connector::attach(&runtime, "nonexistent", &host)
        .await
        .expect_err("attach to an unregistered type must fail");
    assert!(
        error.to_string().contains("unknown component type"),
        "unexpected error: {error:#}"
    );

    runtime.shutdown_all().await
}

/// The first attach instantiates; later attaches reuse the running
/// instance and agree on its topics.
#[tokio::test]
async fn attach_reuses_the_running_instance() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(counter_descriptor("counter", release_log()));
    let manager = ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let first = Connector::attach(&runtime, "counter", &host).await?;
    let second = Connector::attach(&runtime, "counter", &host).await?;

    assert_eq!(manager.instance_count(), 1);
    assert_eq!(first.input_topic(), second.input_topic());
    assert_eq!(first.output_topic(), second.output_topic());

    runtime.shutdown_all().await
}

/// Instance qualifiers produce distinct components with distinct topics.
#[tokio::test]
async fn instance_qualifiers_create_distinct_components() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(counter_descriptor("counter", release_log()));
    let manager = ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let top = Connector::attach_instance(&runtime, "counter", &host, "top").await?;
    let bottom = Connector::attach_instance(&runtime, "counter", &host, "bottom").await?;

    assert_eq!(manager.instance_count(), 2);
    assert_ne!(top.input_topic(), bottom.input_topic());

    runtime.shutdown_all().await
}

/// Sensors have no inputs, so wiring one as a pipeline target is refused.
#[tokio::test]
async fn wiring_a_sensor_is_refused() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(counter_descriptor("counter", release_log()));
    ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let counter = Connector::attach(&runtime, "counter", &host).await?;
    match counter.connect_source(&counter).await {
        Err(RequestError::Remote(reason)) => assert!(reason.contains("no inputs")),
        other => panic!("expected a remote rejection, got {other:?}"),
    }

    runtime.shutdown_all().await
}

/// A crashed component is detected and marked unavailable: the pending
/// request times out instead of hanging, the instance disappears, and a
/// fresh attach starts a new one.
#[tokio::test]
async fn crashed_component_is_marked_unavailable() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(panicky_descriptor());
    let manager = ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let panicky = Connector::attach(&runtime, "panicky", &host).await?;
    assert_eq!(manager.instance_count(), 1);

    let result: Result<GateOutcome, RequestError> = panicky
        .request(&GateCommand::quick(), Some(Duration::from_millis(400)))
        .await;
    assert!(matches!(result, Err(RequestError::Timeout(_))));

    assert!(
        wait_until(Duration::from_secs(1), || manager.instance_count() == 0).await,
        "crashed instance was not removed"
    );

    // A fresh attach starts a replacement instance.
    let _replacement = Connector::attach(&runtime, "panicky", &host).await?;
    assert_eq!(manager.instance_count(), 1);

    runtime.shutdown_all().await
}

/// One manager per host: a second manager for the same host aborts
/// startup with a diagnostic instead of fighting over the control topic.
#[tokio::test]
async fn duplicate_manager_for_a_host_is_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    ComponentManager::start(&runtime, ComponentRegistry::new()).await?;

    match ComponentManager::start(&runtime, ComponentRegistry::new()).await {
        Err(ManagerError::StartupFailed(reason)) => assert!(reason.contains("already serving")),
        other => panic!("expected startup failure, got {other:?}"),
    }

    runtime.shutdown_all().await
}

/// Reserved type names never become components; the control plane keeps
/// its addressing to itself.
#[tokio::test]
async fn reserved_type_names_are_refused() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let registry = ComponentRegistry::new().with(counter_descriptor("manager", release_log()));
    ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let error = Connector::attach(&runtime, "manager", &host)
        .await
        .expect_err("reserved names must be refused");
    assert!(error.to_string().contains("reserved"), "unexpected error: {error:#}");

    runtime.shutdown_all().await
}

/// Stopping a component through one connector resolves outstanding work
/// while a second connector to the same instance keeps functioning for
/// control-plane traffic.
#[tokio::test]
async fn stop_through_one_connector_is_visible_to_all() -> anyhow::Result<()> {
    initialize_tracing();
    let mut runtime = BackplaneApp::launch();
    let executed = Arc::new(AtomicU64::new(0));
    let registry = ComponentRegistry::new().with(gate_descriptor(executed, release_log()));
    let manager = ComponentManager::start(&runtime, registry).await?;
    let host = runtime.host_id().to_string();

    let first = Connector::attach(&runtime, "gate", &host).await?;
    let second = Connector::attach(&runtime, "gate", &host).await?;

    first.stop_component().await?;
    assert_eq!(manager.instance_count(), 0);

    // The other connector's requests now time out rather than hang.
    let result: Result<GateOutcome, RequestError> = second
        .request(&GateCommand::quick(), Some(Duration::from_millis(200)))
        .await;
    assert!(matches!(result, Err(RequestError::Timeout(_))));

    runtime.shutdown_all().await
}
