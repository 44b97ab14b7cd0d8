#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use telemetry_pipeline::analytics::error::{storage_error, AnalyticsResult};
use telemetry_pipeline::analytics::{
    params, Analytics, AnalyticsConfig, EventParams, PipelineState, CLIENT_ID_KEY,
};
use telemetry_pipeline::logger::Logger;
use telemetry_pipeline::platform::storage::{KeyValueStore, KeyValueStoreHandle, MemoryStore};

fn quiet_logger() -> Logger {
    let logger = Logger::new("@telemetry/pipeline-test");
    logger.set_console_enabled(false);
    logger
}

fn config_for(server: &MockServer) -> AnalyticsConfig {
    AnalyticsConfig::new(server.url("/batch"), "G-PIPELINE", "pipeline-secret")
        .with_flush_interval(Duration::from_secs(3600))
        .with_request_timeout(Duration::from_millis(500))
}

fn analytics(config: AnalyticsConfig, store: KeyValueStoreHandle) -> Analytics {
    Analytics::builder(config)
        .with_store(store)
        .with_logger(quiet_logger())
        .build()
}

struct UnavailableStore;

#[async_trait::async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _key: &str) -> AnalyticsResult<Option<String>> {
        Err(storage_error("storage disabled"))
    }

    async fn set(&self, _key: &str, _value: &str) -> AnalyticsResult<()> {
        Err(storage_error("storage disabled"))
    }

    async fn remove(&self, _key: &str) -> AnalyticsResult<()> {
        Err(storage_error("storage disabled"))
    }
}

#[tokio::test(flavor = "current_thread")]
async fn tracked_events_are_delivered_in_one_batch() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/batch")
                .query_param("measurement_id", "G-PIPELINE")
                .query_param("api_secret", "pipeline-secret")
                .body_contains("\"name\":\"button_click\"");
            then.status(204);
        })
        .await;

    let analytics = analytics(config_for(&server), Arc::new(MemoryStore::new()));
    assert!(analytics.init().await);

    for index in 0..5 {
        assert!(
            analytics
                .track_event("button_click", params([("index", index)]))
                .await
        );
    }
    assert_eq!(analytics.queue_status().queue_size, 5);

    assert!(analytics.flush().await);
    assert_eq!(analytics.queue_status().queue_size, 0);
    mock.assert_async().await;
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_config_refuses_all_tracking() {
    let config = AnalyticsConfig {
        measurement_id: Some("G-ONLY".into()),
        ..AnalyticsConfig::default()
    };
    let analytics = analytics(config, Arc::new(MemoryStore::new()));

    assert!(!analytics.init().await);
    assert_eq!(analytics.state(), PipelineState::Failed);
    assert!(!analytics.track_event("page_view", EventParams::new()).await);
    assert!(!analytics.flush().await);

    let status = analytics.status();
    assert!(!status.initialized);
    assert!(!status.environment_valid);
    assert_eq!(status.queue_size, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_delivery_keeps_events_for_the_next_flush() {
    let server = MockServer::start_async().await;
    let mut outage = server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(503).body("unavailable");
        })
        .await;

    let analytics = analytics(config_for(&server), Arc::new(MemoryStore::new()));
    assert!(analytics.init().await);
    for name in ["first", "second", "third"] {
        assert!(analytics.track_event(name, EventParams::new()).await);
    }

    assert!(!analytics.flush().await);
    assert_eq!(analytics.queue_status().queue_size, 3);
    outage.assert_hits_async(1).await;
    outage.delete_async().await;

    let recovered = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/batch")
                .body_contains("\"name\":\"first\"")
                .body_contains("\"name\":\"third\"");
            then.status(200);
        })
        .await;

    assert!(analytics.flush().await);
    assert_eq!(analytics.queue_status().queue_size, 0);
    recovered.assert_async().await;
}

#[tokio::test(flavor = "current_thread")]
async fn unreachable_endpoint_reports_false() {
    let config = AnalyticsConfig::new("http://127.0.0.1:9/batch", "G-PIPELINE", "secret")
        .with_flush_interval(Duration::from_secs(3600))
        .with_request_timeout(Duration::from_millis(300));
    let analytics = analytics(config, Arc::new(MemoryStore::new()));
    assert!(analytics.init().await);
    assert!(analytics.track_event("offline", EventParams::new()).await);

    assert!(!analytics.flush().await);
    assert_eq!(analytics.queue_status().queue_size, 1);
    assert!(!analytics.status().is_processing);
}

#[tokio::test(flavor = "current_thread")]
async fn client_id_survives_restart() {
    let server = MockServer::start_async().await;
    let store: KeyValueStoreHandle = Arc::new(MemoryStore::new());

    let first = analytics(config_for(&server), store.clone());
    assert!(first.init().await);
    let first_status = first.status();
    drop(first);

    let second = analytics(config_for(&server), store.clone());
    assert!(second.init().await);
    let second_status = second.status();

    assert_eq!(first_status.client_id, second_status.client_id);
    assert_eq!(first_status.session_id, second_status.session_id);
    assert_eq!(
        store.get(CLIENT_ID_KEY).await.unwrap(),
        second_status.client_id
    );
}

#[tokio::test(flavor = "current_thread")]
async fn unavailable_storage_falls_back_to_process_identity() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(200);
        })
        .await;

    let analytics = analytics(config_for(&server), Arc::new(UnavailableStore));
    assert!(analytics.init().await);
    let client_id = analytics.status().client_id.unwrap();

    assert!(analytics.track_event("still_counted", EventParams::new()).await);
    assert!(analytics.flush().await);
    assert_eq!(analytics.status().client_id.as_deref(), Some(client_id.as_str()));
    mock.assert_async().await;
}

#[tokio::test(flavor = "current_thread")]
async fn shutdown_delivers_what_is_left() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/batch");
            then.status(200);
        })
        .await;

    let config = config_for(&server)
        .with_batch_size(2)
        .with_flush_on_full_batch(false);
    let analytics = analytics(config, Arc::new(MemoryStore::new()));
    assert!(analytics.init().await);
    for name in ["a", "b", "c"] {
        assert!(analytics.track_event(name, EventParams::new()).await);
    }

    assert!(analytics.shutdown(true).await);
    assert_eq!(analytics.queue_status().queue_size, 0);
    mock.assert_hits_async(2).await;
}
