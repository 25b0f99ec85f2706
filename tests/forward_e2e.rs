//! Full forwarding runs against a mock backend and sink, with cursors kept on
//! local disk.

use std::time::Duration;

use checkpoint::{CursorStore, FilesystemStore};
use forward_types::{Cursor, ObservationPolicy};
use mockito::{Matcher, Server};
use serde_json::json;
use stream_forward::{
    forward_changes, CursorStorage, ForwarderConfig, RunOutcome, SyncError, SyncStep,
};
use stream_forward_feed_source::BackendConfig;

const STATE_KEY: &str = "plant-sensors-cursor";

fn forwarder_config(server: &mockito::Server, cursor_dir: &std::path::Path) -> ForwarderConfig {
    ForwarderConfig {
        backend: BackendConfig {
            endpoint: server.url(),
            token: Some("secret-token".to_string()),
            request_timeout: Duration::from_secs(5),
        },
        subscription: "plant-sensors".to_string(),
        state_key: STATE_KEY.to_string(),
        sink_url: format!("{}/ingest", server.url()),
        page_limit: 100,
        step_timeout: Duration::from_secs(30),
        cursor_storage: CursorStorage::Filesystem {
            dir: cursor_dir.to_path_buf(),
        },
        observation_policy: ObservationPolicy::First,
        dry_run: false,
    }
}

async fn mock_feed_page(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/timeseries/subscriptions/data/list")
        .match_body(Matcher::Json(json!({"externalId": "plant-sensors", "limit": 100})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "updates": [
                    {"timeSeries": {"id": 101}, "upserts": [{"timestamp": 1699383982462_i64, "value": 98.6}]},
                    {"timeSeries": {"id": 102}, "deletes": [{"inclusiveBegin": 0}]}
                ],
                "cursor": "c1",
                "hasNext": false
            })
            .to_string(),
        )
        .create_async()
        .await
}

async fn mock_metadata(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/timeseries/byids")
        .match_body(Matcher::Json(json!({
            "items": [{"id": 101}],
            "ignoreUnknownIds": true
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"items": [
                {"id": 101, "externalId": "EVE-1", "name": "Boiler temperature", "unit": "C"}
            ]})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_run_delivers_batch_then_persists_cursor() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    let feed = mock_feed_page(&mut server).await;
    let metadata = mock_metadata(&mut server).await;
    let sink = server
        .mock("POST", "/ingest")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!([{
            "timestamp": "2023-11-07T19:06:22.462Z",
            "value": 98.6,
            "unit": "C",
            "sensor": "Boiler temperature",
            "tag": "EVE-1"
        }])))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let outcome = forward_changes(&forwarder_config(&server, dir.path()))
        .await
        .unwrap();

    feed.assert_async().await;
    metadata.assert_async().await;
    sink.assert_async().await;
    assert_eq!(
        outcome,
        RunOutcome::CursorAdvanced {
            records: 2,
            published: 1,
            cursor: Cursor::new("c1"),
        }
    );

    let store = FilesystemStore::new(dir.path());
    let stored = store.read_cursor(STATE_KEY).await.unwrap().unwrap();
    assert_eq!(stored.cursor, Cursor::new("c1"));
}

#[tokio::test]
async fn test_rejected_batch_leaves_cursor_unwritten() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    mock_feed_page(&mut server).await;
    mock_metadata(&mut server).await;
    let sink = server
        .mock("POST", "/ingest")
        .with_status(500)
        .with_body("ingest down")
        .expect(1)
        .create_async()
        .await;

    let err = forward_changes(&forwarder_config(&server, dir.path()))
        .await
        .unwrap_err();

    sink.assert_async().await;
    let sync_error = err.downcast_ref::<SyncError>().unwrap();
    assert_eq!(sync_error.step, SyncStep::Publish);
    assert!(format!("{err:#}").contains("ingest down"));

    let store = FilesystemStore::new(dir.path());
    assert!(store.read_cursor(STATE_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_caught_up_run_is_a_no_op() {
    let mut server = Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    let store = FilesystemStore::new(dir.path());
    store
        .store_cursor(STATE_KEY, &Cursor::new("c1"))
        .await
        .unwrap();

    server
        .mock("POST", "/timeseries/subscriptions/data/list")
        .match_body(Matcher::Json(
            json!({"externalId": "plant-sensors", "cursor": "c1", "limit": 100}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"updates": [], "cursor": "c1", "hasNext": false}).to_string())
        .expect(1)
        .create_async()
        .await;
    let metadata = server
        .mock("POST", "/timeseries/byids")
        .expect(0)
        .create_async()
        .await;
    let sink = server.mock("POST", "/ingest").expect(0).create_async().await;

    let outcome = forward_changes(&forwarder_config(&server, dir.path()))
        .await
        .unwrap();

    metadata.assert_async().await;
    sink.assert_async().await;
    assert_eq!(
        outcome,
        RunOutcome::NoOp {
            cursor: Some(Cursor::new("c1"))
        }
    );
    assert_eq!(store.history(STATE_KEY).unwrap().len(), 1);
}
