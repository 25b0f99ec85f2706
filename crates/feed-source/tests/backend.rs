//! Backend client tests against a mock HTTP server.

use std::collections::BTreeSet;
use std::time::Duration;

use checkpoint::CursorStore;
use forward_types::{Cursor, Mutation, StreamId};
use mockito::{Matcher, Server};
use serde_json::json;
use stream_forward_feed_source::{
    BackendClient, BackendConfig, BackendMetadata, ChangeFeed, HttpChangeFeed, MetadataResolver,
    StreamCursorStore,
};

fn client_for(server: &Server) -> BackendClient {
    let config = BackendConfig {
        endpoint: server.url(),
        token: Some("secret-token".to_string()),
        request_timeout: Duration::from_secs(5),
    };
    BackendClient::new(&config).unwrap()
}

fn upsert(id: i64, timestamp: i64, value: f64) -> serde_json::Value {
    json!({
        "timeSeries": {"id": id, "externalId": format!("EVE-{id}")},
        "upserts": [{"timestamp": timestamp, "value": value}]
    })
}

// ============================================================================
// Change feed
// ============================================================================

#[tokio::test]
async fn test_feed_drains_all_pages() {
    let mut server = Server::new_async().await;

    let first = server
        .mock("POST", "/timeseries/subscriptions/data/list")
        .match_header("authorization", "Bearer secret-token")
        .match_body(Matcher::Json(json!({"externalId": "sensors", "limit": 3})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "updates": [upsert(1, 1000, 1.0), upsert(2, 1000, 2.0), upsert(3, 1000, 3.0)],
                "cursor": "c5",
                "hasNext": true
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let second = server
        .mock("POST", "/timeseries/subscriptions/data/list")
        .match_body(Matcher::Json(
            json!({"externalId": "sensors", "cursor": "c5", "limit": 3}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "updates": [
                    upsert(4, 2000, 4.0),
                    {"timeSeries": {"id": 5}, "deletes": [{"inclusiveBegin": 0, "exclusiveEnd": 10}]}
                ],
                "cursor": "c9",
                "hasNext": false
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let feed = HttpChangeFeed::new(client_for(&server)).with_limit(3);
    let batch = feed.fetch_changes("sensors", None).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;

    let ids: Vec<i64> = batch.records.iter().map(|r| r.stream_id.0).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(batch.records[4].mutation, Mutation::Delete);
    assert_eq!(batch.cursor, Cursor::new("c9"));
}

#[tokio::test]
async fn test_feed_error_status_fails_without_cursor() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/timeseries/subscriptions/data/list")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let feed = HttpChangeFeed::new(client_for(&server));
    let err = feed
        .fetch_changes("sensors", Some(&Cursor::new("c1")))
        .await
        .unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("503"));
    assert!(message.contains("upstream unavailable"));
}

#[tokio::test]
async fn test_feed_caught_up() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/timeseries/subscriptions/data/list")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"updates": [], "cursor": "c1", "hasNext": false}).to_string())
        .create_async()
        .await;

    let feed = HttpChangeFeed::new(client_for(&server));
    let batch = feed
        .fetch_changes("sensors", Some(&Cursor::new("c1")))
        .await
        .unwrap();

    assert!(batch.records.is_empty());
}

// ============================================================================
// Metadata
// ============================================================================

#[tokio::test]
async fn test_metadata_batched_lookup() {
    let mut server = Server::new_async().await;

    let lookup = server
        .mock("POST", "/timeseries/byids")
        .match_body(Matcher::Json(json!({
            "items": [{"id": 1}, {"id": 2}],
            "ignoreUnknownIds": true
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"items": [
                {"id": 1, "externalId": "EVE-1", "name": "Sensor A", "unit": "C"},
                {"id": 2, "externalId": "EVE-2", "name": "Sensor B"}
            ]})
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let resolver = BackendMetadata::new(client_for(&server));
    let ids: BTreeSet<StreamId> = [StreamId(2), StreamId(1)].into_iter().collect();
    let resolved = resolver.resolve(&ids).await.unwrap();

    lookup.assert_async().await;
    assert_eq!(resolved[&StreamId(1)].name, "Sensor A");
    assert_eq!(resolved[&StreamId(1)].unit, "C");
    assert_eq!(resolved[&StreamId(2)].unit, "");
}

#[tokio::test]
async fn test_metadata_missing_stream_fails() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/timeseries/byids")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"id": 1, "externalId": "EVE-1"}]}).to_string())
        .create_async()
        .await;

    let resolver = BackendMetadata::new(client_for(&server));
    let ids: BTreeSet<StreamId> = [StreamId(1), StreamId(77)].into_iter().collect();
    let err = resolver.resolve(&ids).await.unwrap_err();

    assert!(err.to_string().contains("77"));
}

// ============================================================================
// Cursor store
// ============================================================================

#[tokio::test]
async fn test_cursor_store_provisions_missing_stream() {
    let mut server = Server::new_async().await;

    let lookup = server
        .mock("POST", "/timeseries/byids")
        .match_body(Matcher::Json(json!({
            "items": [{"externalId": "sensors-state"}],
            "ignoreUnknownIds": true
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": []}).to_string())
        .expect(1)
        .create_async()
        .await;

    let create = server
        .mock("POST", "/timeseries")
        .match_body(Matcher::Json(json!({
            "items": [{"externalId": "sensors-state", "name": "sensors-state", "isString": true}]
        })))
        .with_status(201)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let latest = server
        .mock("POST", "/timeseries/data/latest")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"externalId": "sensors-state", "datapoints": []}]}).to_string())
        .expect(2)
        .create_async()
        .await;

    let store = StreamCursorStore::new(client_for(&server));
    assert!(store.read_cursor("sensors-state").await.unwrap().is_none());
    // Provisioning happens once per key.
    assert!(store.read_cursor("sensors-state").await.unwrap().is_none());

    lookup.assert_async().await;
    create.assert_async().await;
    latest.assert_async().await;
}

#[tokio::test]
async fn test_cursor_store_tolerates_concurrent_create() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/timeseries/byids")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": []}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/timeseries")
        .with_status(409)
        .with_body(r#"{"error": {"code": 409, "message": "duplicated"}}"#)
        .create_async()
        .await;
    let insert = server
        .mock("POST", "/timeseries/data")
        .match_body(Matcher::PartialJson(json!({
            "items": [{"externalId": "sensors-state", "datapoints": [{"value": "c9"}]}]
        })))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let store = StreamCursorStore::new(client_for(&server));
    store
        .store_cursor("sensors-state", &Cursor::new("c9"))
        .await
        .unwrap();

    insert.assert_async().await;
}

#[tokio::test]
async fn test_cursor_store_reads_latest_value() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/timeseries/byids")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": [{"id": 10, "externalId": "sensors-state"}]}).to_string())
        .create_async()
        .await;
    let create = server
        .mock("POST", "/timeseries")
        .expect(0)
        .create_async()
        .await;
    server
        .mock("POST", "/timeseries/data/latest")
        .match_body(Matcher::Json(json!({"items": [{"externalId": "sensors-state"}]})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"items": [{
                "externalId": "sensors-state",
                "datapoints": [{"timestamp": 1699383982462i64, "value": "c7"}]
            }]})
            .to_string(),
        )
        .create_async()
        .await;

    let store = StreamCursorStore::new(client_for(&server));
    let stored = store.read_cursor("sensors-state").await.unwrap().unwrap();

    create.assert_async().await;
    assert_eq!(stored.cursor, Cursor::new("c7"));
    assert_eq!(stored.written_at.timestamp_millis(), 1699383982462);
}

#[tokio::test]
async fn test_cursor_store_provision_failure_is_error() {
    let mut server = Server::new_async().await;

    server
        .mock("POST", "/timeseries/byids")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"items": []}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/timeseries")
        .with_status(403)
        .with_body("forbidden")
        .create_async()
        .await;

    let store = StreamCursorStore::new(client_for(&server));
    let err = store.read_cursor("sensors-state").await.unwrap_err();

    assert!(format!("{err:#}").contains("403"));
}
