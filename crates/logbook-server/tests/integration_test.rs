//! End-to-end integration tests for Logbook Server
//!
//! Drives the full flow: delta ingestion, history queries, track geometry
//! and playback streaming.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use logbook_common::utils::format_timestamp;
use logbook_server::{create_router, AppState, ServerConfig};
use logbook_timeseries::MemoryPointStore;
use logbook_tracks::{SqliteTrackStore, GEOJSON_CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::Service;

const SELF: &str = "vessels.urn:mrn:imo:mmsi:230000000";

/// Helper to make a GET request and return JSON response.
async fn get_json(app: &mut axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .call(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Helper to make a POST request with JSON body and return JSON response.
async fn post_json(app: &mut axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .call(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default()
        .with_self_context(Some(SELF.to_string()))
        .with_record_track(true);
    config.logbook.playback.tick_ms = 100;
    config
}

fn test_state() -> (AppState, Arc<MemoryPointStore>) {
    let points = Arc::new(MemoryPointStore::new());
    let tracks = Arc::new(SqliteTrackStore::in_memory().unwrap());
    (AppState::with_stores(test_config(), points.clone(), tracks), points)
}

fn nav_delta(ts: DateTime<Utc>, speed: f64) -> Value {
    json!({
        "context": "vessels.self",
        "updates": [{
            "timestamp": format_timestamp(ts),
            "$source": "gps.1",
            "values": [
                {"path": "navigation.speedOverGround", "value": speed},
                {"path": "navigation.position", "value": {"latitude": 60.15, "longitude": 24.95}}
            ]
        }]
    })
}

/// Wait until the recorder has processed `count` deltas and their spawned
/// point writes have had a chance to land.
async fn wait_for_recorder(state: &AppState, count: u64) {
    for _ in 0..400 {
        if state.recorder.stats().deltas_processed >= count {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(state.recorder.stats().deltas_processed, count);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}

/// Records three samples ten minutes apart, ending ten minutes before `now`.
async fn seeded_app(now: DateTime<Utc>) -> (AppState, axum::Router) {
    let (state, _) = test_state();
    let mut app = create_router(state.clone());

    for (i, minutes) in [30, 20, 10].into_iter().enumerate() {
        let (status, json) = post_json(
            &mut app,
            "/deltas",
            nav_delta(now - Duration::minutes(minutes), i as f64 + 1.0),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["subscribers"], 1);
    }

    wait_for_recorder(&state, 3).await;
    (state, app)
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (state, _) = test_state();
    let mut app = create_router(state);
    let (status, json) = get_json(&mut app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

// =============================================================================
// History E2E Tests
// =============================================================================

#[tokio::test]
async fn test_ingest_then_query_values_e2e() {
    let now = Utc::now();
    let (state, mut app) = seeded_app(now).await;
    assert_eq!(state.recorder.stats().track_points, 3);

    let uri = format!(
        "/history/values?from={}&to={}&paths=navigation.speedOverGround:max,navigation.position&resolution=60000",
        format_timestamp(now - Duration::minutes(40)),
        format_timestamp(now)
    );
    let (status, json) = get_json(&mut app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["context"], SELF);
    assert_eq!(json["values"][0]["path"], "navigation.speedOverGround");
    assert_eq!(json["values"][0]["method"], "max");
    assert_eq!(json["values"][1]["method"], "first");

    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data[0][1], 1.0);
    assert_eq!(data[2][1], 3.0);
    assert_eq!(data[0][2], json!([24.95, 60.15]));
}

#[tokio::test]
async fn test_discovery_e2e() {
    let (_state, mut app) = seeded_app(Utc::now()).await;

    let (status, contexts) = get_json(&mut app, "/history/contexts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contexts, json!([SELF]));

    let (status, paths) = get_json(&mut app, "/history/paths").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paths, json!(["navigation.position", "navigation.speedOverGround"]));

    let (_, paths) = get_json(&mut app, "/history/paths?context=vessels.other").await;
    assert_eq!(paths, json!([]));
}

#[tokio::test]
async fn test_snapshot_e2e() {
    let now = Utc::now();
    let (_state, mut app) = seeded_app(now).await;

    let uri = format!(
        "/history/snapshot?time={}",
        format_timestamp(now - Duration::minutes(19))
    );
    let (status, json) = get_json(&mut app, &uri).await;
    assert_eq!(status, StatusCode::OK);

    let deltas = json.as_array().unwrap();
    let speed = deltas
        .iter()
        .flat_map(|d| d["updates"].as_array().unwrap())
        .flat_map(|u| u["values"].as_array().unwrap())
        .find(|v| v["path"] == "navigation.speedOverGround")
        .unwrap();
    assert_eq!(speed["value"], 2.0);

    let (status, _) = get_json(&mut app, "/history/snapshot").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_values_validation_e2e() {
    let (state, _) = test_state();
    let mut app = create_router(state);

    let (status, json) = get_json(&mut app, "/history/values?from=2024-05-01T10:00:00Z").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("to"));

    let (status, _) = get_json(
        &mut app,
        "/history/values?from=2024-05-01T11:00:00Z&to=2024-05-01T10:00:00Z&paths=a.b",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(
        &mut app,
        "/history/values?from=2024-05-01T10:00:00Z&to=2024-05-01T11:00:00Z&paths=a.b:median",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_datastore_unavailable_e2e() {
    let (state, points) = test_state();
    let mut app = create_router(state);
    points.set_offline(true);

    let (status, json) = get_json(&mut app, "/history/contexts").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "DATASTORE_UNAVAILABLE");

    // ingestion stays accepted; the write failure is only logged
    let (status, _) = post_json(&mut app, "/deltas", nav_delta(Utc::now(), 1.0)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

// =============================================================================
// Track E2E Tests
// =============================================================================

#[tokio::test]
async fn test_tracks_in_viewport_e2e() {
    let (_state, mut app) = seeded_app(Utc::now()).await;

    let response = app
        .call(
            Request::builder()
                .uri("/tracks?bbox=24.9,60.1,25.0,60.2&paths=navigation.speedOverGround")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], GEOJSON_CONTENT_TYPE);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["type"], "FeatureCollection");

    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["geometry"]["type"], "MultiLineString");
    assert!(features[0]["properties"]["id"].is_number());
    assert!(features[0]["properties"]["values"]["navigation.speedOverGround"].is_array());

    // a viewport elsewhere sees nothing
    let (status, json) = get_json(&mut app, "/tracks?bbox=-10,40,-9,41").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["features"], json!([]));
}

#[tokio::test]
async fn test_tracks_validation_e2e() {
    let (state, _) = test_state();
    let mut app = create_router(state);

    for uri in ["/tracks", "/tracks?bbox=1,2,3", "/tracks?bbox=25,60,24,61", "/tracks?bbox=a,b,c,d"] {
        let (status, json) = get_json(&mut app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_legacy_track_e2e() {
    let (_state, mut app) = seeded_app(Utc::now()).await;

    let (status, json) = get_json(&mut app, "/track?timespan=1h&resolution=1m").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["type"], "Feature");
    let lines = json["geometry"]["coordinates"].as_array().unwrap();
    let coordinates: usize = lines.iter().map(|l| l.as_array().unwrap().len()).sum();
    assert_eq!(coordinates, 3);

    let (status, _) = get_json(&mut app, "/track?timespan=1y").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get_json(&mut app, "/track?timespan=100000000w").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION");

    // a fine grid over a long span costs only the occupied buckets
    let (status, json) = get_json(&mut app, "/track?timespan=1000w&resolution=1s").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["geometry"]["coordinates"].as_array().unwrap().len(), 3);
}

// =============================================================================
// Playback E2E Tests
// =============================================================================

#[tokio::test]
async fn test_playback_availability_e2e() {
    let now = Utc::now();
    let (_state, mut app) = seeded_app(now).await;

    let uri = format!(
        "/history/playback/available?startTime={}",
        format_timestamp(now - Duration::minutes(30) - Duration::seconds(1))
    );
    let (status, json) = get_json(&mut app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], true);

    let uri = format!(
        "/history/playback/available?startTime={}",
        format_timestamp(now - Duration::hours(5))
    );
    let (_, json) = get_json(&mut app, &uri).await;
    assert_eq!(json["available"], false);
}

#[tokio::test]
async fn test_playback_stream_e2e() {
    let now = Utc::now();
    let (state, mut app) = seeded_app(now).await;

    let uri = format!(
        "/history/playback?startTime={}&playbackRate=10",
        format_timestamp(now - Duration::minutes(30) - Duration::milliseconds(500))
    );
    let response = app
        .call(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.playback.active_sessions().len(), 1);

    let mut body = response.into_body().into_data_stream();
    let mut buffer = String::new();
    let received = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !buffer.contains("event: delta") || !buffer.ends_with("\n\n") {
            match body.next().await {
                Some(Ok(chunk)) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                _ => return false,
            }
        }
        true
    })
    .await
    .unwrap_or(false);
    assert!(received, "no playback event: {:?}", buffer);

    let data = buffer
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let delta: Value = serde_json::from_str(data).unwrap();
    assert_eq!(delta["context"], SELF);

    // closing the stream stops the session
    drop(body);
    assert!(state.playback.active_sessions().is_empty());
}

#[tokio::test]
async fn test_playback_rejects_bad_rate_e2e() {
    let (state, _) = test_state();
    let mut app = create_router(state.clone());

    let (status, _) = get_json(
        &mut app,
        "/history/playback?startTime=2024-05-01T10:00:00Z&playbackRate=0",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(
        &mut app,
        "/history/playback?startTime=2024-05-01T10:00:00Z&playbackRate=1e20",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.playback.active_sessions().is_empty());

    let (status, _) = get_json(&mut app, "/history/playback").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
