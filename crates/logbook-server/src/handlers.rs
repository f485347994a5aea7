//! Logbook Request Handlers
//!
//! HTTP request handlers for the history, track, ingestion and playback
//! endpoints. Failures are mapped onto status codes by [`ApiError`].
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use futures::stream::{self, Stream};
use logbook_common::utils::{parse_duration_spec, parse_timestamp};
use logbook_common::{Delta, LogbookError};
use logbook_history::{PathSpec, PlaybackHandle, PlaybackOptions, ValuesResult};
use logbook_tracks::{BoundingBox, GEOJSON_CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Errors
// =============================================================================

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString, code: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}

/// A failed request.
#[derive(Debug)]
pub struct ApiError(LogbookError);

impl From<LogbookError> for ApiError {
    fn from(err: LogbookError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            LogbookError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            LogbookError::DatastoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "DATASTORE_UNAVAILABLE")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse::new(&self.0, code))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, LogbookError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| LogbookError::validation(format!("missing parameter '{}'", name)))
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Not found handler.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Not found", "NOT_FOUND")),
    )
}

// =============================================================================
// History Endpoints
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ValuesParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub context: Option<String>,
    pub paths: Option<String>,
    /// Bucket width in milliseconds.
    pub resolution: Option<i64>,
}

/// Tabular history for one context.
pub async fn get_values(
    State(state): State<AppState>,
    Query(params): Query<ValuesParams>,
) -> ApiResult<Json<ValuesResult>> {
    let from = parse_timestamp(required(&params.from, "from")?)?;
    let to = parse_timestamp(required(&params.to, "to")?)?;
    let specs = PathSpec::parse_list(required(&params.paths, "paths")?)?;

    let result = state
        .history
        .reconstruct(params.context.as_deref(), from, to, &specs, params.resolution)
        .await?;
    Ok(Json(result))
}

/// Distinct recorded contexts.
pub async fn get_contexts(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.history.contexts().await?))
}

#[derive(Debug, Deserialize)]
pub struct PathsParams {
    pub context: Option<String>,
}

/// Distinct recorded paths, optionally for one context.
pub async fn get_paths(
    State(state): State<AppState>,
    Query(params): Query<PathsParams>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.history.paths(params.context.as_deref()).await?))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotParams {
    pub time: Option<String>,
    pub context: Option<String>,
}

/// Latest recorded state as of `time`, as delta envelopes.
pub async fn get_snapshot(
    State(state): State<AppState>,
    Query(params): Query<SnapshotParams>,
) -> ApiResult<Json<Vec<Delta>>> {
    let at = parse_timestamp(required(&params.time, "time")?)?;
    Ok(Json(state.history.snapshot(at, params.context.as_deref()).await?))
}

// =============================================================================
// Track Endpoints
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TracksParams {
    pub bbox: Option<String>,
    pub paths: Option<String>,
    pub context: Option<String>,
}

/// Track geometry intersecting a viewport.
pub async fn get_tracks(
    State(state): State<AppState>,
    Query(params): Query<TracksParams>,
) -> ApiResult<Response> {
    let bbox: BoundingBox = required(&params.bbox, "bbox")?.parse()?;
    let aux_paths = match &params.paths {
        Some(raw) => raw
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathSpec::parse(p).map(|spec| spec.path))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let collection = state
        .track_query
        .tracks_in(&bbox, &aux_paths, params.context.as_deref())
        .await?;
    Ok(([(header::CONTENT_TYPE, GEOJSON_CONTENT_TYPE)], Json(collection)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TrackParams {
    pub timespan: Option<String>,
    pub resolution: Option<String>,
}

/// Recent track as a single feature.
pub async fn get_track(
    State(state): State<AppState>,
    Query(params): Query<TrackParams>,
) -> ApiResult<Response> {
    let timespan = parse_duration_spec(params.timespan.as_deref().unwrap_or("1h"))?;
    let resolution = parse_duration_spec(params.resolution.as_deref().unwrap_or("1m"))?;

    let feature = state
        .track_query
        .legacy_track(timespan, resolution, Utc::now())
        .await?;
    Ok(([(header::CONTENT_TYPE, GEOJSON_CONTENT_TYPE)], Json(feature)).into_response())
}

// =============================================================================
// Ingestion
// =============================================================================

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: bool,
    pub subscribers: usize,
}

/// Push one delta envelope onto the ingestion source.
pub async fn post_delta(
    State(state): State<AppState>,
    Json(delta): Json<Delta>,
) -> impl IntoResponse {
    let subscribers = state.source.publish(delta);
    (
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            accepted: true,
            subscribers,
        }),
    )
}

// =============================================================================
// Playback
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackParams {
    pub start_time: Option<String>,
    pub playback_rate: Option<f64>,
    pub context: Option<String>,
}

/// Cancels its session when the event stream is dropped.
struct SessionGuard(PlaybackHandle);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Replay history from `startTime` as server-sent `delta` events.
pub async fn stream_playback(
    State(state): State<AppState>,
    Query(params): Query<PlaybackParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let start = parse_timestamp(required(&params.start_time, "startTime")?)?;
    let mut options = PlaybackOptions::new(start).with_rate(params.playback_rate.unwrap_or(1.0));
    if let Some(context) = params.context {
        options = options.with_context(context);
    }

    let session_id = Uuid::new_v4().to_string();
    let (handle, receiver) = state.playback.start(session_id, options)?;
    tracing::debug!(session = %handle.session_id(), "playback stream opened");

    let events = stream::unfold(
        (receiver, SessionGuard(handle)),
        |(mut receiver, guard)| async move {
            let delta = receiver.recv().await?;
            let event = Event::default().event("delta").json_data(&delta);
            Some((event, (receiver, guard)))
        },
    );
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityParams {
    pub start_time: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub available: bool,
}

/// Whether playback from `startTime` would find any data.
pub async fn get_playback_availability(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let start = parse_timestamp(required(&params.start_time, "startTime")?)?;
    let available = state
        .history
        .has_any_data(start, params.context.as_deref())
        .await;
    Ok(Json(AvailabilityResponse { available }))
}
