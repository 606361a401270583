//! HTTP API v1: routing decisions for the chat widget and embed script.
//!
//! Endpoints:
//!
//! - `GET  /v1/channels`: List configured channels
//! - `GET  /v1/channels/{id}/destination`: Where a new chat would go
//! - `GET  /v1/channels/{id}/rule`: Rule governing the widget on a page
//! - `POST /v1/channels/{id}/sessions`: Route and start a conversation
//! - `POST /v1/maintenance/reclaim-calls`: Terminate stale call sessions
//! - `GET  /v1/status`: Gateway status

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use switchboard_core::{
    ChannelId, CountryCode, Destination, Error, Rule, RoutingRequest, Session,
};
use switchboard_routing::RoutingCoordinator;

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub coordinator: Arc<RoutingCoordinator>,
    pub channels: Vec<ChannelId>,
    /// Conversation/call backend name, for status
    pub backend: &'static str,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/channels", get(list_channels_handler))
        .route("/channels/{id}/destination", get(destination_handler))
        .route("/channels/{id}/rule", get(rule_handler))
        .route("/channels/{id}/sessions", post(start_session_handler))
        .route("/maintenance/reclaim-calls", post(reclaim_calls_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

/// What the widget knows about the visitor. Blank values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct VisitorContext {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub previous_agent: Option<String>,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub visitor_name: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl VisitorContext {
    pub fn into_request(self, channel: String) -> RoutingRequest {
        let mut req = RoutingRequest::new(channel);
        if let Some(url) = present(self.url) {
            req = req.with_url(url);
        }
        if let Some(country) = present(self.country) {
            req = req.with_country(country);
        }
        if let Some(lang) = present(self.lang) {
            req = req.with_lang(lang);
        }
        if let Some(agent) = present(self.previous_agent) {
            req = req.with_previous_agent(agent);
        }

        let name = present(self.visitor_name);
        match present(self.visitor_id) {
            Some(id) => req.with_visitor(id, name),
            None if name.is_some() => req.with_visitor(Uuid::new_v4().to_string(), name),
            None => req,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DestinationResponse {
    pub destination: Destination,
    /// False when the widget must hide or disable chat initiation
    pub chat_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelListResponse {
    pub channels: Vec<ChannelId>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReclaimResponse {
    pub reclaimed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub backend: String,
    pub channels: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Whether the same request may succeed later
    pub retryable: bool,
    /// Always false: the widget must not offer chat on an error
    pub chat_enabled: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error to an HTTP status.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        Error::NoDestination => StatusCode::CONFLICT,
        Error::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Rule(_) | Error::Config { .. } | Error::Serialization(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(err: Error) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "Routing request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            retryable: err.is_retryable(),
            chat_enabled: false,
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_channels_handler(State(state): State<SharedApiState>) -> Json<ChannelListResponse> {
    Json(ChannelListResponse {
        count: state.channels.len(),
        channels: state.channels.clone(),
    })
}

async fn destination_handler(
    State(state): State<SharedApiState>,
    Path(channel): Path<String>,
    Query(context): Query<VisitorContext>,
) -> Result<Json<DestinationResponse>, ApiError> {
    let req = context.into_request(channel);
    let destination = state.coordinator.route(&req).await.map_err(api_error)?;
    Ok(Json(DestinationResponse {
        chat_enabled: destination.accepts_chat(),
        destination,
    }))
}

async fn rule_handler(
    State(state): State<SharedApiState>,
    Path(channel): Path<String>,
    Query(page): Query<PageContext>,
) -> Result<Json<Option<Rule>>, ApiError> {
    let url = present(page.url);
    let country = present(page.country).map(CountryCode::new);
    let rule = state
        .coordinator
        .match_rule(&ChannelId::new(channel), url.as_deref(), country.as_ref())
        .await
        .map_err(api_error)?;
    Ok(Json(rule))
}

async fn start_session_handler(
    State(state): State<SharedApiState>,
    Path(channel): Path<String>,
    Json(context): Json<VisitorContext>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let req = context.into_request(channel);
    let session = state
        .coordinator
        .start_session(&req)
        .await
        .map_err(api_error)?;

    info!(
        channel = %session.channel_id,
        session = %session.id,
        destination = %session.destination,
        "Session started"
    );
    Ok((StatusCode::CREATED, Json(session)))
}

async fn reclaim_calls_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ReclaimResponse>, ApiError> {
    let reclaimed = state
        .coordinator
        .reclaim_stale_call_sessions()
        .await
        .map_err(api_error)?;
    Ok(Json(ReclaimResponse { reclaimed }))
}

async fn status_handler(State(state): State<SharedApiState>) -> Json<StatusResponse> {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds()
        .max(0) as u64;

    Json(StatusResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: uptime,
        backend: state.backend.into(),
        channels: state.channels.len(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
