//! HTTP API gateway for Switchboard.
//!
//! Exposes the routing engine to chat widgets and embed scripts: where a
//! visitor's chat would go, which rule governs the widget on a page, and
//! session start. Also runs the periodic stale-call reclaim.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::{
    Router,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use switchboard_config::AppConfig;
use switchboard_core::{DomainEvent, EventBus, Result};
use switchboard_routing::{Collaborators, RoutingCoordinator, RoutingSettings};
use switchboard_store::Backends;

/// Build the coordinator and the store adapters behind it.
pub async fn build_coordinator(config: &AppConfig) -> Result<(RoutingCoordinator, Backends)> {
    let backends = switchboard_store::build_from_config(config).await?;
    let collaborators = Collaborators {
        catalog: backends.catalog.clone(),
        presence: backends.presence.clone(),
        conversations: backends.conversations.clone(),
        calls: backends.calls.clone(),
        scripts: backends.catalog.clone(),
    };
    let settings = RoutingSettings::from_config(&config.routing)?;
    Ok((RoutingCoordinator::new(collaborators, settings), backends))
}

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - In-memory rate limiting per client (`0` disables)
/// - Permissive CORS for GET/POST, widgets are embedded on customer sites
/// - HTTP trace logging
pub fn build_router(api_state: api_v1::SharedApiState, rate_limit_per_minute: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let rate_limiter = Arc::new(RateLimiter::new(
        rate_limit_per_minute,
        Duration::from_secs(60),
    ));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Reclaim stale call sessions every `every`. A zero interval spawns nothing.
pub fn spawn_reclaim_task(
    coordinator: Arc<RoutingCoordinator>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = coordinator.reclaim_stale_call_sessions().await {
                warn!(error = %e, "Periodic call reclaim failed");
            }
        }
    }))
}

/// Log every domain event until the bus is dropped.
///
/// A slow logger skips the events it fell behind on and keeps going.
/// The handle yields how many events were logged.
pub fn spawn_event_logger(mut events: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(event = ?event, "Routing event");
                    logged += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        logged
    })
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let events = Arc::new(EventBus::default());
    spawn_event_logger(events.subscribe());

    let (coordinator, backends) = build_coordinator(&config).await?;
    let coordinator = Arc::new(coordinator.with_events(events));

    spawn_reclaim_task(
        coordinator.clone(),
        Duration::from_secs(config.routing.reclaim_interval_secs),
    );

    let api_state = Arc::new(api_v1::ApiV1State {
        coordinator,
        channels: backends.catalog.channel_ids(),
        backend: backends.kind,
        start_time: chrono::Utc::now(),
    });

    let app = build_router(api_state, config.gateway.rate_limit_per_minute);

    info!(addr = %addr, backend = backends.kind, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key.
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        if self.max_requests == 0 {
            return true;
        }

        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Periodic cleanup: if map grows too large, evict stale entries
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Client key: first `X-Forwarded-For` hop, then the peer address, else "anonymous".
fn client_key(req: &axum::extract::Request) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Returns 429 Too Many Requests when a client exceeds its budget.
/// `/health` is exempt so monitoring can poll it freely.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> std::result::Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client = client_key(&req);
    if !limiter.check(&client) {
        warn!(client = %client, "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use switchboard_config::SAMPLE_TOML;
    use tower::ServiceExt;

    async fn test_router(rate_limit: usize) -> Router {
        let config = AppConfig::from_toml_str(SAMPLE_TOML).unwrap();
        let (coordinator, backends) = build_coordinator(&config).await.unwrap();
        let state = Arc::new(api_v1::ApiV1State {
            coordinator: Arc::new(coordinator),
            channels: backends.catalog.channel_ids(),
            backend: backends.kind,
            start_time: chrono::Utc::now(),
        });
        build_router(state, rate_limit)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = test_router(60).await;
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn v1_is_nested() {
        let app = test_router(60).await;
        let response = app
            .oneshot(get("/v1/channels/website/destination?lang=en_US"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rate_limit_rejects_excess() {
        let app = test_router(2).await;
        for _ in 0..2 {
            let response = app.clone().oneshot(get("/v1/channels")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(get("/v1/channels")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Another client still has budget
        let req = Request::builder()
            .uri("/v1/channels")
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_exempt_from_rate_limit() {
        let app = test_router(1).await;
        for _ in 0..5 {
            let response = app.clone().oneshot(get("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn zero_disables_rate_limit() {
        let app = test_router(0).await;
        for _ in 0..5 {
            let response = app.clone().oneshot(get("/v1/status")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let req = Request::builder()
            .header("X-Forwarded-For", " 198.51.100.4 ,10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "198.51.100.4");

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&req), "anonymous");
    }

    #[tokio::test]
    async fn zero_interval_spawns_no_reclaim_task() {
        let config = AppConfig::from_toml_str(SAMPLE_TOML).unwrap();
        let (coordinator, _) = build_coordinator(&config).await.unwrap();
        assert!(spawn_reclaim_task(Arc::new(coordinator), Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn event_logger_survives_lag() {
        let bus = EventBus::default();
        let logger = spawn_event_logger(bus.subscribe());
        for count in 0..300 {
            bus.publish(DomainEvent::CallSessionsReclaimed {
                count,
                timestamp: chrono::Utc::now(),
            });
        }
        drop(bus);

        let logged = tokio::time::timeout(Duration::from_secs(5), logger)
            .await
            .unwrap()
            .unwrap();
        assert!(logged >= 256, "logged {logged}");
        assert!(logged <= 300);
    }
}
