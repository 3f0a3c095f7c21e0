//! # latitude-server
//!
//! HTTP API server for the Latitude confidence engine. Exposes:
//!
//! - signal ingestion for action-executors (at-least-once tolerant)
//! - read-only record, event, matrix, and burn queries for dashboards
//! - ceiling/override/never-promote management for org administrators
//! - the destructive nudge pull for notification surfaces

pub mod metrics;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use latitude_config::ServerConfig;
use latitude_core::{
    Ceiling, EventType, LatitudeError, Nudge, OverridePolicy, Subject, TierEvent,
};
use latitude_engine::{ConfidenceEngine, IncomingSignal, IngestOutcome, SubjectView};
use latitude_store::BurnSummary;
use metrics::{EngineTotals, Metrics};

/// Shared server state.
pub struct AppState {
    pub config: ServerConfig,
    pub engine: ConfidenceEngine,
    pub metrics: Metrics,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

#[derive(Deserialize)]
struct CeilingRequest {
    max_ceiling: Ceiling,
    auto_promotion_eligible: bool,
}

#[derive(Deserialize)]
struct OverrideRequest {
    policy: OverridePolicy,
}

#[derive(Serialize)]
struct CeilingEntry {
    action_type: String,
    #[serde(flatten)]
    policy: latitude_core::CeilingPolicy,
}

#[derive(Deserialize)]
struct NeverPromoteRequest {
    never_promote: bool,
}

#[derive(Deserialize)]
struct BurnParams {
    #[serde(default = "default_burn_days")]
    days: i64,
}

fn default_burn_days() -> i64 {
    30
}

#[derive(Deserialize)]
struct EventsParams {
    #[serde(default = "default_events_limit")]
    limit: usize,
}

fn default_events_limit() -> usize {
    50
}

/// Build the Axum router.
pub fn build_router(config: ServerConfig, engine: ConfidenceEngine) -> Router {
    let state = Arc::new(AppState {
        config: config.clone(),
        engine,
        metrics: Metrics::new(),
    });

    let api_routes = Router::new()
        .route("/api/v1/signals", post(ingest_handler))
        .route(
            "/api/v1/orgs/{org}/users/{user}/actions/{action}/record",
            get(record_handler),
        )
        .route(
            "/api/v1/orgs/{org}/users/{user}/actions/{action}/events",
            get(events_handler),
        )
        .route(
            "/api/v1/orgs/{org}/users/{user}/actions/{action}/demote",
            post(demote_handler),
        )
        .route(
            "/api/v1/orgs/{org}/users/{user}/actions/{action}/override",
            put(override_handler),
        )
        .route(
            "/api/v1/orgs/{org}/users/{user}/actions/{action}/never-promote",
            put(never_promote_handler),
        )
        .route(
            "/api/v1/orgs/{org}/actions/{action}/ceiling",
            put(ceiling_handler),
        )
        .route("/api/v1/orgs/{org}/ceilings", get(ceilings_handler))
        .route("/api/v1/orgs/{org}/matrix", get(matrix_handler))
        .route("/api/v1/orgs/{org}/burn", get(burn_handler))
        .route("/api/v1/users/{user}/nudge", post(nudge_handler));

    // Apply API key auth if configured
    let api_routes = if config.api_key.is_some() {
        api_routes.layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
    } else {
        api_routes
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api_routes)
        .with_state(state);

    if config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Bind and serve until the process exits.
pub async fn serve(config: ServerConfig, engine: ConfidenceEngine) -> latitude_core::Result<()> {
    let listen = config.listen.clone();
    let router = build_router(config, engine);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!(%listen, "latitude API listening");
    axum::serve(listener, router).await?;
    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────

/// Maps the engine's error taxonomy onto HTTP statuses.
pub struct ApiError(LatitudeError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LatitudeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LatitudeError::PolicyViolation(_) | LatitudeError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            LatitudeError::NotFound(_) => StatusCode::NOT_FOUND,
            LatitudeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LatitudeError> for ApiError {
    fn from(error: LatitudeError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn api_error(state: &AppState, error: LatitudeError) -> ApiError {
    state.metrics.inc_http_errors();
    ApiError(error)
}

// ── Middleware ─────────────────────────────────────────────────

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected_key) = state.config.api_key {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(key) if key == expected_key => {}
            _ => {
                warn!("unauthorized API request, invalid or missing API key");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    }
    Ok(next.run(request).await)
}

// ── Handlers ───────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (
    StatusCode,
    [(axum::http::header::HeaderName, &'static str); 1],
    String,
) {
    let store = state.engine.store();
    let mut totals = EngineTotals {
        signals_stored: store.count_signals().unwrap_or(0),
        nudges_pending: store.count_pending_nudges().unwrap_or(0),
        ..Default::default()
    };
    for (event_type, count) in store.event_counts().unwrap_or_default() {
        match event_type {
            EventType::PromotionAccepted => totals.promotions_total = count,
            EventType::Demotion => totals.demotions_total = count,
            _ => {}
        }
    }

    let body = state.metrics.render_prometheus(&totals);
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(incoming): Json<IncomingSignal>,
) -> Result<Json<IngestOutcome>, ApiError> {
    state.metrics.inc_http_requests();
    let outcome = state
        .engine
        .record_signal(incoming)
        .await
        .map_err(|e| api_error(&state, e))?;
    if outcome.duplicate {
        state.metrics.inc_signals_duplicate();
    } else {
        state.metrics.inc_signals_ingested();
    }
    Ok(Json(outcome))
}

async fn record_handler(
    State(state): State<Arc<AppState>>,
    Path((org, user, action)): Path<(String, String, String)>,
) -> Result<Json<SubjectView>, ApiError> {
    state.metrics.inc_http_requests();
    let subject = Subject::new(org, user, action);
    let view = state
        .engine
        .subject_view(&subject)
        .map_err(|e| api_error(&state, e))?
        .ok_or_else(|| api_error(&state, LatitudeError::NotFound(format!("no record for {subject}"))))?;
    Ok(Json(view))
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
    Path((org, user, action)): Path<(String, String, String)>,
    Query(params): Query<EventsParams>,
) -> Result<Json<Vec<TierEvent>>, ApiError> {
    state.metrics.inc_http_requests();
    let subject = Subject::new(org, user, action);
    let limit = params.limit.min(500);
    let events = state
        .engine
        .events(&subject, limit)
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(events))
}

async fn matrix_handler(
    State(state): State<Arc<AppState>>,
    Path(org): Path<String>,
) -> Result<Json<Vec<SubjectView>>, ApiError> {
    state.metrics.inc_http_requests();
    let views = state
        .engine
        .org_matrix(&org)
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(views))
}

async fn burn_handler(
    State(state): State<Arc<AppState>>,
    Path(org): Path<String>,
    Query(params): Query<BurnParams>,
) -> Result<Json<BurnSummary>, ApiError> {
    state.metrics.inc_http_requests();
    if !(1..=365).contains(&params.days) {
        return Err(api_error(
            &state,
            LatitudeError::Validation(format!("days must be in 1..=365, got {}", params.days)),
        ));
    }
    let burn = state
        .engine
        .burn(&org, params.days)
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(burn))
}

async fn ceiling_handler(
    State(state): State<Arc<AppState>>,
    Path((org, action)): Path<(String, String)>,
    Json(req): Json<CeilingRequest>,
) -> Result<Json<latitude_core::CeilingPolicy>, ApiError> {
    state.metrics.inc_http_requests();
    let policy = state
        .engine
        .set_ceiling(&org, &action, req.max_ceiling, req.auto_promotion_eligible)
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(policy))
}

async fn ceilings_handler(
    State(state): State<Arc<AppState>>,
    Path(org): Path<String>,
) -> Result<Json<Vec<CeilingEntry>>, ApiError> {
    state.metrics.inc_http_requests();
    let ceilings = state
        .engine
        .list_ceilings(&org)
        .map_err(|e| api_error(&state, e))?
        .into_iter()
        .map(|(action_type, policy)| CeilingEntry {
            action_type,
            policy,
        })
        .collect();
    Ok(Json(ceilings))
}

async fn override_handler(
    State(state): State<Arc<AppState>>,
    Path((org, user, action)): Path<(String, String, String)>,
    Json(req): Json<OverrideRequest>,
) -> Result<StatusCode, ApiError> {
    state.metrics.inc_http_requests();
    let subject = Subject::new(org, user, action);
    state
        .engine
        .set_override(&subject, req.policy)
        .map_err(|e| api_error(&state, e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn never_promote_handler(
    State(state): State<Arc<AppState>>,
    Path((org, user, action)): Path<(String, String, String)>,
    Json(req): Json<NeverPromoteRequest>,
) -> Result<Json<latitude_core::ConfidenceRecord>, ApiError> {
    state.metrics.inc_http_requests();
    let subject = Subject::new(org, user, action);
    let record = state
        .engine
        .set_never_promote(&subject, req.never_promote)
        .await
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(record))
}

async fn demote_handler(
    State(state): State<Arc<AppState>>,
    Path((org, user, action)): Path<(String, String, String)>,
) -> Result<Json<latitude_core::ConfidenceRecord>, ApiError> {
    state.metrics.inc_http_requests();
    let subject = Subject::new(org, user, action);
    let record = state
        .engine
        .demote(&subject)
        .await
        .map_err(|e| api_error(&state, e))?;
    Ok(Json(record))
}

/// Destructive pull: the first fetch clears the milestone, so delivery is
/// at most once even under retried client polling.
async fn nudge_handler(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<Option<Nudge>>, ApiError> {
    state.metrics.inc_http_requests();
    let nudge = state
        .engine
        .pull_nudge(&user)
        .map_err(|e| api_error(&state, e))?;
    if nudge.is_some() {
        state.metrics.inc_nudges_delivered();
    }
    Ok(Json(nudge))
}
