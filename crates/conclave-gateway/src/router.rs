//! Axum `Router` assembly and the shared application state (spec §6).

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use conclave_agent::AgentRegistry;
use conclave_events::{MetricsCollector, SessionMetricsCollector};
use conclave_hitl::HitlService;
use conclave_orchestrator::Orchestrator;
use conclave_resilience::RateLimiter;
use conclave_session::{AgentContextService, SessionService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthConfig, JwksCache};
use crate::control;
use crate::rate_limit;
use crate::stream;

#[derive(Clone)]
pub struct GatewayState {
    pub sessions: Arc<SessionService>,
    pub contexts: Arc<AgentContextService>,
    pub hitl: Arc<HitlService>,
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<AgentRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub session_metrics: Arc<SessionMetricsCollector>,
    pub jwks: Arc<JwksCache>,
    pub auth_config: AuthConfig,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Builds the full router: `/health` is unauthenticated; everything else
/// passes through rate limiting then bearer/internal-secret auth (spec §6.5).
pub fn build_router(state: GatewayState) -> Router {
    let protected = Router::new()
        .route("/api/v1/messages/stream", post(stream::messages_stream))
        .route("/sessions", post(control::create_session).get(control::list_sessions))
        .route("/sessions/:id", get(control::get_session))
        .route("/agents", get(control::list_agents))
        .route("/agents/:session_id/current", get(control::current_agent))
        .route("/agents/:session_id/switch", post(control::switch_agent))
        .route("/events/metrics", get(control::metrics))
        .route("/events/metrics/session/:id", get(control::session_metrics))
        .route("/hitl/:call_id", get(control::hitl_decision_preview))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_auth))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit));

    Router::new()
        .route("/health", get(control::health))
        .merge(protected)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
