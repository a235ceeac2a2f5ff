//! Per-client-IP rate limiting (spec §5: default 60 req/min).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use conclave_core::Error;

use crate::router::GatewayState;

pub async fn rate_limit(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();
    if !state.rate_limiter.check(&key) {
        return crate::error::ApiError(Error::RateLimited).into_response();
    }
    next.run(req).await
}
