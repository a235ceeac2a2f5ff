//! HTTP/SSE boundary (spec §6): the wire-protocol stream, control endpoints,
//! bearer-JWT auth, per-IP rate limiting, and the background cleanup sweep.

pub mod auth;
pub mod cleanup;
pub mod control;
pub mod error;
pub mod rate_limit;
pub mod router;
pub mod stream;

pub use auth::{AuthConfig, JwksCache};
pub use cleanup::{spawn_cleanup_task, CleanupConfig};
pub use router::{build_router, GatewayState};

use conclave_events::{Event, EventBus, EventPayload};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Binds `addr`, serves `router` until a shutdown signal arrives, and
/// publishes the startup/shutdown events symmetrically (spec §5, §9).
pub async fn serve(addr: SocketAddr, router: axum::Router, events: Arc<EventBus>) -> std::io::Result<()> {
    events.publish(Event::new(EventPayload::SystemStartup, None));
    info!(%addr, "conclave gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(events.clone()))
    .await?;

    Ok(())
}

async fn shutdown_signal(events: Arc<EventBus>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining in-flight streams");
    events.publish(Event::new(EventPayload::SystemShutdown, None));
    // Give the event bus a moment to dispatch before the process exits.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
