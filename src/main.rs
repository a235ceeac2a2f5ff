//! Composition root: wires every service by hand (no global singletons,
//! spec §9 DESIGN NOTES anti-pattern list) and hands off to the gateway.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use conclave_agent::{AgentRegistry, RegistryMode};
use conclave_events::{AuditLogger, EventBus, MetricsCollector, SessionMetricsCollector};
use conclave_gateway::auth::AuthConfig as GatewayAuthConfig;
use conclave_gateway::{build_router, spawn_cleanup_task, CleanupConfig, GatewayState, JwksCache};
use conclave_hitl::HitlService;
use conclave_llm::{LlmClient, OpenAiCompatibleClient, ResilientLlmClient};
use conclave_orchestrator::Orchestrator;
use conclave_resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig, RetryConfig};
use conclave_session::{AgentContextService, SessionLockManager, SessionService};
use conclave_storage::{connect, migrate, AgentContextRepository, ApprovalRepository, MessageRepository, PoolConfig, SessionRepository};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "conclave", version, about = "Session and multi-agent orchestration core")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "conclave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database migrations and start the gateway.
    Serve,
    /// Run pending database migrations only, then exit.
    Migrate,
    /// Print the default configuration as TOML and exit.
    DumpConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conclave=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Command::DumpConfig) {
        println!("{}", config::ConclaveConfig::default().to_toml());
        return Ok(());
    }

    let cfg = config::ConclaveConfig::load(&cli.config);

    let pool = connect(&PoolConfig {
        database_url: cfg.database.url.clone(),
        max_connections: cfg.database.max_connections,
        ..PoolConfig::default()
    })
    .await?;
    migrate(&pool).await?;

    if matches!(cli.command, Command::Migrate) {
        tracing::info!("migrations applied, exiting");
        return Ok(());
    }

    let events = Arc::new(EventBus::new(1024));
    events.subscribe(None, Arc::new(AuditLogger), 0).await;
    let metrics = Arc::new(MetricsCollector::new());
    events.subscribe(None, metrics.clone(), 10).await;
    let session_metrics = Arc::new(SessionMetricsCollector::new());
    events.subscribe(None, session_metrics.clone(), 10).await;

    let sessions = Arc::new(SessionService::new(
        SessionRepository::new(pool.clone()),
        MessageRepository::new(pool.clone()),
        events.clone(),
    ));
    let contexts = Arc::new(AgentContextService::new(
        AgentContextRepository::new(pool.clone()),
        events.clone(),
    ));
    let hitl = Arc::new(HitlService::new(ApprovalRepository::new(pool.clone()), events.clone()));
    let locks = Arc::new(SessionLockManager::new());

    let registry_mode = if cfg.server.single_agent_mode {
        RegistryMode::SingleAgent
    } else {
        RegistryMode::MultiAgent
    };
    let registry = Arc::new(AgentRegistry::new(registry_mode));

    let raw_llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::new(
        cfg.llm.base_url.clone(),
        cfg.llm.api_key.clone(),
    ));
    let breaker = CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: cfg.resilience.circuit_failure_threshold,
        recovery_timeout: std::time::Duration::from_secs(cfg.resilience.circuit_recovery_timeout_secs),
    });
    let retry = RetryConfig {
        max_attempts: cfg.resilience.retry_max_attempts,
        initial_delay: std::time::Duration::from_millis(cfg.resilience.retry_initial_delay_ms),
        max_delay: std::time::Duration::from_millis(cfg.resilience.retry_max_delay_ms),
        ..RetryConfig::default()
    };
    let llm: Arc<dyn LlmClient> = Arc::new(ResilientLlmClient::new(raw_llm, breaker, retry));

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        contexts.clone(),
        hitl.clone(),
        locks.clone(),
        registry.clone(),
        llm,
        events.clone(),
        cfg.llm.model.clone(),
        cfg.llm.history_limit,
    ));

    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
        max_requests: cfg.resilience.rate_limit_max_requests,
        window: std::time::Duration::from_secs(cfg.resilience.rate_limit_window_secs),
    }));

    let auth_config = GatewayAuthConfig {
        jwks_url: cfg.auth.jwks_url.clone(),
        refresh_interval: std::time::Duration::from_secs(cfg.auth.jwks_refresh_interval_secs),
        issuer: cfg.auth.issuer.clone(),
        audience: cfg.auth.audience.clone(),
        internal_shared_secret: cfg.auth.internal_shared_secret.clone(),
    };
    let jwks = Arc::new(JwksCache::new(auth_config.clone()));

    let state = GatewayState {
        sessions,
        contexts,
        hitl: hitl.clone(),
        orchestrator,
        registry,
        metrics,
        session_metrics,
        jwks,
        auth_config,
        rate_limiter,
    };

    let _cleanup = spawn_cleanup_task(
        SessionRepository::new(pool.clone()),
        locks,
        hitl,
        CleanupConfig {
            interval: std::time::Duration::from_secs(cfg.cleanup.interval_secs),
            session_idle_after: chrono::Duration::hours(cfg.cleanup.session_idle_hours),
            session_purge_after: chrono::Duration::days(cfg.cleanup.session_purge_days),
            lock_idle_after: std::time::Duration::from_secs(cfg.cleanup.lock_idle_hours * 3600),
            approval_stale_after: std::time::Duration::from_secs(cfg.cleanup.approval_stale_hours * 3600),
        },
    );

    let router = build_router(state);
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    conclave_gateway::serve(addr, router, events).await?;

    Ok(())
}
