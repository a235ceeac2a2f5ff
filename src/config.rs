//! Runtime configuration, loaded from TOML with env-var overrides.
//!
//! All tunable parameters in one place. Loaded at startup, falls back to
//! defaults if no config file exists (spec §5, §6.5, §9 DESIGN NOTES).

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConclaveConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub resilience: ResilienceConfig,
    pub auth: AuthSettings,
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host. `0.0.0.0` for LAN-reachable, `127.0.0.1` to stay local.
    pub host: String,
    pub port: u16,
    /// Multi-agent (Orchestrator routes to specialists) vs. single-agent
    /// (Orchestrator routes straight to Universal) deployment (spec §4.9).
    pub single_agent_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Messages sent to the LLM per turn are capped at this many, most
    /// recent first (spec §4.5 history bound).
    pub history_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwks_url: String,
    pub jwks_refresh_interval_secs: u64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Shared secret for internal cross-service calls (spec §6.5). Unset
    /// disables the bypass.
    pub internal_shared_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub interval_secs: u64,
    pub session_idle_hours: i64,
    pub session_purge_days: i64,
    pub lock_idle_hours: u64,
    pub approval_stale_hours: u64,
}

impl Default for ConclaveConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            resilience: ResilienceConfig::default(),
            auth: AuthSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8089,
            single_agent_mode: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://conclave.db".to_string(),
            max_connections: 20,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            history_limit: 50,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_failure_threshold: 5,
            circuit_recovery_timeout_secs: 60,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 2_000,
            retry_max_delay_ms: 10_000,
            rate_limit_max_requests: 60,
            rate_limit_window_secs: 60,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwks_url: String::new(),
            jwks_refresh_interval_secs: 3600,
            issuer: None,
            audience: None,
            internal_shared_secret: None,
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            session_idle_hours: 24,
            session_purge_days: 30,
            lock_idle_hours: 24,
            approval_stale_hours: 24,
        }
    }
}

impl ConclaveConfig {
    /// Load config from a TOML file, falling back to defaults; then apply
    /// `CONCLAVE_*` env overrides for the handful of secrets/paths that
    /// don't belong in a checked-in file (spec §9 "config from file + env").
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CONCLAVE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(key) = std::env::var("CONCLAVE_LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Ok(url) = std::env::var("CONCLAVE_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(url) = std::env::var("CONCLAVE_JWKS_URL") {
            self.auth.jwks_url = url;
        }
        if let Ok(secret) = std::env::var("CONCLAVE_INTERNAL_SHARED_SECRET") {
            self.auth.internal_shared_secret = Some(secret);
        }
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
