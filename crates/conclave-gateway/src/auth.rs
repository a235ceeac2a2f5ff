//! Bearer-JWT authentication at the boundary (spec §6.5): signatures are
//! validated against a JWKS document cached for an hour, with a manual
//! force-refresh when a signature fails to verify (handles key rotation
//! without waiting out the cache, per SPEC_FULL §C).

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::router::GatewayState;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed bearer token: {0}")]
    Malformed(String),
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    #[error("jwks fetch failed: {0}")]
    JwksUnavailable(String),
    #[error("token verification failed: {0}")]
    Invalid(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        warn!(error = %self, "rejected request at the auth boundary");
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Claims this boundary cares about; unrecognised fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
}

/// The authenticated caller, injected as a request extension once a token
/// verifies, so handlers scope queries by `user_id` without re-parsing it.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwks_url: String,
    pub refresh_interval: Duration,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Shared secret for internal cross-service calls (spec §6.5), carried
    /// in `X-Internal-Secret` alongside `X-Internal-User` to identify the
    /// caller without a JWT. `None` disables the bypass entirely.
    pub internal_shared_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: String::new(),
            refresh_interval: Duration::from_secs(3600),
            issuer: None,
            audience: None,
            internal_shared_secret: None,
        }
    }
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    #[allow(dead_code)]
    kty: String,
    n: String,
    e: String,
}

/// Caches JWKS-derived decoding keys by `kid`. Background refresh is hourly;
/// `key_for` also force-refreshes once when the `kid` isn't cached, so a
/// rotated key is picked up immediately rather than on the next tick.
pub struct JwksCache {
    http: reqwest::Client,
    config: AuthConfig,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
}

impl JwksCache {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
        }
    }

    pub fn is_stale(&self) -> bool {
        match *self.last_refresh.read().expect("jwks lock poisoned") {
            None => true,
            Some(at) => at.elapsed() >= self.config.refresh_interval,
        }
    }

    /// Re-fetch the JWKS document and replace the cached key set.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let body: JwkSet = self
            .http
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::JwksUnavailable(e.to_string()))?;

        let mut keys = HashMap::with_capacity(body.keys.len());
        for jwk in body.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, error = %e, "skipping malformed jwk"),
            }
        }

        *self.keys.write().expect("jwks lock poisoned") = keys;
        *self.last_refresh.write().expect("jwks lock poisoned") = Some(Instant::now());
        Ok(())
    }

    async fn ensure_fresh(&self) {
        if self.is_stale() && self.refresh().await.is_err() {
            // Stale cache beats no cache — keep serving the old keys and
            // let the caller's verify attempt fail naturally if they've rotated.
        }
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        self.ensure_fresh().await;
        if let Some(key) = self.keys.read().expect("jwks lock poisoned").get(kid).cloned() {
            return Ok(key);
        }
        self.refresh().await?;
        self.keys
            .read()
            .expect("jwks lock poisoned")
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    /// Verify `token`, force-refreshing the cache once on a signature
    /// failure before giving up (key rotation, spec SPEC_FULL §C).
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let kid = header.kid.ok_or_else(|| AuthError::Malformed("token carries no kid".to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        if let Some(iss) = &self.config.issuer {
            validation.set_issuer(&[iss]);
        }
        if let Some(aud) = &self.config.audience {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }

        let key = self.key_for(&kid).await?;
        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::InvalidSignature) => {
                self.refresh().await?;
                let key = self.key_for(&kid).await?;
                decode::<Claims>(token, &key, &validation)
                    .map(|d| d.claims)
                    .map_err(|e| AuthError::Invalid(e.to_string()))
            }
            Err(e) => Err(AuthError::Invalid(e.to_string())),
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Malformed("authorization header is not a bearer token".to_string()))
}

/// Internal service-to-service calls may bypass JWT verification with a
/// shared secret plus an explicit `X-Internal-User` header (spec §6.5).
fn internal_bypass(headers: &HeaderMap, config: &AuthConfig) -> Option<AuthenticatedUser> {
    let secret = config.internal_shared_secret.as_deref()?;
    let provided = headers.get("x-internal-secret")?.to_str().ok()?;
    if provided != secret {
        return None;
    }
    let user_id = headers.get("x-internal-user")?.to_str().ok()?;
    Some(AuthenticatedUser { user_id: user_id.to_string() })
}

/// Axum middleware: verifies the bearer JWT (or internal shared secret),
/// and injects [`AuthenticatedUser`] as a request extension.
pub async fn require_auth(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(user) = internal_bypass(&headers, &state.auth_config) {
        req.extensions_mut().insert(user);
        return next.run(req).await;
    }

    let token = match extract_bearer(&headers) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    match state.jwks.verify(token).await {
        Ok(claims) => {
            req.extensions_mut().insert(AuthenticatedUser { user_id: claims.sub });
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn extract_bearer_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert!(matches!(extract_bearer(&headers), Err(AuthError::MissingToken)));
    }

    #[test]
    fn extract_bearer_rejects_non_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(matches!(extract_bearer(&headers), Err(AuthError::Malformed(_))));
    }

    #[test]
    fn internal_bypass_requires_matching_secret_and_user_header() {
        let config = AuthConfig {
            internal_shared_secret: Some("s3cret".to_string()),
            ..AuthConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-secret", "s3cret".parse().unwrap());
        headers.insert("x-internal-user", "svc-billing".parse().unwrap());
        let user = internal_bypass(&headers, &config).unwrap();
        assert_eq!(user.user_id, "svc-billing");
    }

    #[test]
    fn internal_bypass_rejects_wrong_secret() {
        let config = AuthConfig {
            internal_shared_secret: Some("s3cret".to_string()),
            ..AuthConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-secret", "wrong".parse().unwrap());
        headers.insert("x-internal-user", "svc-billing".parse().unwrap());
        assert!(internal_bypass(&headers, &config).is_none());
    }

    #[test]
    fn internal_bypass_disabled_without_configured_secret() {
        let config = AuthConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-internal-secret", "anything".parse().unwrap());
        headers.insert("x-internal-user", "svc-billing".parse().unwrap());
        assert!(internal_bypass(&headers, &config).is_none());
    }
}
