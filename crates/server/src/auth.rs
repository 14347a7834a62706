//! `X-API-Key` authentication middleware (§6.1).
//!
//! Tenant-facing routes only require the header to be present and
//! non-empty: the key itself *is* the tenant identity, fingerprinted once
//! by the orchestrator/session manager downstream (§4.1). Admin routes are
//! a separate, shared-secret surface: they require the key to match one of
//! `server.auth.api_keys`, compared via `agentcore_hashing::equal`.

use agentcore_config::Settings;
use agentcore_core::ErrorKind;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error_response::plain_error;

const API_KEY_HEADER: &str = "x-api-key";
const ADMIN_PATH_PREFIX: &str = "/admin";

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

/// The raw caller-supplied key, threaded from the middleware into handlers
/// via a request extension so it is parsed from the header exactly once.
#[derive(Clone)]
pub struct CallerKey(pub Vec<u8>);

enum AuthCheck {
    PublicPath,
    Tenant(Vec<u8>),
    MissingCredential,
    AdminNotConfigured,
    AdminKeyMismatch,
    AdminOk(Vec<u8>),
}

/// Extracts everything needed from `Settings` synchronously so the
/// `parking_lot::RwLockReadGuard` never crosses an await point.
fn check_auth_config(config: &Arc<RwLock<Settings>>, path: &str, raw_key: Option<&[u8]>) -> AuthCheck {
    let guard = config.read();
    let auth = &guard.server.auth;

    if auth.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return AuthCheck::PublicPath;
    }

    if !auth.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "API authentication is DISABLED; set AGENTCORE__SERVER__AUTH__ENABLED=true for production"
            );
        }
        return match raw_key {
            Some(key) if !key.is_empty() => AuthCheck::Tenant(key.to_vec()),
            // Even with auth disabled, tenant routes still need a key to
            // fingerprint into an identity — there is no anonymous tenant.
            _ => AuthCheck::Tenant(b"anonymous".to_vec()),
        };
    }

    if path.starts_with(ADMIN_PATH_PREFIX) {
        if auth.api_keys.is_empty() {
            return AuthCheck::AdminNotConfigured;
        }
        return match raw_key {
            Some(key) => {
                let presented_fp = agentcore_hashing::fingerprint(key);
                let matches = auth
                    .api_keys
                    .iter()
                    .any(|k| agentcore_hashing::equal(agentcore_hashing::fingerprint(k.as_bytes()), presented_fp));
                if matches {
                    AuthCheck::AdminOk(key.to_vec())
                } else {
                    AuthCheck::AdminKeyMismatch
                }
            }
            None => AuthCheck::AdminKeyMismatch,
        };
    }

    match raw_key {
        Some(key) if !key.is_empty() => AuthCheck::Tenant(key.to_vec()),
        _ => AuthCheck::MissingCredential,
    }
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = match request.extensions().get::<Arc<RwLock<Settings>>>() {
        Some(cfg) => cfg.clone(),
        None => {
            tracing::error!("config extension missing from request");
            return (StatusCode::INTERNAL_SERVER_ERROR, "server configuration error").into_response();
        }
    };

    let path = request.uri().path().to_string();
    let raw_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.as_bytes().to_vec());

    match check_auth_config(&config, &path, raw_key.as_deref()) {
        AuthCheck::PublicPath => next.run(request).await,
        AuthCheck::Tenant(key) | AuthCheck::AdminOk(key) => {
            request.extensions_mut().insert(CallerKey(key));
            next.run(request).await
        }
        AuthCheck::MissingCredential => {
            plain_error(ErrorKind::Unauthenticated, "missing X-API-Key header")
        }
        AuthCheck::AdminNotConfigured => {
            tracing::error!("admin endpoint reached but no server.auth.api_keys are configured");
            (StatusCode::INTERNAL_SERVER_ERROR, "admin authentication not configured").into_response()
        }
        AuthCheck::AdminKeyMismatch => {
            tracing::warn!("invalid admin API key presented");
            plain_error(ErrorKind::Unauthenticated, "invalid admin API key")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_auth(enabled: bool, api_keys: Vec<String>) -> Arc<RwLock<Settings>> {
        let mut settings = Settings::default();
        settings.server.auth.enabled = enabled;
        settings.server.auth.api_keys = api_keys;
        Arc::new(RwLock::new(settings))
    }

    #[test]
    fn public_path_bypasses_auth_even_when_enabled() {
        let config = settings_with_auth(true, vec!["admin-secret".into()]);
        assert!(matches!(
            check_auth_config(&config, "/health", None),
            AuthCheck::PublicPath
        ));
    }

    #[test]
    fn tenant_path_rejects_missing_key_when_enabled() {
        let config = settings_with_auth(true, vec!["admin-secret".into()]);
        assert!(matches!(
            check_auth_config(&config, "/api/v1/query/single", None),
            AuthCheck::MissingCredential
        ));
    }

    #[test]
    fn tenant_path_accepts_any_nonempty_key() {
        let config = settings_with_auth(true, vec!["admin-secret".into()]);
        assert!(matches!(
            check_auth_config(&config, "/api/v1/query/single", Some(b"tenant-key")),
            AuthCheck::Tenant(_)
        ));
    }

    #[test]
    fn admin_path_requires_configured_key_match() {
        let config = settings_with_auth(true, vec!["admin-secret".into()]);
        assert!(matches!(
            check_auth_config(&config, "/admin/reload-config", Some(b"wrong")),
            AuthCheck::AdminKeyMismatch
        ));
        assert!(matches!(
            check_auth_config(&config, "/admin/reload-config", Some(b"admin-secret")),
            AuthCheck::AdminOk(_)
        ));
    }

    #[test]
    fn admin_path_without_configured_keys_is_a_config_error() {
        let config = settings_with_auth(true, Vec::new());
        assert!(matches!(
            check_auth_config(&config, "/admin/reload-config", Some(b"whatever")),
            AuthCheck::AdminNotConfigured
        ));
    }

    #[test]
    fn disabled_auth_still_assigns_a_tenant_identity() {
        let config = settings_with_auth(false, Vec::new());
        assert!(matches!(
            check_auth_config(&config, "/api/v1/sessions", None),
            AuthCheck::Tenant(_)
        ));
    }
}
