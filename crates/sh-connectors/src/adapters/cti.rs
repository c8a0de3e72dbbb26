//! Cyber-threat-intelligence adapter.
//!
//! OAuth client-credentials handshake against `POST {base}/v3/auth/token`,
//! yielding an access/refresh token pair. A background task refreshes the
//! pair one minute before expiry and keeps going until the session is
//! terminated; a failed refresh is escalated as critical and the stale token
//! is left in place (the backend's eventual 401 is authoritative).

use super::{audit_attempt, audit_or_warn, audit_success, event_type, require_credentials};
use crate::adapter::ServiceAdapter;
use crate::http::{AuthHttpClient, Headers};
use crate::secure_string::SecureString;
use crate::types::{join_url, ConnectionConfig, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use sh_core::{ErrorHandler, ServiceError, ServiceType};
use sh_observability::{AuditCategory, AuditEventDraft, AuditSeverity, SecurityAuditLog};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_ATTEMPTS: u32 = 5;
const OAUTH_SCOPE: &str = "indicators:read threats:feed";
const INTEGRATION_NAME: &str = "SecureHunter";
const INTEGRATION_VERSION: &str = "2.4.0";
/// Refresh fires this many seconds before the access token expires.
const REFRESH_LEAD_SECS: i64 = 60;

#[derive(Deserialize)]
struct CtiTokenResponse {
    access_token: Option<SecureString>,
    refresh_token: Option<SecureString>,
    expires_in: Option<i64>,
}

/// Live token pair shared between the session's consumers and the refresh
/// task.
pub struct TokenState {
    pub access: SecureString,
    pub refresh: Option<SecureString>,
    pub expires_at: DateTime<Utc>,
}

struct Refresher {
    task: JoinHandle<()>,
    tokens: Arc<RwLock<TokenState>>,
}

pub struct CtiAdapter {
    audit: Arc<SecurityAuditLog>,
    errors: Arc<ErrorHandler>,
    http: AuthHttpClient,
    refreshers: Mutex<HashMap<String, Refresher>>,
}

impl CtiAdapter {
    pub fn new(
        audit: Arc<SecurityAuditLog>,
        errors: Arc<ErrorHandler>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            audit,
            errors,
            http: AuthHttpClient::new(ServiceType::Cti)?,
            refreshers: Mutex::new(HashMap::new()),
        })
    }

    /// The current access token for an active session, tracking refreshes.
    pub async fn current_token(&self, session_id: &str) -> Option<SecureString> {
        let tokens = {
            let refreshers = self.refreshers.lock().await;
            refreshers.get(session_id)?.tokens.clone()
        };
        let state = tokens.read().await;
        Some(state.access.clone())
    }

    fn integration_headers() -> Headers {
        vec![
            ("X-Integration-Name", INTEGRATION_NAME.to_string()),
            ("X-Integration-Version", INTEGRATION_VERSION.to_string()),
        ]
    }

    async fn spawn_refresher(
        &self,
        session_id: String,
        base_url: String,
        tokens: Arc<RwLock<TokenState>>,
    ) {
        let http = self.http.clone();
        let audit = self.audit.clone();
        let errors = self.errors.clone();
        let loop_tokens = tokens.clone();
        let loop_session = session_id.clone();

        let task = tokio::spawn(async move {
            loop {
                let expires_at = loop_tokens.read().await.expires_at;
                let Some(delay) = refresh_delay(expires_at, Utc::now()) else {
                    // Token lives less than the refresh lead; refreshing now
                    // would loop hot, so leave it to expire naturally.
                    debug!(session = %loop_session, "token too short-lived to refresh");
                    return;
                };
                tokio::time::sleep(delay).await;

                match refresh_once(&http, &base_url, &loop_tokens).await {
                    Ok(()) => {
                        info!(session = %loop_session, "cti token refreshed");
                        audit_or_warn(
                            &audit,
                            AuditEventDraft::new(
                                event_type(ServiceType::Cti, "TOKEN_REFRESHED"),
                                AuditSeverity::Low,
                                AuditCategory::System,
                            )
                            .with_context("session_id", loop_session.clone()),
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(session = %loop_session, "cti token refresh failed: {}", e);
                        errors.handle_critical_error(&e).await;
                        return;
                    }
                }
            }
        });

        self.refreshers
            .lock()
            .await
            .insert(session_id, Refresher { task, tokens });
    }
}

/// How long to wait before refreshing a token that expires at `expires_at`,
/// or `None` when the token expires within the refresh lead.
fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (expires_at - ChronoDuration::seconds(REFRESH_LEAD_SECS) - now)
        .to_std()
        .ok()
}

async fn refresh_once(
    http: &AuthHttpClient,
    base_url: &str,
    tokens: &Arc<RwLock<TokenState>>,
) -> Result<(), ServiceError> {
    let refresh = {
        let state = tokens.read().await;
        state
            .refresh
            .clone()
            .ok_or_else(|| ServiceError::TokenRefresh {
                service: ServiceType::Cti,
                message: "no refresh token issued".into(),
            })?
    };

    let url = join_url(base_url, "v3/auth/refresh");
    let body = serde_json::json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh.expose_secret(),
    });
    let response: CtiTokenResponse = http
        .post_auth(
            &url,
            &CtiAdapter::integration_headers(),
            &body,
            DEFAULT_TIMEOUT,
            1,
        )
        .await
        .map_err(|e| ServiceError::TokenRefresh {
            service: ServiceType::Cti,
            message: e.to_string(),
        })?;

    let access = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::TokenRefresh {
            service: ServiceType::Cti,
            message: "refresh response carried no access token".into(),
        })?;

    let mut state = tokens.write().await;
    state.access = access;
    if let Some(refresh) = response.refresh_token {
        state.refresh = Some(refresh);
    }
    state.expires_at = Utc::now() + ChronoDuration::seconds(response.expires_in.unwrap_or(3600));
    Ok(())
}

#[async_trait]
impl ServiceAdapter for CtiAdapter {
    fn service_type(&self) -> ServiceType {
        ServiceType::Cti
    }

    fn validate_config(&self, config: &ConnectionConfig) -> Result<(), ServiceError> {
        require_credentials(
            ServiceType::Cti,
            &config.credentials,
            &["client_id", "client_secret"],
        )
    }

    async fn initialize(&self, config: &ConnectionConfig) -> Result<Session, ServiceError> {
        audit_attempt(&self.audit, ServiceType::Cti, config).await;

        let client_id = config
            .credentials
            .get_non_empty("client_id")
            .ok_or_else(|| ServiceError::Config {
                service: ServiceType::Cti,
                missing: vec!["client_id".into()],
            })?;
        let client_secret = config
            .credentials
            .get_non_empty("client_secret")
            .ok_or_else(|| ServiceError::Config {
                service: ServiceType::Cti,
                missing: vec!["client_secret".into()],
            })?;

        let url = join_url(&config.base_url, "v3/auth/token");
        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "client_id": client_id.expose_secret(),
            "client_secret": client_secret.expose_secret(),
            "scope": OAUTH_SCOPE,
        });
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let attempts = config.max_retries.unwrap_or(DEFAULT_ATTEMPTS);

        let response: CtiTokenResponse = self
            .http
            .post_auth(&url, &Self::integration_headers(), &body, timeout, attempts)
            .await?;

        let access = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Protocol {
                service: ServiceType::Cti,
                message: "token response carried no access token".into(),
            })?;
        let expires_in = response.expires_in.unwrap_or(3600);
        let expires_at = Utc::now() + ChronoDuration::seconds(expires_in);
        let session_id = Uuid::new_v4().to_string();

        let tokens = Arc::new(RwLock::new(TokenState {
            access: access.clone(),
            refresh: response.refresh_token.clone(),
            expires_at,
        }));
        self.spawn_refresher(session_id.clone(), config.base_url.clone(), tokens)
            .await;

        let endpoints = HashMap::from([
            ("indicators".to_string(), join_url(&config.base_url, "indicators")),
            ("threats".to_string(), join_url(&config.base_url, "threats")),
        ]);

        audit_success(&self.audit, ServiceType::Cti, &session_id).await;

        Ok(Session {
            service: ServiceType::Cti,
            session_id,
            token: access,
            refresh_token: response.refresh_token,
            base_url: config.base_url.clone(),
            expires_at,
            endpoints,
        })
    }

    async fn terminate(&self, session: &Session) -> Result<(), ServiceError> {
        // No remote revocation endpoint; stopping the refresh loop is the
        // whole teardown.
        if let Some(refresher) = self.refreshers.lock().await.remove(&session.session_id) {
            refresher.task.abort();
            debug!(session = %session.session_id, "cti refresh task cancelled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_audit_log, test_error_handler};

    async fn adapter() -> CtiAdapter {
        CtiAdapter::new(test_audit_log().await, test_error_handler()).unwrap()
    }

    #[test]
    fn test_refresh_fires_one_minute_before_expiry() {
        let now = Utc::now();
        let delay = refresh_delay(now + ChronoDuration::seconds(3600), now).unwrap();
        assert_eq!(delay, Duration::from_secs(3540));
    }

    #[test]
    fn test_short_lived_token_is_not_refreshed() {
        let now = Utc::now();
        assert!(refresh_delay(now + ChronoDuration::seconds(59), now).is_none());
        assert!(refresh_delay(now - ChronoDuration::seconds(1), now).is_none());
    }

    #[tokio::test]
    async fn test_validate_requires_client_pair() {
        let adapter = adapter().await;
        let config = ConnectionConfig::new("https://cti.example.com", sh_core::AuthType::OAuth)
            .with_credential("client_id", "cid");
        let err = adapter.validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ServiceError::Config { missing, .. } if missing == ["client_secret"])
        );
    }

    #[tokio::test]
    async fn test_terminate_unknown_session_is_ok() {
        let adapter = adapter().await;
        let session = Session {
            service: ServiceType::Cti,
            session_id: "never-connected".into(),
            token: "t".into(),
            refresh_token: None,
            base_url: "https://cti.example.com".into(),
            expires_at: Utc::now(),
            endpoints: HashMap::new(),
        };
        assert!(adapter.terminate(&session).await.is_ok());
    }

    #[tokio::test]
    async fn test_current_token_for_unknown_session_is_none() {
        let adapter = adapter().await;
        assert!(adapter.current_token("nope").await.is_none());
    }
}
