//! Orchestration-platform adapter.
//!
//! Authenticates via `POST {base}/api/v1/auth` with a username/API-key pair
//! and logs out through the auth resource on terminate.

use super::{audit_attempt, audit_success, require_credentials};
use crate::adapter::ServiceAdapter;
use crate::http::{AuthHttpClient, Headers};
use crate::secure_string::SecureString;
use crate::types::{join_url, ConnectionConfig, Session};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use sh_core::{ServiceError, ServiceType};
use sh_observability::SecurityAuditLog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_ATTEMPTS: u32 = 4;
const AUTH_SCOPE: &str = "incidents:read workflows:execute";
const INTEGRATION_HEADER: &str = "SecureHunter v3.0";

#[derive(Deserialize)]
struct SoarAuthResponse {
    token: Option<SecureString>,
    session_id: Option<String>,
    expires_in: Option<i64>,
}

pub struct SoarAdapter {
    audit: Arc<SecurityAuditLog>,
    http: AuthHttpClient,
}

impl SoarAdapter {
    pub fn new(audit: Arc<SecurityAuditLog>) -> Result<Self, ServiceError> {
        Ok(Self {
            audit,
            http: AuthHttpClient::new(ServiceType::Soar)?,
        })
    }
}

#[async_trait]
impl ServiceAdapter for SoarAdapter {
    fn service_type(&self) -> ServiceType {
        ServiceType::Soar
    }

    fn validate_config(&self, config: &ConnectionConfig) -> Result<(), ServiceError> {
        require_credentials(
            ServiceType::Soar,
            &config.credentials,
            &["username", "api_key"],
        )
    }

    async fn initialize(&self, config: &ConnectionConfig) -> Result<Session, ServiceError> {
        audit_attempt(&self.audit, ServiceType::Soar, config).await;

        let username = config
            .credentials
            .get_non_empty("username")
            .ok_or_else(|| ServiceError::Config {
                service: ServiceType::Soar,
                missing: vec!["username".into()],
            })?;
        let api_key = config
            .credentials
            .get_non_empty("api_key")
            .ok_or_else(|| ServiceError::Config {
                service: ServiceType::Soar,
                missing: vec!["api_key".into()],
            })?;

        let url = join_url(&config.base_url, "api/v1/auth");
        let headers: Headers = vec![("X-SOAR-Integration", INTEGRATION_HEADER.to_string())];
        let body = serde_json::json!({
            "username": username.expose_secret(),
            "api_key": api_key.expose_secret(),
            "scope": AUTH_SCOPE,
        });
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let attempts = config.max_retries.unwrap_or(DEFAULT_ATTEMPTS);

        let response: SoarAuthResponse = self
            .http
            .post_auth(&url, &headers, &body, timeout, attempts)
            .await?;

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Protocol {
                service: ServiceType::Soar,
                message: "auth response carried no token".into(),
            })?;
        let session_id = response
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let ttl = response.expires_in.unwrap_or(3600);

        let endpoints = HashMap::from([
            ("incidents".to_string(), join_url(&config.base_url, "incidents")),
            ("workflows".to_string(), join_url(&config.base_url, "workflows")),
        ]);

        audit_success(&self.audit, ServiceType::Soar, &session_id).await;

        Ok(Session {
            service: ServiceType::Soar,
            session_id,
            token,
            refresh_token: None,
            base_url: config.base_url.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
            endpoints,
        })
    }

    async fn terminate(&self, session: &Session) -> Result<(), ServiceError> {
        let url = join_url(&session.base_url, "api/v1/auth/logout");
        let request = self
            .http
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", session.token.expose_secret()),
            )
            .header("X-Session-ID", session.session_id.clone());
        self.http
            .execute_once(request)
            .await
            .map_err(|e| ServiceError::Termination {
                service: ServiceType::Soar,
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_audit_log;
    use sh_core::AuthType;

    #[tokio::test]
    async fn test_validate_rejects_empty_api_key() {
        let adapter = SoarAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://soar.example.com", AuthType::Basic)
            .with_credential("username", "analyst")
            .with_credential("api_key", "");
        let err = adapter.validate_config(&config).unwrap_err();
        assert!(matches!(err, ServiceError::Config { missing, .. } if missing == ["api_key"]));
    }

    #[tokio::test]
    async fn test_validate_accepts_complete_config() {
        let adapter = SoarAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://soar.example.com", AuthType::Basic)
            .with_credential("username", "analyst")
            .with_credential("api_key", "k-9");
        assert!(adapter.validate_config(&config).is_ok());
    }
}
