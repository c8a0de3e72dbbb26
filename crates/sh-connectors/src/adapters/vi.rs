//! Vulnerability-intelligence adapter.
//!
//! Authenticates with `POST {base}/authenticate`, carrying the API key in the
//! `X-API-KEY` header or, for JWT-based tenants, a bearer token.

use super::{audit_attempt, audit_success, require_credentials};
use crate::adapter::ServiceAdapter;
use crate::http::{AuthHttpClient, Headers};
use crate::secure_string::SecureString;
use crate::types::{join_url, ConnectionConfig, Session};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use sh_core::{AuthType, ServiceError, ServiceType};
use sh_observability::SecurityAuditLog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Deserialize)]
struct ViAuthResponse {
    token: Option<SecureString>,
    session_id: Option<String>,
    expires_in: Option<i64>,
}

pub struct ViAdapter {
    audit: Arc<SecurityAuditLog>,
    http: AuthHttpClient,
}

impl ViAdapter {
    pub fn new(audit: Arc<SecurityAuditLog>) -> Result<Self, ServiceError> {
        Ok(Self {
            audit,
            http: AuthHttpClient::new(ServiceType::Vi)?,
        })
    }
}

#[async_trait]
impl ServiceAdapter for ViAdapter {
    fn service_type(&self) -> ServiceType {
        ServiceType::Vi
    }

    fn validate_config(&self, config: &ConnectionConfig) -> Result<(), ServiceError> {
        let required: &[&str] = match config.auth_type {
            AuthType::ApiKey => &["api_key"],
            _ => &["jwt"],
        };
        require_credentials(ServiceType::Vi, &config.credentials, required)
    }

    async fn initialize(&self, config: &ConnectionConfig) -> Result<Session, ServiceError> {
        audit_attempt(&self.audit, ServiceType::Vi, config).await;

        let mut headers: Headers = Vec::new();
        match config.auth_type {
            AuthType::ApiKey => {
                // validate_config guarantees presence
                if let Some(key) = config.credentials.get_non_empty("api_key") {
                    headers.push(("X-API-KEY", key.expose_secret().to_string()));
                }
            }
            _ => {
                if let Some(jwt) = config.credentials.get_non_empty("jwt") {
                    headers.push(("Authorization", format!("Bearer {}", jwt.expose_secret())));
                }
            }
        }

        let url = join_url(&config.base_url, "authenticate");
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let attempts = config.max_retries.unwrap_or(DEFAULT_ATTEMPTS);

        let response: ViAuthResponse = self
            .http
            .post_auth(&url, &headers, &serde_json::json!({}), timeout, attempts)
            .await?;

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Protocol {
                service: ServiceType::Vi,
                message: "authenticate response carried no token".into(),
            })?;
        let session_id = response
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let ttl = response.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        let base = config.base_url.clone();
        let endpoints = HashMap::from([
            ("vulnerabilities".to_string(), join_url(&base, "vulnerabilities")),
            ("reports".to_string(), join_url(&base, "reports")),
        ]);

        audit_success(&self.audit, ServiceType::Vi, &session_id).await;

        Ok(Session {
            service: ServiceType::Vi,
            session_id,
            token,
            refresh_token: None,
            base_url: base,
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
            endpoints,
        })
    }

    async fn terminate(&self, _session: &Session) -> Result<(), ServiceError> {
        // The VI backend has no logout endpoint; tokens simply age out.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_audit_log;

    #[tokio::test]
    async fn test_validate_requires_api_key() {
        let adapter = ViAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://vi.example.com", AuthType::ApiKey);
        let err = adapter.validate_config(&config).unwrap_err();
        assert!(matches!(err, ServiceError::Config { missing, .. } if missing == ["api_key"]));
    }

    #[tokio::test]
    async fn test_validate_requires_jwt_for_non_api_key_auth() {
        let adapter = ViAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://vi.example.com", AuthType::Basic);
        let err = adapter.validate_config(&config).unwrap_err();
        assert!(matches!(err, ServiceError::Config { missing, .. } if missing == ["jwt"]));
    }

    #[tokio::test]
    async fn test_validate_accepts_complete_config() {
        let adapter = ViAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://vi.example.com", AuthType::ApiKey)
            .with_credential("api_key", "k-123");
        assert!(adapter.validate_config(&config).is_ok());
    }
}
