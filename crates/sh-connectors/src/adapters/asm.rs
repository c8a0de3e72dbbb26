//! Attack-surface-management adapter.
//!
//! Creates a scoped session via `POST {base}/api/v2/sessions` and tears it
//! down with a DELETE on the session resource.

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

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);
const DEFAULT_ATTEMPTS: u32 = 3;
const SESSION_SCOPE: &str = "assets:read scan:execute";
const CLIENT_HEADER: &str = "SecureHunter/2.0";

#[derive(Deserialize)]
struct AsmSessionResponse {
    token: Option<SecureString>,
    session_id: Option<String>,
    expires_in: Option<i64>,
}

pub struct AsmAdapter {
    audit: Arc<SecurityAuditLog>,
    http: AuthHttpClient,
}

impl AsmAdapter {
    pub fn new(audit: Arc<SecurityAuditLog>) -> Result<Self, ServiceError> {
        Ok(Self {
            audit,
            http: AuthHttpClient::new(ServiceType::Asm)?,
        })
    }
}

#[async_trait]
impl ServiceAdapter for AsmAdapter {
    fn service_type(&self) -> ServiceType {
        ServiceType::Asm
    }

    fn validate_config(&self, config: &ConnectionConfig) -> Result<(), ServiceError> {
        require_credentials(
            ServiceType::Asm,
            &config.credentials,
            &["account_id", "api_key"],
        )
    }

    async fn initialize(&self, config: &ConnectionConfig) -> Result<Session, ServiceError> {
        audit_attempt(&self.audit, ServiceType::Asm, config).await;

        let account_id = config
            .credentials
            .get_non_empty("account_id")
            .ok_or_else(|| ServiceError::Config {
                service: ServiceType::Asm,
                missing: vec!["account_id".into()],
            })?;
        let api_key = config
            .credentials
            .get_non_empty("api_key")
            .ok_or_else(|| ServiceError::Config {
                service: ServiceType::Asm,
                missing: vec!["api_key".into()],
            })?;

        let url = join_url(&config.base_url, "api/v2/sessions");
        let headers: Headers = vec![("X-ASM-Client", CLIENT_HEADER.to_string())];
        let body = serde_json::json!({
            "account_id": account_id.expose_secret(),
            "api_key": api_key.expose_secret(),
            "scope": SESSION_SCOPE,
        });
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let attempts = config.max_retries.unwrap_or(DEFAULT_ATTEMPTS);

        let response: AsmSessionResponse = self
            .http
            .post_auth(&url, &headers, &body, timeout, attempts)
            .await?;

        let token = response
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Protocol {
                service: ServiceType::Asm,
                message: "session response carried no token".into(),
            })?;
        let session_id = response
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let ttl = response.expires_in.unwrap_or(3600);

        let endpoints = HashMap::from([
            ("assets".to_string(), join_url(&config.base_url, "assets")),
            ("scans".to_string(), join_url(&config.base_url, "scans")),
        ]);

        audit_success(&self.audit, ServiceType::Asm, &session_id).await;

        Ok(Session {
            service: ServiceType::Asm,
            session_id,
            token,
            refresh_token: None,
            base_url: config.base_url.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
            endpoints,
        })
    }

    async fn terminate(&self, session: &Session) -> Result<(), ServiceError> {
        let url = join_url(
            &session.base_url,
            &format!("api/v2/sessions/{}", session.session_id),
        );
        let request = self.http.delete(&url).header(
            "Authorization",
            format!("ASM {}", session.token.expose_secret()),
        );
        self.http
            .execute_once(request)
            .await
            .map_err(|e| ServiceError::Termination {
                service: ServiceType::Asm,
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
    async fn test_validate_lists_all_missing_fields() {
        let adapter = AsmAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://asm.example.com", AuthType::ApiKey);
        let err = adapter.validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ServiceError::Config { missing, .. } if missing == ["account_id", "api_key"])
        );
    }

    #[tokio::test]
    async fn test_validate_treats_empty_value_as_missing() {
        let adapter = AsmAdapter::new(test_audit_log().await).unwrap();
        let config = ConnectionConfig::new("https://asm.example.com", AuthType::ApiKey)
            .with_credential("account_id", "acct-1")
            .with_credential("api_key", "");
        let err = adapter.validate_config(&config).unwrap_err();
        assert!(matches!(err, ServiceError::Config { missing, .. } if missing == ["api_key"]));
    }
}
