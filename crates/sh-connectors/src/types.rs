//! Connection configuration and the normalized session shape.

use crate::secure_string::SecureString;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sh_core::{AuthType, ServiceType};
use std::collections::HashMap;
use std::fmt;

/// Named credential fields for a connection attempt.
///
/// Values are [`SecureString`]s; `Debug` prints field names only. The map is
/// deserializable from config files but never serializable, so credentials
/// cannot flow into audit context or persisted state verbatim.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials(HashMap<String, SecureString>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<SecureString>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&SecureString> {
        self.0.get(field)
    }

    /// A present-but-empty value counts as missing.
    pub fn get_non_empty(&self, field: &str) -> Option<&SecureString> {
        self.0.get(field).filter(|v| !v.is_empty())
    }

    /// Names of the required fields that are absent or empty.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|f| self.get_non_empty(f).is_none())
            .map(|f| f.to_string())
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        fields.sort_unstable();
        f.debug_struct("Credentials")
            .field("fields", &fields)
            .finish()
    }
}

/// Caller-supplied parameters for a connection attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub base_url: String,
    pub auth_type: AuthType,
    #[serde(default)]
    pub credentials: Credentials,
    /// Overrides the adapter's default handshake timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Overrides the adapter's default handshake attempt budget.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl ConnectionConfig {
    pub fn new(base_url: impl Into<String>, auth_type: AuthType) -> Self {
        Self {
            base_url: base_url.into(),
            auth_type,
            credentials: Credentials::new(),
            timeout_secs: None,
            max_retries: None,
        }
    }

    pub fn with_credential(
        mut self,
        field: impl Into<String>,
        value: impl Into<SecureString>,
    ) -> Self {
        self.credentials = self.credentials.with(field, value);
        self
    }
}

/// Normalized authenticated session produced by an adapter handshake.
///
/// Owned by the registry once returned; a reconnect produces a replacement,
/// sessions are never merged.
#[derive(Debug, Clone)]
pub struct Session {
    pub service: ServiceType,
    pub session_id: String,
    pub token: SecureString,
    pub refresh_token: Option<SecureString>,
    pub base_url: String,
    pub expires_at: DateTime<Utc>,
    /// Resolved API endpoints, keyed by capability name.
    pub endpoints: HashMap<String, String>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn endpoint(&self, name: &str) -> Option<&str> {
        self.endpoints.get(name).map(String::as_str)
    }
}

/// Joins a base URL and a path with exactly one slash between them.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_credentials_missing_fields() {
        let creds = Credentials::new()
            .with("api_key", "k-123")
            .with("username", "");
        assert_eq!(
            creds.missing(&["api_key", "username", "account_id"]),
            vec!["username".to_string(), "account_id".to_string()]
        );
    }

    #[test]
    fn test_credentials_debug_hides_values() {
        let creds = Credentials::new().with("api_key", "k-secret");
        let out = format!("{:?}", creds);
        assert!(out.contains("api_key"));
        assert!(!out.contains("k-secret"));
    }

    #[test]
    fn test_connection_config_debug_hides_values() {
        let config = ConnectionConfig::new("https://vi.example.com", AuthType::ApiKey)
            .with_credential("api_key", "k-secret");
        assert!(!format!("{:?}", config).contains("k-secret"));
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session {
            service: ServiceType::Vi,
            session_id: "s-1".into(),
            token: "tok".into(),
            refresh_token: None,
            base_url: "https://vi.example.com".into(),
            expires_at: Utc::now() + Duration::hours(1),
            endpoints: HashMap::new(),
        };
        assert!(!session.is_expired());
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://x.example.com/", "/api/v1/auth"),
            "https://x.example.com/api/v1/auth"
        );
        assert_eq!(join_url("https://x.example.com", "auth"), "https://x.example.com/auth");
    }
}
