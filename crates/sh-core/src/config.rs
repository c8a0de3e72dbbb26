//! Configuration loading for the SecureHunter connection layer.
//!
//! Configuration is read from a YAML file with environment-variable
//! overrides for the audit encryption key, so secrets stay out of checked-in
//! config files.

use crate::service::ServiceType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable carrying the base64 audit encryption key.
pub const AUDIT_KEY_ENV: &str = "SH_AUDIT_ENCRYPTION_KEY";

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Environment name reported in audit metadata.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Audit pipeline tuning.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Endpoint override map; takes precedence over caller-supplied base URLs.
    #[serde(default)]
    pub endpoints: HashMap<ServiceType, String>,

    /// Per-service enablement.
    #[serde(default)]
    pub toggles: FeatureToggles,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            audit: AuditConfig::default(),
            endpoints: HashMap::new(),
            toggles: FeatureToggles::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a YAML file, then applies env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let mut config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        if let Ok(key) = std::env::var(AUDIT_KEY_ENV) {
            config.audit.encryption_key = Some(key);
        }

        Ok(config)
    }

    /// Copy with secrets blanked for display or debug dumps.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();
        if config.audit.encryption_key.is_some() {
            config.audit.encryption_key = Some("[REDACTED]".to_string());
        }
        config
    }
}

/// Audit buffer and flush tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Buffer capacity that triggers a synchronous flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Base delay between flush retries; attempt N waits N times this.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Flush retry budget before the buffer is persisted locally.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether failed/offline flushes persist the buffer locally.
    #[serde(default = "default_persist_events")]
    pub persist_events: bool,

    /// Base64-encoded 32-byte AES key for audit data at rest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
}

fn default_buffer_size() -> usize {
    20
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_max_retries() -> u32 {
    3
}

fn default_persist_events() -> bool {
    true
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_max_retries(),
            persist_events: default_persist_events(),
            encryption_key: None,
        }
    }
}

/// Boolean-per-service enablement consulted at adapter registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureToggles {
    #[serde(default = "enabled")]
    pub vi: bool,
    #[serde(default = "enabled")]
    pub cti: bool,
    #[serde(default)]
    pub asm: bool,
    #[serde(default = "enabled")]
    pub soar: bool,
}

fn enabled() -> bool {
    true
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            vi: true,
            cti: true,
            asm: false,
            soar: true,
        }
    }
}

impl FeatureToggles {
    pub fn is_enabled(&self, service: ServiceType) -> bool {
        match service {
            ServiceType::Vi => self.vi,
            ServiceType::Cti => self.cti,
            ServiceType::Asm => self.asm,
            ServiceType::Soar => self.soar,
        }
    }

    /// Toggle map with every service enabled, for tests and dev setups.
    pub fn all_enabled() -> Self {
        Self {
            vi: true,
            cti: true,
            asm: true,
            soar: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.audit.buffer_size, 20);
        assert_eq!(config.audit.retry_delay_ms, 3000);
        assert!(config.audit.persist_events);
        assert!(config.toggles.is_enabled(ServiceType::Vi));
        assert!(!config.toggles.is_enabled(ServiceType::Asm));
    }

    #[test]
    fn test_load_yaml() {
        let yaml = r#"
environment: production
audit:
  buffer_size: 50
  encryption_key: a2V5LWZvci10ZXN0aW5nLW9ubHktMzItYnl0ZXMhIQ==
endpoints:
  cti: https://cti.internal.example.com
toggles:
  asm: true
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.environment, "production");
        assert_eq!(config.audit.buffer_size, 50);
        assert_eq!(config.audit.max_retries, 3);
        assert!(config.toggles.is_enabled(ServiceType::Asm));
        assert_eq!(
            config.endpoints.get(&ServiceType::Cti).unwrap(),
            "https://cti.internal.example.com"
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_redact_secrets() {
        let mut config = AppConfig::default();
        config.audit.encryption_key = Some("c2VjcmV0".to_string());
        let redacted = config.redact_secrets();
        assert_eq!(redacted.audit.encryption_key.as_deref(), Some("[REDACTED]"));
        // Original untouched
        assert_eq!(config.audit.encryption_key.as_deref(), Some("c2VjcmV0"));
    }
}
