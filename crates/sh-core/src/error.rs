//! Error taxonomy and the central error handler.
//!
//! Every failure in the connection layer is normalized into a [`ServiceError`]
//! carrying a machine-readable code and an HTTP-equivalent status, so the
//! registry and adapters report failures with a uniform identity.

use crate::service::ServiceType;
use crate::session::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, warn};

/// Result alias used throughout the connection layer.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Normalized failure for the connection/session layer.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// Missing or invalid credentials/endpoint for a connection attempt.
    #[error("invalid {} configuration, missing: {}", .service, .missing.join(", "))]
    Config {
        service: ServiceType,
        missing: Vec<String>,
    },

    /// The backend returned a response the adapter could not interpret.
    #[error("malformed {service} response: {message}")]
    Protocol {
        service: ServiceType,
        message: String,
    },

    /// Handshake failure or lookup of a session that does not exist.
    #[error("{service} connection error: {message}")]
    Connection {
        service: ServiceType,
        message: String,
    },

    /// No adapter registered (or initialized) for the requested service.
    #[error("no adapter available for {service}: {message}")]
    Adapter {
        service: ServiceType,
        message: String,
    },

    /// Remote logout failed. Non-fatal: local teardown always completes.
    #[error("{service} termination failed: {message}")]
    Termination {
        service: ServiceType,
        message: String,
    },

    /// Scheduled token refresh failed; the stale token is left in place and
    /// a later 401 from the backend is authoritative.
    #[error("{service} token refresh failed: {message}")]
    TokenRefresh {
        service: ServiceType,
        message: String,
    },

    /// Aggregate of per-service termination failures during a full disconnect.
    #[error("{failures} connection(s) failed to terminate cleanly")]
    Disconnect { failures: usize },

    /// Encryption or decryption of persisted audit data failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Local persistence of audit data failed.
    #[error("audit storage failure: {0}")]
    Storage(String),

    /// Audit flush exhausted its retry budget.
    #[error("audit flush failed after {attempts} attempt(s)")]
    FlushFailed { attempts: u32 },

    /// Anything that does not fit the categories above.
    #[error("{0}")]
    General(String),
}

impl ServiceError {
    /// Machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Config { .. } => "CONFIG_ERROR",
            ServiceError::Protocol { .. } => "PROTOCOL_ERROR",
            ServiceError::Connection { .. } => "CONNECTION_ERROR",
            ServiceError::Adapter { .. } => "NO_ADAPTER",
            ServiceError::Termination { .. } => "TERMINATION_ERROR",
            ServiceError::TokenRefresh { .. } => "TOKEN_REFRESH_ERROR",
            ServiceError::Disconnect { .. } => "DISCONNECT_WARNINGS",
            ServiceError::Crypto(_) => "CRYPTO_ERROR",
            ServiceError::Storage(_) => "STORAGE_ERROR",
            ServiceError::FlushFailed { .. } => "FLUSH_FAILED",
            ServiceError::General(_) => "GENERAL_ERROR",
        }
    }

    /// HTTP-equivalent status carried for uniform error identity.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Config { .. } => 400,
            ServiceError::Protocol { .. } => 502,
            ServiceError::Connection { .. } => 503,
            ServiceError::Adapter { .. } => 501,
            ServiceError::Termination { .. } => 502,
            ServiceError::TokenRefresh { .. } => 401,
            ServiceError::Disconnect { .. } => 207,
            ServiceError::Crypto(_) | ServiceError::Storage(_) => 500,
            ServiceError::FlushFailed { .. } => 500,
            ServiceError::General(_) => 500,
        }
    }

    /// Originating service, or "global" for cross-cutting failures.
    pub fn service(&self) -> &'static str {
        match self {
            ServiceError::Config { service, .. }
            | ServiceError::Protocol { service, .. }
            | ServiceError::Connection { service, .. }
            | ServiceError::Adapter { service, .. }
            | ServiceError::Termination { service, .. }
            | ServiceError::TokenRefresh { service, .. } => service.tag(),
            _ => "global",
        }
    }

    /// Whether this failure must escalate to critical handling.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::TokenRefresh { .. } | ServiceError::FlushFailed { .. }
        )
    }
}

/// Structured report handed to the [`ErrorHandler`].
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error: ServiceError,
    /// Diagnostic detail (already sanitized by the caller).
    pub detail: Option<String>,
}

impl From<ServiceError> for ErrorReport {
    fn from(error: ServiceError) -> Self {
        Self {
            error,
            detail: None,
        }
    }
}

impl ErrorReport {
    pub fn new(error: ServiceError) -> Self {
        error.into()
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Recovery signal broadcast to guards and UI consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    None,
    /// Forced navigation to the fatal-error surface; local session wiped.
    FatalRedirect,
}

/// Single normalization point for all error reporting.
///
/// `handle_error` only logs; it never fails. `handle_critical_error` is the
/// one path allowed to wipe client-held session state.
pub struct ErrorHandler {
    session_store: Arc<dyn SessionStore>,
    recovery_tx: watch::Sender<RecoveryAction>,
    recovery_rx: watch::Receiver<RecoveryAction>,
}

/// Maximum detail length emitted to the log; anything longer is truncated.
const MAX_DETAIL_LEN: usize = 512;

impl ErrorHandler {
    pub fn new(session_store: Arc<dyn SessionStore>) -> Self {
        let (recovery_tx, recovery_rx) = watch::channel(RecoveryAction::None);
        Self {
            session_store,
            recovery_tx,
            recovery_rx,
        }
    }

    /// Logs a structured diagnostic for the failure. Never panics or errors.
    pub fn handle_error(&self, report: impl Into<ErrorReport>) {
        let report = report.into();
        let detail = report
            .detail
            .as_deref()
            .map(truncate_detail)
            .unwrap_or_default();
        warn!(
            service = report.error.service(),
            code = report.error.code(),
            status = report.error.status(),
            detail = %detail,
            "{}",
            report.error
        );
    }

    /// Logs, wipes local session state, and broadcasts a fatal redirect.
    ///
    /// Reserved for non-recoverable trust failures (refresh failure,
    /// corrupted session).
    pub async fn handle_critical_error(&self, err: &ServiceError) {
        error!(
            service = err.service(),
            code = err.code(),
            status = err.status(),
            "critical: {}",
            err
        );
        self.session_store.clear().await;
        // Receiver side is held by guards/UI; a lagging receiver only sees
        // the latest action, which is what we want here.
        let _ = self.recovery_tx.send(RecoveryAction::FatalRedirect);
    }

    /// Channel consumers watch for forced-recovery signals.
    pub fn subscribe(&self) -> watch::Receiver<RecoveryAction> {
        self.recovery_rx.clone()
    }
}

fn truncate_detail(s: &str) -> String {
    if s.len() <= MAX_DETAIL_LEN {
        s.to_string()
    } else {
        let mut end = MAX_DETAIL_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::session::UserSession;

    #[test]
    fn test_error_codes_and_status() {
        let err = ServiceError::Config {
            service: ServiceType::Asm,
            missing: vec!["api_key".into()],
        };
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert_eq!(err.status(), 400);
        assert_eq!(err.service(), "asm");
        assert!(!err.is_fatal());

        let err = ServiceError::Adapter {
            service: ServiceType::Vi,
            message: "not registered".into(),
        };
        assert_eq!(err.code(), "NO_ADAPTER");
        assert_eq!(err.status(), 501);
    }

    #[test]
    fn test_config_error_lists_missing_fields() {
        let err = ServiceError::Config {
            service: ServiceType::Soar,
            missing: vec!["username".into(), "api_key".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("username"));
        assert!(msg.contains("api_key"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ServiceError::TokenRefresh {
            service: ServiceType::Cti,
            message: "expired".into()
        }
        .is_fatal());
        assert!(ServiceError::FlushFailed { attempts: 3 }.is_fatal());
        assert!(!ServiceError::Disconnect { failures: 2 }.is_fatal());
    }

    #[test]
    fn test_truncate_detail() {
        let long = "x".repeat(2000);
        let out = truncate_detail(&long);
        assert!(out.len() < 600);
        assert!(out.ends_with('…'));
        assert_eq!(truncate_detail("short"), "short");
    }

    #[tokio::test]
    async fn test_critical_error_clears_session_and_signals() {
        let store = Arc::new(MemorySessionStore::default());
        store
            .put(UserSession {
                user_id: "u1".into(),
                roles: vec!["ANALYST".into()],
                is_valid: true,
            })
            .await;
        let handler = ErrorHandler::new(store.clone());
        let rx = handler.subscribe();
        assert_eq!(*rx.borrow(), RecoveryAction::None);

        let err = ServiceError::TokenRefresh {
            service: ServiceType::Cti,
            message: "refresh rejected".into(),
        };
        handler.handle_critical_error(&err).await;

        assert!(store.get().await.is_none());
        assert_eq!(*rx.borrow(), RecoveryAction::FatalRedirect);
    }

    #[test]
    fn test_handle_error_never_panics() {
        let handler = ErrorHandler::new(Arc::new(MemorySessionStore::default()));
        handler.handle_error(ServiceError::General("boom".into()));
        handler.handle_error(
            ErrorReport::new(ServiceError::Disconnect { failures: 1 })
                .with_detail("x".repeat(4096)),
        );
    }
}
