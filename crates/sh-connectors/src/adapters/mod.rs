//! Concrete adapters for the four backend families, plus a mock for tests.

pub mod asm;
pub mod cti;
pub mod mock;
pub mod soar;
pub mod vi;

pub use asm::AsmAdapter;
pub use cti::CtiAdapter;
pub use mock::MockAdapter;
pub use soar::SoarAdapter;
pub use vi::ViAdapter;

use crate::types::{ConnectionConfig, Credentials};
use sh_observability::{AuditCategory, AuditEventDraft, AuditSeverity, SecurityAuditLog};
use sh_core::{ServiceError, ServiceType};
use tracing::warn;

/// Audit event type for a service-scoped occurrence, e.g. `VI_CONNECTION_ATTEMPT`.
pub(crate) fn event_type(service: ServiceType, suffix: &str) -> String {
    format!("{}_{}", service.tag().to_uppercase(), suffix)
}

/// Errors the connection flow if any required credential field is absent or
/// empty.
pub(crate) fn require_credentials(
    service: ServiceType,
    credentials: &Credentials,
    required: &[&str],
) -> Result<(), ServiceError> {
    let missing = credentials.missing(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Config { service, missing })
    }
}

/// A failed audit append must never fail the connection it describes.
pub(crate) async fn audit_or_warn(audit: &SecurityAuditLog, draft: AuditEventDraft) {
    if let Err(e) = audit.log(draft).await {
        warn!("audit append failed: {}", e);
    }
}

pub(crate) async fn audit_attempt(
    audit: &SecurityAuditLog,
    service: ServiceType,
    config: &ConnectionConfig,
) {
    audit_or_warn(
        audit,
        AuditEventDraft::new(
            event_type(service, "CONNECTION_ATTEMPT"),
            AuditSeverity::Medium,
            AuditCategory::System,
        )
        .with_context("endpoint", config.base_url.clone())
        .with_context("auth_type", config.auth_type.to_string()),
    )
    .await;
}

pub(crate) async fn audit_success(
    audit: &SecurityAuditLog,
    service: ServiceType,
    session_id: &str,
) {
    audit_or_warn(
        audit,
        AuditEventDraft::new(
            event_type(service, "CONNECTION_SUCCESS"),
            AuditSeverity::Low,
            AuditCategory::System,
        )
        .with_context("session_id", session_id.to_string()),
    )
    .await;
}
