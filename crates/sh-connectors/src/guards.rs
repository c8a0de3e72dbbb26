//! Route guards gating dashboard surfaces on session validity and role.

use crate::registry::ConnectorRegistry;
use chrono::Utc;
use sh_core::{ServiceType, SessionStore};
use sh_observability::{AuditCategory, AuditEventDraft, AuditSeverity, SecurityAuditLog};
use std::sync::Arc;
use tracing::warn;

/// What the router should do with the navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectLogin,
    RedirectAccessDenied { context: String },
}

/// Blocks navigation to a service surface unless the user session is valid
/// and an unexpired connection to that service exists.
pub struct SessionGuard {
    registry: Arc<ConnectorRegistry>,
    audit: Arc<SecurityAuditLog>,
    session_store: Arc<dyn SessionStore>,
}

impl SessionGuard {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        audit: Arc<SecurityAuditLog>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            registry,
            audit,
            session_store,
        }
    }

    pub async fn can_activate(&self, service: ServiceType) -> GuardDecision {
        let user_valid = self
            .session_store
            .get()
            .await
            .map(|s| s.is_valid)
            .unwrap_or(false);
        let connection_live = match self.registry.get_service_connection(service).await {
            Ok(session) => session.expires_at > Utc::now(),
            Err(_) => false,
        };

        if user_valid && connection_live {
            return GuardDecision::Allow;
        }

        self.audit_or_warn(
            AuditEventDraft::new(
                "SESSION_TIMEOUT",
                AuditSeverity::Medium,
                AuditCategory::Security,
            )
            .with_context("service", service.tag())
            .with_context("user_session_valid", user_valid)
            .with_context("service_connection_live", connection_live),
        )
        .await;
        // A stale session must not survive a rejected navigation
        self.session_store.clear().await;
        GuardDecision::RedirectLogin
    }

    async fn audit_or_warn(&self, draft: AuditEventDraft) {
        if let Err(e) = self.audit.log(draft).await {
            warn!("audit append failed: {}", e);
        }
    }
}

/// Blocks navigation unless the user session carries the required role.
pub struct RoleGuard {
    audit: Arc<SecurityAuditLog>,
    session_store: Arc<dyn SessionStore>,
}

impl RoleGuard {
    pub fn new(audit: Arc<SecurityAuditLog>, session_store: Arc<dyn SessionStore>) -> Self {
        Self {
            audit,
            session_store,
        }
    }

    pub async fn can_activate(&self, required_role: &str) -> GuardDecision {
        let Some(user) = self.session_store.get().await.filter(|u| u.is_valid) else {
            return GuardDecision::RedirectLogin;
        };

        if user.has_role(required_role) {
            return GuardDecision::Allow;
        }

        if let Err(e) = self
            .audit
            .log(
                AuditEventDraft::new(
                    "ACCESS_DENIED",
                    AuditSeverity::High,
                    AuditCategory::Security,
                )
                .with_context("required_role", required_role.to_string())
                .with_context("user_id", user.user_id.clone()),
            )
            .await
        {
            warn!("audit append failed: {}", e);
        }

        GuardDecision::RedirectAccessDenied {
            context: format!("missing required role: {}", required_role),
        }
    }
}
