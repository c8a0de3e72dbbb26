//! Single entry point for establishing and owning service connections.
//!
//! The registry holds at most one active session per service type. Connects
//! are serialized per type so concurrent callers share one handshake, and a
//! full disconnect races cleanly against in-flight connects: a handshake that
//! completes after `disconnect_all` began is terminated immediately instead
//! of resurrecting the session.

use crate::adapter::ServiceAdapter;
use crate::types::{ConnectionConfig, Session};
use sh_core::{ErrorHandler, ErrorReport, FeatureToggles, ServiceError, ServiceType};
use sh_observability::metrics::{
    record_connection_attempt, record_connection_failure, record_connection_success,
};
use sh_observability::{AuditCategory, AuditEventDraft, AuditSeverity, SecurityAuditLog};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Outcome of a full disconnect. Termination failures are warnings, not
/// errors: local teardown always completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectSummary {
    pub attempted: usize,
    pub failures: usize,
}

impl DisconnectSummary {
    pub fn clean(&self) -> bool {
        self.failures == 0
    }

    /// The aggregate warning value, when any termination failed.
    pub fn warning(&self) -> Option<ServiceError> {
        (self.failures > 0).then_some(ServiceError::Disconnect {
            failures: self.failures,
        })
    }
}

struct ConnectState {
    lock: Mutex<()>,
    generation: AtomicU64,
}

pub struct ConnectorRegistry {
    adapters: RwLock<HashMap<ServiceType, Arc<dyn ServiceAdapter>>>,
    active: Mutex<HashMap<ServiceType, Arc<Session>>>,
    connect_states: HashMap<ServiceType, ConnectState>,
    disconnect_epoch: AtomicU64,
    toggles: FeatureToggles,
    endpoint_overrides: HashMap<ServiceType, String>,
    audit: Arc<SecurityAuditLog>,
    errors: Arc<ErrorHandler>,
}

impl ConnectorRegistry {
    pub fn new(
        toggles: FeatureToggles,
        endpoint_overrides: HashMap<ServiceType, String>,
        audit: Arc<SecurityAuditLog>,
        errors: Arc<ErrorHandler>,
    ) -> Self {
        let connect_states = ServiceType::ALL
            .into_iter()
            .map(|service| {
                (
                    service,
                    ConnectState {
                        lock: Mutex::new(()),
                        generation: AtomicU64::new(0),
                    },
                )
            })
            .collect();
        Self {
            adapters: RwLock::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            connect_states,
            disconnect_epoch: AtomicU64::new(0),
            toggles,
            endpoint_overrides,
            audit,
            errors,
        }
    }

    /// Registers (or replaces) the adapter for its service type. A disabled
    /// feature toggle makes this a recorded no-op.
    pub async fn register_adapter(&self, adapter: Arc<dyn ServiceAdapter>) {
        let service = adapter.service_type();
        if !self.toggles.is_enabled(service) {
            info!(service = service.tag(), "adapter registration skipped, feature disabled");
            self.audit_event(
                "ADAPTER_DISABLED",
                AuditSeverity::Low,
                AuditCategory::System,
                service,
            )
            .await;
            return;
        }
        self.adapters.write().await.insert(service, adapter);
        self.audit_event(
            "ADAPTER_REGISTERED",
            AuditSeverity::Low,
            AuditCategory::System,
            service,
        )
        .await;
    }

    /// Establishes a session for `service`, replacing any cached one.
    ///
    /// Serialized per service type: a caller that was waiting behind another
    /// connect for the same type receives that connect's session instead of
    /// performing a second handshake.
    pub async fn connect(
        &self,
        service: ServiceType,
        config: &ConnectionConfig,
    ) -> Result<Arc<Session>, ServiceError> {
        record_connection_attempt(service.tag());

        let adapter = self.adapters.read().await.get(&service).cloned();
        let Some(adapter) = adapter else {
            let err = ServiceError::Adapter {
                service,
                message: "no adapter registered".into(),
            };
            self.record_failure(service, &err, None).await;
            return Err(err);
        };

        let mut effective = config.clone();
        if let Some(override_url) = self.endpoint_overrides.get(&service) {
            effective.base_url = override_url.clone();
        }
        if !effective.base_url.starts_with("http") {
            let err = ServiceError::Config {
                service,
                missing: vec!["base_url".into()],
            };
            self.record_config_failure(service, &err).await;
            return Err(err);
        }

        if let Err(err) = adapter.validate_config(&effective) {
            self.record_config_failure(service, &err).await;
            return Err(err);
        }

        let state = match self.connect_states.get(&service) {
            Some(state) => state,
            None => {
                // connect_states covers ServiceType::ALL
                let err = ServiceError::General(format!("no connect state for {}", service));
                self.record_failure(service, &err, None).await;
                return Err(err);
            }
        };

        let generation_before = state.generation.load(Ordering::Acquire);
        let _connect_guard = state.lock.lock().await;

        // Another connect for this type completed while we queued; share
        // its session rather than dialing again.
        if state.generation.load(Ordering::Acquire) != generation_before {
            if let Some(existing) = self.active.lock().await.get(&service) {
                debug!(service = service.tag(), "joining in-flight connect result");
                return Ok(existing.clone());
            }
        }

        let epoch_before = self.disconnect_epoch.load(Ordering::Acquire);
        match adapter.initialize(&effective).await {
            Ok(session) => {
                let session = Arc::new(session);

                // Epoch re-check and insert share one lock acquisition:
                // disconnect_all bumps the epoch before snapshotting under
                // this same lock, so a racing disconnect either aborts this
                // connect here or finds the session in its snapshot.
                let displaced = {
                    let mut active = self.active.lock().await;
                    if self.disconnect_epoch.load(Ordering::Acquire) != epoch_before {
                        drop(active);
                        // A full disconnect began mid-handshake; the fresh
                        // session must not outlive it.
                        if let Err(e) = adapter.terminate(&session).await {
                            self.errors.handle_error(ErrorReport::new(e));
                        }
                        let err = ServiceError::Connection {
                            service,
                            message: "connection aborted by disconnect".into(),
                        };
                        self.record_failure(service, &err, None).await;
                        return Err(err);
                    }
                    active.insert(service, session.clone())
                };
                state.generation.fetch_add(1, Ordering::AcqRel);

                // A superseded session must not keep remote state or a
                // refresh timer alive.
                if let Some(old) = displaced {
                    if let Err(e) = adapter.terminate(&old).await {
                        self.errors.handle_error(ErrorReport::new(e));
                    }
                }
                record_connection_success(service.tag());
                self.audit_or_warn(
                    AuditEventDraft::new(
                        "CONNECTION_SUCCESS",
                        AuditSeverity::Low,
                        AuditCategory::System,
                    )
                    .with_context("service", service.tag())
                    .with_context("session_id", session.session_id.clone()),
                )
                .await;
                info!(service = service.tag(), session = %session.session_id, "connected");
                Ok(session)
            }
            Err(err) => {
                self.record_failure(service, &err, Some(&effective.base_url))
                    .await;
                Err(err)
            }
        }
    }

    /// The cached session for `service`. Pure lookup; never dials.
    pub async fn get_service_connection(
        &self,
        service: ServiceType,
    ) -> Result<Arc<Session>, ServiceError> {
        self.active
            .lock()
            .await
            .get(&service)
            .cloned()
            .ok_or_else(|| ServiceError::Connection {
                service,
                message: "no active session".into(),
            })
    }

    /// Terminates every active session concurrently and clears the cache.
    ///
    /// All terminations are attempted regardless of individual failures;
    /// failures are reported and counted in the returned summary.
    pub async fn disconnect_all(&self) -> DisconnectSummary {
        self.disconnect_epoch.fetch_add(1, Ordering::AcqRel);

        let snapshot: Vec<(ServiceType, Arc<Session>)> = {
            let active = self.active.lock().await;
            active.iter().map(|(s, sess)| (*s, sess.clone())).collect()
        };
        let attempted = snapshot.len();
        let adapters = self.adapters.read().await.clone();

        let terminations = snapshot.into_iter().map(|(service, session)| {
            let adapter = adapters.get(&service).cloned();
            async move {
                match adapter {
                    Some(adapter) => adapter
                        .terminate(&session)
                        .await
                        .map_err(|e| (service, e)),
                    None => Ok(()),
                }
            }
        });
        let results = futures::future::join_all(terminations).await;

        // Local teardown is unconditional
        self.active.lock().await.clear();

        let mut failures = 0;
        for result in results {
            if let Err((service, err)) = result {
                failures += 1;
                warn!(service = service.tag(), "termination failed: {}", err);
                self.errors.handle_error(ErrorReport::new(err));
            }
        }

        if failures > 0 {
            self.audit_or_warn(
                AuditEventDraft::new(
                    "DISCONNECT_WARNINGS",
                    AuditSeverity::Medium,
                    AuditCategory::System,
                )
                .with_context("failures", failures as u64),
            )
            .await;
            self.errors
                .handle_error(ErrorReport::new(ServiceError::Disconnect { failures }));
        }

        DisconnectSummary {
            attempted,
            failures,
        }
    }

    /// Number of currently active sessions.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    async fn record_config_failure(&self, service: ServiceType, err: &ServiceError) {
        record_connection_failure(service.tag());
        self.errors
            .handle_error(ErrorReport::new(err.clone()).with_detail("rejected before dialing"));
        self.audit_or_warn(
            AuditEventDraft::new(
                format!("{}_CONFIG_ERROR", service.tag().to_uppercase()),
                AuditSeverity::High,
                AuditCategory::System,
            )
            .with_context("service", service.tag())
            .with_context("code", err.code()),
        )
        .await;
    }

    async fn record_failure(
        &self,
        service: ServiceType,
        err: &ServiceError,
        endpoint: Option<&str>,
    ) {
        record_connection_failure(service.tag());
        self.errors.handle_error(ErrorReport::new(err.clone()));
        let mut draft = AuditEventDraft::new(
            "CONNECTION_FAILED",
            AuditSeverity::High,
            AuditCategory::Security,
        )
        .with_context("service", service.tag())
        .with_context("code", err.code());
        if let Some(endpoint) = endpoint {
            draft = draft.with_context("endpoint", endpoint.to_string());
        }
        self.audit_or_warn(draft).await;
    }

    async fn audit_event(
        &self,
        event_type: &str,
        severity: AuditSeverity,
        category: AuditCategory,
        service: ServiceType,
    ) {
        self.audit_or_warn(
            AuditEventDraft::new(event_type, severity, category)
                .with_context("service", service.tag()),
        )
        .await;
    }

    async fn audit_or_warn(&self, draft: AuditEventDraft) {
        if let Err(e) = self.audit.log(draft).await {
            warn!("audit append failed: {}", e);
        }
    }
}
