//! Buffered security audit log with encrypted offline persistence.
//!
//! Events are appended to an ordered in-memory buffer and flushed to the
//! remote sink when the buffer reaches capacity or on demand. A flush that
//! cannot reach the sink retries with linear backoff and finally persists the
//! encrypted buffer locally, so no event is ever silently dropped. On
//! construction any persisted buffer is recovered and merged back in.

use crate::metrics::{record_audit_event, record_flush};
use crate::sanitize::Sanitizer;
use crate::sink::{AuditEnvelope, AuditSink, NetworkStatus};
use crate::store::{AuditStore, AUDIT_STORE_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sh_core::{sha256_hex, AuditConfig, Encryptor, ServiceError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Category of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    System,
    Security,
    User,
}

impl AuditCategory {
    pub fn tag(&self) -> &'static str {
        match self {
            AuditCategory::System => "system",
            AuditCategory::Security => "security",
            AuditCategory::User => "user",
        }
    }
}

/// Event fields supplied by the caller; timestamp and metadata are stamped
/// by the log at append time.
#[derive(Debug, Clone)]
pub struct AuditEventDraft {
    pub event_type: String,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
    pub context: HashMap<String, serde_json::Value>,
}

impl AuditEventDraft {
    pub fn new(
        event_type: impl Into<String>,
        severity: AuditSeverity,
        category: AuditCategory,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            category,
            context: HashMap::new(),
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Environment details resolved for each event at append time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditMetadata {
    pub session_id: String,
    pub device_id: String,
    pub user_agent: String,
    pub ip_hash: String,
    pub environment: String,
}

/// Resolves per-event metadata. Implementations must not cache resolved
/// values across events; session identity can change between appends.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn resolve(&self) -> AuditMetadata;
}

/// Metadata provider backed by fixed host facts plus a mutable session id.
pub struct StaticMetadataProvider {
    device_id: String,
    user_agent: String,
    ip_hash: String,
    environment: String,
    session_id: RwLock<Option<String>>,
}

impl StaticMetadataProvider {
    pub fn new(
        environment: impl Into<String>,
        device_id: impl Into<String>,
        user_agent: impl Into<String>,
        client_ip: &str,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            user_agent: user_agent.into(),
            ip_hash: sha256_hex(client_ip),
            environment: environment.into(),
            session_id: RwLock::new(None),
        }
    }

    pub async fn set_session_id(&self, session_id: Option<String>) {
        *self.session_id.write().await = session_id;
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn resolve(&self) -> AuditMetadata {
        let session_id = self
            .session_id
            .read()
            .await
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());
        AuditMetadata {
            session_id,
            device_id: self.device_id.clone(),
            user_agent: self.user_agent.clone(),
            ip_hash: self.ip_hash.clone(),
            environment: self.environment.clone(),
        }
    }
}

/// A complete, immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    pub severity: AuditSeverity,
    pub category: AuditCategory,
    pub context: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub metadata: AuditMetadata,
}

/// Buffered, best-effort-delivered audit log.
pub struct SecurityAuditLog {
    buffer: Mutex<Vec<AuditEvent>>,
    config: AuditConfig,
    environment: String,
    encryptor: Arc<dyn Encryptor>,
    store: Arc<dyn AuditStore>,
    sink: Arc<dyn AuditSink>,
    network: Arc<dyn NetworkStatus>,
    metadata: Arc<dyn MetadataProvider>,
    sanitizer: Sanitizer,
    // Serializes flush attempts; log() only holds the buffer lock briefly.
    flush_lock: Mutex<()>,
}

impl SecurityAuditLog {
    /// Builds the log and recovers any buffer persisted by a previous run.
    ///
    /// Recovery failures are logged and ignored: a corrupted slot must not
    /// prevent startup, and the slot is cleared so it cannot wedge later
    /// flushes.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: AuditConfig,
        environment: impl Into<String>,
        encryptor: Arc<dyn Encryptor>,
        store: Arc<dyn AuditStore>,
        sink: Arc<dyn AuditSink>,
        network: Arc<dyn NetworkStatus>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        let log = Self {
            buffer: Mutex::new(Vec::new()),
            config,
            environment: environment.into(),
            encryptor,
            store,
            sink,
            network,
            metadata,
            sanitizer: Sanitizer::new(),
            flush_lock: Mutex::new(()),
        };
        log.recover().await;
        log
    }

    /// Stamps and appends an event; flushes synchronously at capacity.
    pub async fn log(&self, draft: AuditEventDraft) -> Result<(), ServiceError> {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            event_type: draft.event_type,
            severity: draft.severity,
            category: draft.category,
            context: draft.context,
            timestamp: Utc::now(),
            metadata: self.metadata.resolve().await,
        };
        record_audit_event(event.category.tag());

        let at_capacity = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(event);
            buffer.len() >= self.config.buffer_size
        };

        if at_capacity {
            self.flush().await?;
        }
        Ok(())
    }

    /// Logs a failure as a HIGH/SECURITY event with a sanitized message.
    pub async fn log_error(
        &self,
        event_type: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
        error: &ServiceError,
    ) -> Result<(), ServiceError> {
        let mut draft = AuditEventDraft::new(event_type, AuditSeverity::High, AuditCategory::Security);
        draft.context = context;
        draft.context.insert(
            "error".to_string(),
            self.sanitizer.sanitize(&error.to_string()).into(),
        );
        draft
            .context
            .insert("code".to_string(), error.code().into());
        self.log(draft).await
    }

    /// Flushes buffered events to the remote sink.
    ///
    /// Offline: the encrypted buffer is persisted locally and kept in memory
    /// for a later retry. Online: the snapshot taken at entry is shipped;
    /// events appended while the flush is in flight stay buffered. After the
    /// retry budget is exhausted the buffer is persisted locally exactly once
    /// and `FlushFailed` is returned.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        let _guard = self.flush_lock.lock().await;

        let snapshot = {
            let buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            buffer.clone()
        };
        let snapshot_len = snapshot.len();

        if !self.network.is_online() {
            self.persist(&snapshot).await?;
            record_flush("offline_persisted");
            info!(events = snapshot_len, "offline: audit buffer persisted locally");
            return Ok(());
        }

        let envelope = self.build_envelope(&snapshot)?;

        for attempt in 1..=self.config.max_retries {
            match self.sink.send(&envelope).await {
                Ok(()) => {
                    let mut buffer = self.buffer.lock().await;
                    buffer.drain(..snapshot_len);
                    drop(buffer);
                    // A previously persisted copy of these events is now stale.
                    if let Err(e) = self.store.delete(AUDIT_STORE_KEY).await {
                        warn!("failed to clear persisted audit slot: {}", e);
                    }
                    record_flush("success");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, "audit flush attempt failed: {}", e);
                    if attempt < self.config.max_retries {
                        let delay = std::time::Duration::from_millis(
                            self.config.retry_delay_ms * attempt as u64,
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        // Persist whatever is buffered now, including events appended
        // during the retries, exactly once.
        let current = self.buffer.lock().await.clone();
        self.persist(&current).await?;
        record_flush("failed");
        Err(ServiceError::FlushFailed {
            attempts: self.config.max_retries,
        })
    }

    /// Current number of buffered events.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Buffered events, oldest first. Insertion order is flush order.
    pub async fn entries(&self) -> Vec<AuditEvent> {
        self.buffer.lock().await.clone()
    }

    fn build_envelope(&self, events: &[AuditEvent]) -> Result<AuditEnvelope, ServiceError> {
        let serialized = serde_json::to_string(events)
            .map_err(|e| ServiceError::General(format!("serialize audit batch: {}", e)))?;
        let payload = self
            .encryptor
            .encrypt(&serialized)
            .map_err(|e| ServiceError::Crypto(e.to_string()))?;
        Ok(AuditEnvelope {
            environment: self.environment.clone(),
            timestamp: Utc::now(),
            checksum: sha256_hex(&payload),
            payload,
        })
    }

    async fn persist(&self, events: &[AuditEvent]) -> Result<(), ServiceError> {
        if !self.config.persist_events {
            return Ok(());
        }
        let serialized = serde_json::to_string(events)
            .map_err(|e| ServiceError::General(format!("serialize audit buffer: {}", e)))?;
        let ciphertext = self
            .encryptor
            .encrypt(&serialized)
            .map_err(|e| ServiceError::Crypto(e.to_string()))?;
        self.store.write(AUDIT_STORE_KEY, &ciphertext).await
    }

    async fn recover(&self) {
        let persisted = match self.store.read(AUDIT_STORE_KEY).await {
            Ok(Some(ciphertext)) => ciphertext,
            Ok(None) => return,
            Err(e) => {
                warn!("audit recovery read failed: {}", e);
                return;
            }
        };

        let events: Vec<AuditEvent> = match self
            .encryptor
            .decrypt(&persisted)
            .map_err(|e| e.to_string())
            .and_then(|plain| serde_json::from_str(&plain).map_err(|e| e.to_string()))
        {
            Ok(events) => events,
            Err(e) => {
                warn!("discarding undecodable persisted audit buffer: {}", e);
                let _ = self.store.delete(AUDIT_STORE_KEY).await;
                return;
            }
        };

        {
            let mut buffer = self.buffer.lock().await;
            let known: std::collections::HashSet<Uuid> = buffer.iter().map(|e| e.id).collect();
            let mut merged: Vec<AuditEvent> = events
                .into_iter()
                .filter(|e| !known.contains(&e.id))
                .collect();
            let recovered = merged.len();
            merged.append(&mut buffer);
            *buffer = merged;
            info!(events = recovered, "recovered persisted audit events");
        }
        let _ = self.store.delete(AUDIT_STORE_KEY).await;

        if let Err(e) = self.flush().await {
            warn!("post-recovery audit flush failed: {}", e);
        }
    }
}
