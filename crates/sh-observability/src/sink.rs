//! Remote delivery of flushed audit batches.
//!
//! Flushed buffers travel as an [`AuditEnvelope`]: the serialized events are
//! encrypted, checksummed, and posted to the security-event ingestion
//! endpoint of a connected service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sh_core::ServiceError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Encrypted, checksummed batch of audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEnvelope {
    /// Environment name the batch originated from.
    pub environment: String,
    /// When the envelope was built.
    pub timestamp: DateTime<Utc>,
    /// Hex SHA-256 of `payload`.
    pub checksum: String,
    /// Encrypted serialized event buffer.
    pub payload: String,
}

/// Remote security-event ingestion endpoint.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn send(&self, envelope: &AuditEnvelope) -> Result<(), ServiceError>;
}

/// Connectivity probe consulted before each flush attempt.
pub trait NetworkStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Always-online status for hosts without connectivity tracking.
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Toggleable status for tests and host integrations.
#[derive(Default)]
pub struct SharedNetworkStatus {
    online: AtomicBool,
}

impl SharedNetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl NetworkStatus for SharedNetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// HTTP sink posting envelopes to an ingestion endpoint.
pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditSink {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::General(format!("audit sink client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn send(&self, envelope: &AuditEnvelope) -> Result<(), ServiceError> {
        debug!(endpoint = %self.endpoint, checksum = %envelope.checksum, "shipping audit envelope");
        let response = self
            .client
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ServiceError::General(format!("audit sink send: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::General(format!(
                "audit sink rejected batch: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Scriptable sink for tests: fails the first N sends, records envelopes.
#[derive(Default)]
pub struct MockAuditSink {
    failures_remaining: AtomicUsize,
    sent: Mutex<Vec<AuditEnvelope>>,
    attempts: AtomicUsize,
}

impl MockAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` sends return an error.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<AuditEnvelope> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MockAuditSink {
    async fn send(&self, envelope: &AuditEnvelope) -> Result<(), ServiceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::General("simulated sink failure".into()));
        }
        self.sent.lock().await.push(envelope.clone());
        Ok(())
    }
}
