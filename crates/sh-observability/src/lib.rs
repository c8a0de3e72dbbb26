//! # sh-observability
//!
//! Logging, sanitization, metrics, and the audit pipeline for SecureHunter.
//!
//! The audit pipeline buffers structured security events, flushes them to a
//! remote sink with retry and backoff, and falls back to encrypted local
//! persistence when offline or when the retry budget is exhausted, so events
//! are never silently lost.

pub mod audit;
pub mod logging;
pub mod metrics;
pub mod sanitize;
pub mod sink;
pub mod store;

pub use audit::{
    AuditCategory, AuditEvent, AuditEventDraft, AuditMetadata, AuditSeverity, MetadataProvider,
    SecurityAuditLog, StaticMetadataProvider,
};
pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use sanitize::Sanitizer;
pub use sink::{
    AlwaysOnline, AuditEnvelope, AuditSink, HttpAuditSink, MockAuditSink, NetworkStatus,
    SharedNetworkStatus,
};
pub use store::{AuditStore, FileAuditStore, MemoryAuditStore, AUDIT_STORE_KEY};
