//! # sh-core
//!
//! Core building blocks for the SecureHunter connection layer: the service
//! taxonomy, the shared error model and handler, credential encryption, and
//! configuration loading.

pub mod config;
pub mod crypto;
pub mod error;
pub mod service;
pub mod session;

pub use config::{AppConfig, AuditConfig, FeatureToggles};
pub use crypto::{
    create_encryptor, generate_encryption_key, sha256_hex, Aes256GcmEncryptor, CryptoError,
    Encryptor, PlaintextEncryptor,
};
pub use error::{ErrorHandler, ErrorReport, RecoveryAction, ServiceError, ServiceResult};
pub use service::{AuthType, ServiceType};
pub use session::{MemorySessionStore, SessionStore, UserSession};
