//! The adapter seam between the registry and concrete backend families.

use crate::types::{ConnectionConfig, Session};
use async_trait::async_trait;
use sh_core::{ServiceError, ServiceType};

/// One backend family's authentication protocol.
///
/// Implementations normalize wildly different login flows into the common
/// [`Session`] shape. `initialize` is all-or-nothing: on any failure no
/// partial session state may remain. `terminate` is best-effort; callers
/// always complete local teardown regardless of its result.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn service_type(&self) -> ServiceType;

    /// Checks that the service-specific required credential fields are
    /// present. Must not perform any network I/O.
    fn validate_config(&self, config: &ConnectionConfig) -> Result<(), ServiceError>;

    /// Performs the authentication handshake and returns a normalized
    /// session.
    async fn initialize(&self, config: &ConnectionConfig) -> Result<Session, ServiceError>;

    /// Best-effort remote logout. Local resources tied to the session
    /// (refresh timers etc.) must be released even when the remote call
    /// fails.
    async fn terminate(&self, session: &Session) -> Result<(), ServiceError>;
}
