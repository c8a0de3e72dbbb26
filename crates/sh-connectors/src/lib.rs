//! # sh-connectors
//!
//! Service adapters, the connector registry, and route guards for the
//! SecureHunter connection layer.
//!
//! Each backend family (vulnerability intelligence, threat intel, attack
//! surface management, orchestration) gets a [`ServiceAdapter`] that
//! normalizes its authentication protocol into a common [`Session`] shape.
//! The [`ConnectorRegistry`] is the single entry point for establishing and
//! looking up connections and owns every active session.

pub mod adapter;
pub mod adapters;
pub mod guards;
pub mod http;
pub mod registry;
pub mod secure_string;
pub mod types;

pub use adapter::ServiceAdapter;
pub use adapters::{AsmAdapter, CtiAdapter, MockAdapter, SoarAdapter, ViAdapter};
pub use guards::{GuardDecision, RoleGuard, SessionGuard};
pub use http::AuthHttpClient;
pub use registry::{ConnectorRegistry, DisconnectSummary};
pub use secure_string::SecureString;
pub use types::{ConnectionConfig, Credentials, Session};

// Re-exported so registry consumers need only this crate for common flows.
pub use sh_core::{AuthType, ServiceError, ServiceType};
