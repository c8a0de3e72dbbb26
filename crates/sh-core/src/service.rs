//! Service taxonomy for the external backends SecureHunter connects to.

use serde::{Deserialize, Serialize};

/// The families of external security services the platform integrates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Vulnerability intelligence.
    Vi,
    /// Cyber threat intelligence.
    Cti,
    /// Attack surface management.
    Asm,
    /// Security orchestration and response.
    Soar,
}

impl ServiceType {
    /// All known service types, in registration order.
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Vi,
        ServiceType::Cti,
        ServiceType::Asm,
        ServiceType::Soar,
    ];

    /// Short lowercase tag used in audit event types and log fields.
    pub fn tag(&self) -> &'static str {
        match self {
            ServiceType::Vi => "vi",
            ServiceType::Cti => "cti",
            ServiceType::Asm => "asm",
            ServiceType::Soar => "soar",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Authentication scheme a connection uses against its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    ApiKey,
    OAuth,
    Basic,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthType::ApiKey => "api_key",
            AuthType::OAuth => "oauth",
            AuthType::Basic => "basic",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_tags() {
        assert_eq!(ServiceType::Vi.tag(), "vi");
        assert_eq!(ServiceType::Soar.to_string(), "soar");
    }

    #[test]
    fn test_service_type_serde() {
        let json = serde_json::to_string(&ServiceType::Cti).unwrap();
        assert_eq!(json, "\"cti\"");
        let back: ServiceType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServiceType::Cti);
    }

    #[test]
    fn test_auth_type_display() {
        assert_eq!(AuthType::ApiKey.to_string(), "api_key");
        assert_eq!(AuthType::OAuth.to_string(), "oauth");
    }
}
