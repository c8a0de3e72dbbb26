//! Secure string type for credential handling with automatic memory zeroization.
//!
//! Wraps sensitive values so the backing memory is cleared on drop and the
//! value never leaks through `Debug`/`Display` output. Deliberately does NOT
//! implement `Serialize`: credentials and session tokens must never end up in
//! serialized audit context or persisted state.

use serde::{Deserialize, Deserializer};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// A string that zeroizes its contents when dropped and redacts itself in
/// all formatted output.
#[derive(Clone)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    /// Exposes the secret for use.
    ///
    /// Avoid copying the returned value; copies are not zeroized.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl Default for SecureString {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time comparison to prevent timing attacks
        use subtle::ConstantTimeEq;
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for SecureString {}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(SecureString::new(s))
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_expose() {
        let secret = SecureString::new("my-secret-key".to_string());
        assert_eq!(secret.expose_secret(), "my-secret-key");
        assert_eq!(secret.len(), 13);
        assert!(!secret.is_empty());
    }

    #[test]
    fn test_from_str_and_default() {
        let secret: SecureString = "abc".into();
        assert_eq!(secret.expose_secret(), "abc");
        assert!(SecureString::default().is_empty());
    }

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = SecureString::new("super-secret".to_string());
        assert!(!format!("{:?}", secret).contains("super-secret"));
        assert!(format!("{:?}", secret).contains("REDACTED"));
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_constant_time_equality() {
        let a = SecureString::from("same-value");
        let b = SecureString::from("same-value");
        let c = SecureString::from("different");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_deserializes_from_plain_string() {
        let secret: SecureString = serde_json::from_str("\"tok-123\"").unwrap();
        assert_eq!(secret.expose_secret(), "tok-123");
    }
}
