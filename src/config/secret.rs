use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A credential string that is wiped from memory on drop and never printed.
///
/// API keys and client secrets are held in this wrapper from the moment they
/// are read from the environment or YAML until the process exits, so a
/// `{:?}` of the server configuration cannot leak them into logs.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret. Callers must not log the returned value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::new("sk-very-secret");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("sk-very-secret"));
        assert_eq!(printed, "SecretString(***)");
    }

    #[test]
    fn test_expose_returns_value() {
        let secret = SecretString::from("abc");
        assert_eq!(secret.expose(), "abc");
        assert!(!secret.is_empty());
        assert!(SecretString::from("").is_empty());
    }
}
