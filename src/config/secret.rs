//! Key material handling using the secrecy crate
//!
//! De-identification keys (date-shift, crypto-hash and encryption keys) are wrapped in
//! `Secret<SecretValue>` so they are zeroed on drop, redacted from `Debug` output and
//! only reachable through an explicit `expose_secret()`.
//!
//! # Example
//!
//! ```rust
//! use deid::config::{generate_key, secret_string};
//! use secrecy::ExposeSecret;
//!
//! let key = secret_string("my-date-shift-key".to_string());
//! assert_eq!(key.expose_secret().as_bytes(), b"my-date-shift-key");
//!
//! let generated = generate_key();
//! assert_eq!(generated.expose_secret().len(), 32);
//! ```

use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Length of generated keys, in characters
pub const GENERATED_KEY_LEN: usize = 32;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    /// Check if the secret value is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// Type alias for a secret string
pub type SecretString = Secret<SecretValue>;

/// Helper function to create a SecretString from a String
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

/// Generates a random alphanumeric key of [`GENERATED_KEY_LEN`] characters
pub fn generate_key() -> SecretString {
    let key: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_KEY_LEN)
        .map(char::from)
        .collect();
    secret_string(key)
}

/// Uses the supplied key when present and non-empty, otherwise generates one
///
/// Returns the key and whether it was generated.
pub fn key_or_generate(value: Option<String>) -> (SecretString, bool) {
    match value {
        Some(v) if !v.is_empty() => (secret_string(v), false),
        _ => (generate_key(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("test-key".to_string());
        assert_eq!(secret.expose_secret(), "test-key");
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("sensitive-key".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sensitive-key"));
    }

    #[test]
    fn test_generated_keys_are_alphanumeric_and_distinct() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.expose_secret().len(), GENERATED_KEY_LEN);
        assert!(a
            .expose_secret()
            .as_ref()
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.expose_secret().as_ref(), b.expose_secret().as_ref());
    }

    #[test]
    fn test_key_or_generate_keeps_supplied_value() {
        let (key, generated) = key_or_generate(Some("supplied".to_string()));
        assert!(!generated);
        assert_eq!(key.expose_secret(), "supplied");

        let (_, generated) = key_or_generate(Some(String::new()));
        assert!(generated);
        let (_, generated) = key_or_generate(None);
        assert!(generated);
    }

    #[test]
    fn test_secret_serde() {
        #[derive(Serialize, Deserialize)]
        struct Keys {
            key: SecretString,
        }

        let keys: Keys = serde_json::from_str(r#"{"key":"abc"}"#).unwrap();
        assert_eq!(keys.key.expose_secret(), "abc");
        let json = serde_json::to_string(&keys).unwrap();
        assert_eq!(json, r#"{"key":"abc"}"#);
    }
}
