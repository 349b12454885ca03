//! Secure credential handling using the secrecy crate
//!
//! Backend credentials (Elasticsearch passwords, API keys) are held in a
//! [`SecretString`], which zeroes its memory on drop and prints as
//! `[REDACTED]` in debug output. Call `expose_secret()` only at the point
//! where the credential is sent.
//!
//! # Example
//!
//! ```rust
//! use anonymize_it::config::{secret_string, SecretString};
//! use secrecy::ExposeSecret;
//!
//! let password: SecretString = secret_string("my-password".to_string());
//! assert_eq!(password.expose_secret().as_ref(), "my-password");
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// String newtype that can live inside a [`Secret`]
#[derive(Clone, Zeroize)]
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

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl SecretValue {
    /// Whether the secret is an empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
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

/// A string that is zeroized on drop and redacted in debug output
pub type SecretString = Secret<SecretValue>;

/// Wraps a string in a [`SecretString`]
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}
