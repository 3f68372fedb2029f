//! Secret-bearing string wrapper
//!
//! Passwords travel through the pipeline inside `SecretString`, which masks
//! the value in `Debug`, `Display`, and serialized output. Handlers that
//! actually submit the value to the remote service call `expose()`.

use serde::{Deserialize, Serialize, Serializer};

/// Sentinel emitted wherever a secret would otherwise be rendered.
pub const SECRET_SENTINEL: &str = "********";

/// A string whose value must never reach logs or rendered output.
///
/// Serialization always emits [`SECRET_SENTINEL`]; deserialization accepts the
/// plain value (manifests carry real passwords in). Equality compares the real
/// value so normalization stays honest, but the diff layer only ever compares
/// presence (see `diff::fields`).
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value. Call sites are the audit surface.
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

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(SECRET_SENTINEL)
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(SECRET_SENTINEL)
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(SECRET_SENTINEL)
    }
}
