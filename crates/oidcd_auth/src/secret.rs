//! A byte buffer that is guaranteed to be wiped when it goes out of scope.
//!
//! Every field on [`crate::account::Account`] that carries credential material is one of these
//! rather than a plain `String`, so that dropping, replacing, or explicitly [`SecretBuffer::clear`]ing
//! it leaves no readable copy behind in the process's memory.

use std::fmt;

use serde::de::Error as _;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use zeroize::{
    Zeroize,
    ZeroizeOnDrop,
};

#[derive(Clone, Default, ZeroizeOnDrop)]
pub struct SecretBuffer(Vec<u8>);

impl SecretBuffer {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Read-only view of the raw bytes. Callers must not retain this past the buffer's lifetime.
    pub fn expose_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Read-only view as UTF-8. Every credential field in this crate is textual.
    pub fn expose_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Explicitly wipes the buffer in place, leaving it empty. Distinguishing this from `drop`
    /// matters because account records are re-inserted (not dropped) on most mutations.
    pub fn clear(&mut self) {
        self.0.zeroize();
        self.0.clear();
    }

    /// Replaces the contents, wiping the previous value first.
    pub fn set(&mut self, bytes: impl Into<Vec<u8>>) {
        self.clear();
        self.0 = bytes.into();
    }
}

impl From<String> for SecretBuffer {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for SecretBuffer {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for SecretBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Deliberately not derived: printing a [`SecretBuffer`] must never reveal its content, even in
/// a panic message or an `Internal` error log line.
impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "SecretBuffer(empty)")
        } else {
            write!(f, "SecretBuffer({} bytes, REDACTED)", self.0.len())
        }
    }
}

impl PartialEq for SecretBuffer {
    fn eq(&self, other: &Self) -> bool {
        // Constant-time-ish comparison isn't load-bearing here: these are compared against
        // provider-returned and locally generated values, never against a user-suppliable guess.
        self.0 == other.0
    }
}

/// Serializing a [`SecretBuffer`] is intentional, not accidental: the wire protocol's `config`
/// response for `gen`/`register`/`add` is the one place a secret is meant to cross the trust
/// boundary back to the caller that owns it. Nothing in this crate serializes an [`crate::account::Account`]
/// for logging; logging goes through `Debug`, which stays redacted above.
impl Serialize for SecretBuffer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.expose_str())
    }
}

impl<'de> Deserialize<'de> for SecretBuffer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(SecretBuffer::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_contains_plaintext() {
        let secret = SecretBuffer::from("hunter2-refresh-token");
        let printed = format!("{secret:?}");
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn clear_wipes_and_empties() {
        let mut secret = SecretBuffer::from("some-access-token");
        secret.clear();
        assert!(secret.is_empty());
        assert_eq!(secret.expose_str(), "");
    }

    #[test]
    fn roundtrips_through_serde() {
        let secret = SecretBuffer::from("R-12345");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"R-12345\"");
        let back: SecretBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
    }
}
