//! Protocol-agnostic request and result types.
//!
//! These are the contract between the wire adapters and [`crate::KmsService`].
//! Types carrying payload bytes implement `Debug` by hand so that plaintext and
//! ciphertext never reach a log line.

use std::fmt;
use std::time::{Duration, Instant};

/// Per-call context supplied by the wire adapter.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Correlation id from the caller, when the wire shape has one.
    pub uid: Option<String>,
    /// Point in time after which the caller no longer waits for an answer.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        let uid = uid.into();
        self.uid = if uid.is_empty() { None } else { Some(uid) };
        self
    }

    /// Set the deadline relative to now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Time left before the deadline. `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Correlation id for log lines.
    pub fn uid_or_dash(&self) -> &str {
        self.uid.as_deref().unwrap_or("-")
    }
}

/// Plaintext to encrypt.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptRequest {
    pub plaintext: Vec<u8>,
}

impl fmt::Debug for EncryptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptRequest")
            .field("plaintext_len", &self.plaintext.len())
            .finish()
    }
}

/// Ciphertext produced by the backend, with the key that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptResult {
    pub ciphertext: Vec<u8>,
    pub key_id: String,
}

impl fmt::Debug for EncryptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptResult")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Ciphertext to decrypt, optionally tagged with the key that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptRequest {
    pub ciphertext: Vec<u8>,
    pub key_id: Option<String>,
}

impl fmt::Debug for DecryptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptRequest")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// Recovered plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptResult {
    pub plaintext: Vec<u8>,
}

impl fmt::Debug for DecryptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptResult")
            .field("plaintext_len", &self.plaintext.len())
            .finish()
    }
}

/// Plugin status as reported on the current wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResult {
    pub version: String,
    pub healthz: String,
    pub key_id: String,
}
