//! Pure pairing-key and verification functions

use std::fmt;

use zeroize::Zeroizing;

use super::{MIN_KEY_LEN, PairingError, SESSION_KEY_LEN};
use crate::protocol::crypto::{base64_decode, hash_sha1, random_bytes, verify_hmac_sha1};

/// Shared pairing key, wiped from memory on drop
#[derive(Clone)]
pub struct PairingKey(Zeroizing<Vec<u8>>);

impl PairingKey {
    /// Wrap raw key bytes
    ///
    /// # Errors
    ///
    /// Returns `PairingError::KeyTooShort` if fewer than [`MIN_KEY_LEN`] bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PairingError> {
        if bytes.len() < MIN_KEY_LEN {
            return Err(PairingError::KeyTooShort {
                min: MIN_KEY_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// Decode a base64 key, as stored in configuration
    ///
    /// # Errors
    ///
    /// Returns `PairingError::Crypto` for invalid base64, or
    /// `PairingError::KeyTooShort` if the decoded key is too short.
    pub fn from_base64(encoded: &str) -> Result<Self, PairingError> {
        Self::from_bytes(base64_decode(encoded)?)
    }

    /// Raw key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; keys are at least [`MIN_KEY_LEN`] bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PairingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairingKey([REDACTED; {}])", self.0.len())
    }
}

/// Outcome of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Response proves possession of the key
    Accepted,
    /// Response does not match
    Rejected,
}

/// Generate a random pairing key of `len` bytes
///
/// # Errors
///
/// Returns `PairingError::KeyTooShort` if `len < MIN_KEY_LEN`, or
/// `PairingError::Crypto` if the entropy source fails.
pub fn generate_pairing_key(len: usize) -> Result<PairingKey, PairingError> {
    if len < MIN_KEY_LEN {
        return Err(PairingError::KeyTooShort {
            min: MIN_KEY_LEN,
            actual: len,
        });
    }
    PairingKey::from_bytes(random_bytes(len)?)
}

/// Accept iff `response == hmac_sha1(key, challenge)`, compared in constant time
#[must_use]
pub fn verify(challenge: &[u8], response: &[u8], key: &PairingKey) -> Verdict {
    if verify_hmac_sha1(key.as_bytes(), challenge, response) {
        Verdict::Accepted
    } else {
        Verdict::Rejected
    }
}

/// Session key for a completed pairing: `sha1(key || challenge)[..16]`
#[must_use]
pub fn derive_session_key(key: &PairingKey, challenge: &[u8]) -> [u8; SESSION_KEY_LEN] {
    let mut material = Zeroizing::new(Vec::with_capacity(key.len() + challenge.len()));
    material.extend_from_slice(key.as_bytes());
    material.extend_from_slice(challenge);

    let digest = hash_sha1(&material);
    let mut session_key = [0u8; SESSION_KEY_LEN];
    session_key.copy_from_slice(&digest[..SESSION_KEY_LEN]);
    session_key
}

