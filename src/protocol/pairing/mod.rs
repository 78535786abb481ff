//! Shared-key pairing: challenge/response proof of key possession
//!
//! The [`verifier`] functions are pure. [`PairingGate`] holds the per-session
//! challenge lifecycle: one outstanding challenge at a time, consumed by the
//! first response submitted against it, with an expiry and a failure budget.

pub mod challenge;
pub mod verifier;


pub use challenge::{PairingChallenge, PairingGate};
pub use verifier::{PairingKey, Verdict, derive_session_key, generate_pairing_key, verify};

use crate::protocol::crypto::CryptoError;
use std::time::Duration;

/// Minimum pairing key length in bytes
pub const MIN_KEY_LEN: usize = 16;

/// Challenge length in bytes
pub const CHALLENGE_LEN: usize = 16;

/// Session key length derived on successful pairing
pub const SESSION_KEY_LEN: usize = 16;

/// How long an issued challenge may be answered
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(30);

/// Consecutive failures tolerated before a session is locked out
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Pairing errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PairingError {
    /// Key shorter than [`MIN_KEY_LEN`]
    #[error("pairing key too short: need at least {min} bytes, got {actual}")]
    KeyTooShort {
        /// Minimum accepted length
        min: usize,
        /// Supplied length
        actual: usize,
    },

    /// No outstanding challenge (never issued, or already consumed)
    #[error("no outstanding pairing challenge")]
    NoChallenge,

    /// Challenge was answered after its expiry
    #[error("pairing challenge expired")]
    Expired,

    /// Response did not match the expected HMAC
    #[error("pairing response rejected; {attempts_remaining} attempt(s) remaining")]
    Rejected {
        /// Attempts left before lockout
        attempts_remaining: u32,
    },

    /// Too many failures on this session
    #[error("pairing locked out after repeated failures")]
    LockedOut,

    /// Underlying crypto failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
