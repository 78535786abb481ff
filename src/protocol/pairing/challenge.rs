//! Per-session challenge lifecycle

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::verifier::{PairingKey, Verdict, derive_session_key, verify};
use super::{
    CHALLENGE_LEN, DEFAULT_CHALLENGE_TTL, DEFAULT_MAX_FAILURES, PairingError, SESSION_KEY_LEN,
};
use crate::protocol::crypto::random_bytes;

/// One server-issued challenge
#[derive(Debug, Clone)]
pub struct PairingChallenge {
    bytes: Vec<u8>,
    issued_at: Instant,
    ttl: Duration,
}

impl PairingChallenge {
    /// Issue a fresh random challenge
    ///
    /// # Errors
    ///
    /// Returns `PairingError::Crypto` if the entropy source fails.
    pub fn issue(ttl: Duration) -> Result<Self, PairingError> {
        Ok(Self {
            bytes: random_bytes(CHALLENGE_LEN)?,
            issued_at: Instant::now(),
            ttl,
        })
    }

    /// Challenge bytes sent to the peer
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the challenge can no longer be answered at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.issued_at) >= self.ttl
    }
}

/// Gate that a session must pass before setup proceeds
///
/// Holds at most one outstanding challenge. Every submission consumes it,
/// whether it succeeds or not, so a challenge can never be replayed.
#[derive(Debug)]
pub struct PairingGate {
    key: Arc<PairingKey>,
    outstanding: Option<PairingChallenge>,
    failures: u32,
    max_failures: u32,
    ttl: Duration,
    session_key: Option<[u8; SESSION_KEY_LEN]>,
}

impl PairingGate {
    /// Gate with the default expiry and failure budget
    #[must_use]
    pub fn new(key: Arc<PairingKey>) -> Self {
        Self::with_policy(key, DEFAULT_CHALLENGE_TTL, DEFAULT_MAX_FAILURES)
    }

    /// Gate with a custom expiry and failure budget
    #[must_use]
    pub fn with_policy(key: Arc<PairingKey>, ttl: Duration, max_failures: u32) -> Self {
        Self {
            key,
            outstanding: None,
            failures: 0,
            max_failures: max_failures.max(1),
            ttl,
            session_key: None,
        }
    }

    /// Has a response been accepted on this session
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session_key.is_some()
    }

    /// Key derived from the accepted challenge
    #[must_use]
    pub fn session_key(&self) -> Option<&[u8; SESSION_KEY_LEN]> {
        self.session_key.as_ref()
    }

    /// Has the failure budget been spent
    #[must_use]
    pub fn is_locked_out(&self) -> bool {
        self.failures >= self.max_failures
    }

    /// Consecutive failed submissions
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Outstanding challenge, if any
    #[must_use]
    pub fn outstanding(&self) -> Option<&PairingChallenge> {
        self.outstanding.as_ref()
    }

    /// Replace any outstanding challenge with a fresh one
    ///
    /// # Errors
    ///
    /// Returns `PairingError::LockedOut` once the failure budget is spent,
    /// or `PairingError::Crypto` if the entropy source fails.
    pub fn issue_challenge(&mut self) -> Result<&PairingChallenge, PairingError> {
        if self.is_locked_out() {
            return Err(PairingError::LockedOut);
        }
        Ok(&*self.outstanding.insert(PairingChallenge::issue(self.ttl)?))
    }

    /// Submit a response against the outstanding challenge
    ///
    /// # Errors
    ///
    /// See [`PairingGate::submit_at`].
    pub fn submit(&mut self, response: &[u8]) -> Result<[u8; SESSION_KEY_LEN], PairingError> {
        self.submit_at(response, Instant::now())
    }

    /// Submit a response as of `now`
    ///
    /// # Errors
    ///
    /// - `PairingError::LockedOut` if the budget is already spent, or this
    ///   failure spends it
    /// - `PairingError::NoChallenge` if nothing is outstanding (replay)
    /// - `PairingError::Expired` if the challenge timed out
    /// - `PairingError::Rejected` on an HMAC mismatch
    pub fn submit_at(
        &mut self,
        response: &[u8],
        now: Instant,
    ) -> Result<[u8; SESSION_KEY_LEN], PairingError> {
        if self.is_locked_out() {
            return Err(PairingError::LockedOut);
        }

        let Some(challenge) = self.outstanding.take() else {
            return Err(self.record_failure(PairingError::NoChallenge));
        };

        if challenge.is_expired_at(now) {
            return Err(self.record_failure(PairingError::Expired));
        }

        match verify(challenge.bytes(), response, &self.key) {
            Verdict::Accepted => {
                let session_key = derive_session_key(&self.key, challenge.bytes());
                self.failures = 0;
                self.session_key = Some(session_key);
                Ok(session_key)
            }
            Verdict::Rejected => {
                let remaining = self.max_failures.saturating_sub(self.failures + 1);
                Err(self.record_failure(PairingError::Rejected {
                    attempts_remaining: remaining,
                }))
            }
        }
    }

    /// Drop an outstanding challenge that expired before `now`
    pub fn expire(&mut self, now: Instant) {
        if self
            .outstanding
            .as_ref()
            .is_some_and(|c| c.is_expired_at(now))
        {
            self.outstanding = None;
        }
    }

    fn record_failure(&mut self, error: PairingError) -> PairingError {
        self.failures += 1;
        if self.is_locked_out() {
            PairingError::LockedOut
        } else {
            error
        }
    }
}
