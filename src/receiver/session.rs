//! Receiver session state
//!
//! One [`Session`] per accepted connection, mutated only by the dispatcher on
//! the multiplexer's loop.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::pairing::{PairingGate, SESSION_KEY_LEN};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Initial state after TCP connection
    Connected,
    /// ANNOUNCE received
    Announced,
    /// SETUP complete, session id assigned
    Setup,
    /// RECORD received, eligible for audio
    Recording,
    /// TEARDOWN received
    TornDown,
}

impl SessionState {
    /// Check if transition to new state is valid
    ///
    /// Transitions only move forward. TEARDOWN is reachable from anywhere
    /// except itself.
    #[must_use]
    pub fn can_transition_to(&self, new_state: SessionState) -> bool {
        use SessionState::{Announced, Connected, Recording, Setup, TornDown};

        match (self, new_state) {
            (Connected | Announced, Announced)
            | (Announced, Setup)
            | (Setup, Recording)
            | (Connected | Announced | Setup | Recording, TornDown) => true,

            _ => false,
        }
    }

    /// Is audio flowing for this session?
    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Has SETUP completed (Setup or Recording)?
    #[must_use]
    pub fn is_set_up(&self) -> bool {
        matches!(self, SessionState::Setup | SessionState::Recording)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connected => "connected",
            SessionState::Announced => "announced",
            SessionState::Setup => "setup",
            SessionState::Recording => "recording",
            SessionState::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

/// Server-side state for one control connection
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    state: SessionState,
    id: Option<String>,
    pairing: Option<PairingGate>,
    last_activity: Instant,
    created_at: Instant,
}

impl Session {
    /// Create a session in `Connected`
    ///
    /// A `pairing` gate means SETUP must be authenticated first.
    #[must_use]
    pub fn new(peer: SocketAddr, pairing: Option<PairingGate>) -> Self {
        let now = Instant::now();
        Self {
            peer,
            state: SessionState::Connected,
            id: None,
            pairing,
            last_activity: now,
            created_at: now,
        }
    }

    /// Get peer address
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Set state (validates transition)
    ///
    /// # Errors
    /// Returns `SessionError::InvalidTransition` if the state transition is not allowed.
    pub fn set_state(&mut self, new_state: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(new_state) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        self.state = new_state;
        Ok(())
    }

    /// Session identifier, once SETUP has assigned one
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assign the identifier if none is set yet; returns the identifier
    ///
    /// Once assigned the identifier never changes.
    pub fn assign_id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_session_id)
    }

    /// Does SETUP on this session require pairing?
    #[must_use]
    pub fn requires_pairing(&self) -> bool {
        self.pairing.is_some()
    }

    /// Has pairing completed (always true without a gate)
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.pairing
            .as_ref()
            .is_none_or(PairingGate::is_authenticated)
    }

    /// Pairing gate, if pairing is required
    pub fn pairing_mut(&mut self) -> Option<&mut PairingGate> {
        self.pairing.as_mut()
    }

    /// Key negotiated by pairing
    #[must_use]
    pub fn session_key(&self) -> Option<&[u8; SESSION_KEY_LEN]> {
        self.pairing.as_ref()?.session_key()
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since last activity, as of `now`
    #[must_use]
    pub fn idle_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Get session age
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Housekeeping: drop an expired pairing challenge
    pub fn expire_challenge(&mut self, now: Instant) {
        if let Some(gate) = self.pairing.as_mut() {
            gate.expire(now);
        }
    }
}

/// Session errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// State transition is not allowed
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: SessionState,
        /// Target state
        to: SessionState,
    },

    /// Every session slot is occupied
    #[error("Session table full ({capacity} slots)")]
    TableFull {
        /// Table capacity
        capacity: usize,
    },
}

fn generate_session_id() -> String {
    use rand::Rng;
    let id: u64 = rand::thread_rng().r#gen();
    format!("{id:016X}")
}
