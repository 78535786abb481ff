//! Advertisement state machine
//!
//! ```text
//! Unpublished ──running──▶ Publishing ──announced──▶ Established
//!      ▲                     │     ▲                     │
//!      │               collision   └──── Colliding ◀─────┘
//!  disconnected              │
//!      │                     ▼
//!      └──────────────── Failed ──backoff──▶ Publishing
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{AIRPLAY_SERVICE_TYPE, AdvertiserError, SOURCE_VERSION};
use crate::types::ServerConfig;

/// First retry delay after a failure
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Retry delay ceiling
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// The published network record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Instance name, disambiguated after a collision
    pub name: String,
    /// Service type token
    pub service_type: String,
    /// Listening port
    pub port: u16,
    /// TXT properties
    pub txt: BTreeMap<String, String>,
}

impl ServiceRecord {
    /// Record for `config` listening on `port`
    #[must_use]
    pub fn from_config(config: &ServerConfig, port: u16) -> Self {
        let mut txt = BTreeMap::new();
        txt.insert("deviceid".to_string(), config.device_id.clone());
        txt.insert("model".to_string(), config.model_name.clone());
        txt.insert("srcvers".to_string(), SOURCE_VERSION.to_string());
        if config.multiroom_enabled {
            txt.insert("gid".to_string(), config.multiroom_group.clone());
        }

        Self {
            name: config.device_name.clone(),
            service_type: AIRPLAY_SERVICE_TYPE.to_string(),
            port,
            txt,
        }
    }
}

/// Advertisement lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiserState {
    /// Nothing published
    Unpublished,
    /// Record handed to the network client, not yet announced
    Publishing,
    /// Record announced on the network
    Established,
    /// Name taken; republishing under a new name
    Colliding,
    /// Client reported failure; waiting out the backoff
    Failed,
}

impl std::fmt::Display for AdvertiserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unpublished => "unpublished",
            Self::Publishing => "publishing",
            Self::Established => "established",
            Self::Colliding => "colliding",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Event reported by the network client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Client is running and can publish
    ClientRunning,
    /// Client lost its network
    ClientDisconnected,
    /// Client or registration failure
    Failed(String),
    /// Our record was announced
    Established,
    /// Another host owns our name
    NameCollision,
}

/// Network client the advertiser drives
pub trait ServiceRegistry {
    /// Publish `record`, replacing anything published before
    ///
    /// # Errors
    ///
    /// Returns an error if the client refuses the record.
    fn publish(&mut self, record: &ServiceRecord) -> Result<(), AdvertiserError>;

    /// Withdraw the published record, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot withdraw it.
    fn withdraw(&mut self) -> Result<(), AdvertiserError>;

    /// Wait up to `timeout` for the next client event
    fn poll_event(&mut self, timeout: Duration) -> Option<RegistryEvent>;
}

/// Name to use for the `attempt`-th publication of `base`
///
/// Attempt 1 is the base name itself; later attempts append ` (n)`.
#[must_use]
pub fn disambiguate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base} ({attempt})")
    }
}

/// Publishes one service record and keeps it published
#[derive(Debug)]
pub struct Advertiser<R> {
    registry: R,
    base_name: String,
    record: ServiceRecord,
    state: AdvertiserState,
    client_running: bool,
    attempt: u32,
    backoff: Duration,
    retry_at: Option<Instant>,
}

impl<R: ServiceRegistry> Advertiser<R> {
    /// Create an unpublished advertiser for `record`
    pub fn new(registry: R, record: ServiceRecord) -> Self {
        Self {
            registry,
            base_name: record.name.clone(),
            record,
            state: AdvertiserState::Unpublished,
            client_running: false,
            attempt: 1,
            backoff: INITIAL_BACKOFF,
            retry_at: None,
        }
    }

    /// Current state
    pub fn state(&self) -> AdvertiserState {
        self.state
    }

    /// Record as it is (or will next be) published
    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// Name currently in use
    pub fn current_name(&self) -> &str {
        &self.record.name
    }

    /// When a failed publication will next be retried
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Underlying registry
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Wait for one client event, apply it, then run timers
    pub fn poll(&mut self, timeout: Duration) {
        if let Some(event) = self.registry.poll_event(timeout) {
            self.handle_event(event, Instant::now());
        }
        self.tick(Instant::now());
    }

    /// Apply one client event
    pub fn handle_event(&mut self, event: RegistryEvent, now: Instant) {
        debug!(state = %self.state, event = ?event, "advertiser event");

        match event {
            RegistryEvent::ClientRunning => {
                self.client_running = true;
                if matches!(
                    self.state,
                    AdvertiserState::Unpublished | AdvertiserState::Failed
                ) {
                    self.publish(now);
                }
            }
            RegistryEvent::ClientDisconnected => {
                self.client_running = false;
                self.withdraw_quietly();
                self.retry_at = None;
                self.set_state(AdvertiserState::Unpublished);
            }
            RegistryEvent::Failed(reason) => {
                if !matches!(
                    self.state,
                    AdvertiserState::Unpublished | AdvertiserState::Failed
                ) {
                    self.fail(now, &reason);
                }
            }
            RegistryEvent::Established => {
                if self.state == AdvertiserState::Publishing {
                    self.backoff = INITIAL_BACKOFF;
                    self.retry_at = None;
                    self.set_state(AdvertiserState::Established);
                    info!(
                        name = %self.record.name,
                        service_type = %self.record.service_type,
                        port = self.record.port,
                        "service advertised"
                    );
                }
            }
            RegistryEvent::NameCollision => {
                if matches!(
                    self.state,
                    AdvertiserState::Publishing | AdvertiserState::Established
                ) {
                    self.attempt += 1;
                    let previous = std::mem::replace(
                        &mut self.record.name,
                        disambiguate(&self.base_name, self.attempt),
                    );
                    warn!(
                        previous = %previous,
                        next = %self.record.name,
                        "service name collision"
                    );
                    self.withdraw_quietly();
                    self.set_state(AdvertiserState::Colliding);
                }
            }
        }
    }

    /// Run pending republications and retries due at `now`
    pub fn tick(&mut self, now: Instant) {
        if !self.client_running {
            return;
        }
        match self.state {
            AdvertiserState::Colliding => self.publish(now),
            AdvertiserState::Failed if self.retry_at.is_none_or(|at| now >= at) => {
                self.publish(now);
            }
            _ => {}
        }
    }

    /// Withdraw the record and return to `Unpublished`
    pub fn shutdown(&mut self) {
        if self.state != AdvertiserState::Unpublished {
            self.withdraw_quietly();
            self.set_state(AdvertiserState::Unpublished);
            info!(name = %self.record.name, "service withdrawn");
        }
        self.retry_at = None;
    }

    fn publish(&mut self, now: Instant) {
        match self.registry.publish(&self.record) {
            Ok(()) => {
                self.retry_at = None;
                self.set_state(AdvertiserState::Publishing);
            }
            Err(e) => self.fail(now, &e.to_string()),
        }
    }

    fn fail(&mut self, now: Instant, reason: &str) {
        self.withdraw_quietly();
        self.retry_at = Some(now + self.backoff);
        warn!(
            name = %self.record.name,
            reason,
            retry_in_ms = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX),
            "advertisement failed"
        );
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        self.set_state(AdvertiserState::Failed);
    }

    fn withdraw_quietly(&mut self) {
        if let Err(e) = self.registry.withdraw() {
            debug!(error = %e, "withdraw failed");
        }
    }

    fn set_state(&mut self, state: AdvertiserState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "advertiser state changed");
            self.state = state;
        }
    }
}
