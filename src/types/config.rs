use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::protocol::pairing::PairingKey;

/// Session server configuration
///
/// Read as a unit, settable as a unit while the server is stopped. Missing
/// fields in a JSON document fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Advertised device name (default: "OpenWRT AirPlay")
    pub device_name: String,

    /// Model name in the TXT record (default: "OpenWRT")
    pub model_name: String,

    /// Stable device identifier (default: "OpenWRT-AirPlay-001")
    pub device_id: String,

    /// Listening port, 0 picks an ephemeral port (default: 7000)
    pub port: u16,

    /// Replicate audio to peer rooms (default: false)
    pub multiroom_enabled: bool,

    /// Multiroom group name (default: empty)
    pub multiroom_group: String,

    /// Session slot capacity (default: 4)
    pub max_sessions: usize,

    /// Upper bound on one readiness wait, in milliseconds (default: 10)
    pub poll_interval_ms: u64,

    /// Idle sessions are evicted after this many seconds (default: 60)
    pub session_timeout_secs: u64,

    /// Recording sessions are evicted after this many quiet seconds (default: 300)
    pub recording_timeout_secs: u64,

    /// Base64 shared key; when set, SETUP requires pairing
    pub pairing_key: Option<String>,

    /// Publish the mDNS record on start (default: true)
    pub advertise: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            device_name: "OpenWRT AirPlay".to_string(),
            model_name: "OpenWRT".to_string(),
            device_id: "OpenWRT-AirPlay-001".to_string(),
            port: 7000,
            multiroom_enabled: false,
            multiroom_group: String::new(),
            max_sessions: 4,
            poll_interval_ms: 10,
            session_timeout_secs: 60,
            recording_timeout_secs: 300,
            pairing_key: None,
            advertise: true,
        }
    }
}

impl ServerConfig {
    /// Create with custom device name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            device_name: name.into(),
            ..Default::default()
        }
    }

    /// Set model name
    #[must_use]
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model_name = model.into();
        self
    }

    /// Set device identifier
    #[must_use]
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    /// Set port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable multiroom fan-out under `group`
    #[must_use]
    pub fn multiroom(mut self, group: impl Into<String>) -> Self {
        self.multiroom_enabled = true;
        self.multiroom_group = group.into();
        self
    }

    /// Set session slot capacity
    #[must_use]
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set readiness wait bound
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set idle eviction timeout
    #[must_use]
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the quiet period after which a recording session is evicted
    #[must_use]
    pub fn recording_timeout(mut self, timeout: Duration) -> Self {
        self.recording_timeout_secs = timeout.as_secs();
        self
    }

    /// Require pairing with a base64 shared key
    #[must_use]
    pub fn pairing_key(mut self, key_b64: impl Into<String>) -> Self {
        self.pairing_key = Some(key_b64.into());
        self
    }

    /// Enable or disable mDNS advertisement
    #[must_use]
    pub fn advertise(mut self, advertise: bool) -> Self {
        self.advertise = advertise;
        self
    }

    /// Readiness wait bound as a duration
    #[must_use]
    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Idle eviction timeout as a duration
    #[must_use]
    pub fn session_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Recording eviction timeout as a duration
    #[must_use]
    pub fn recording_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.recording_timeout_secs)
    }

    /// Decode the configured pairing key, if any
    ///
    /// # Errors
    ///
    /// Returns `ServerError::InvalidConfig` if the key is not valid base64 or
    /// is too short.
    pub fn decoded_pairing_key(&self) -> Result<Option<PairingKey>, ServerError> {
        self.pairing_key
            .as_deref()
            .map(|encoded| {
                PairingKey::from_base64(encoded).map_err(|e| ServerError::InvalidConfig {
                    field: "pairing_key",
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    /// Check the configuration before it is used to start a server
    ///
    /// # Errors
    ///
    /// Returns `ServerError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.device_name.trim().is_empty() {
            return Err(ServerError::InvalidConfig {
                field: "device_name",
                message: "must not be empty".to_string(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ServerError::InvalidConfig {
                field: "max_sessions",
                message: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ServerError::InvalidConfig {
                field: "poll_interval_ms",
                message: "must be at least 1".to_string(),
            });
        }
        self.decoded_pairing_key()?;
        Ok(())
    }

    /// Parse from a JSON document
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigDecode` for malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigRead` if the file cannot be read, or
    /// `ServerError::ConfigDecode` for malformed JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ConfigDecode` if serialization fails.
    pub fn to_json_string(&self) -> Result<String, ServerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
