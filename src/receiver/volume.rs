//! Volume parameter handling
//!
//! Volume arrives in SET_PARAMETER bodies as `volume: <dB>`, where -144.0 dB
//! is mute and 0.0 dB is full volume.

use std::str::FromStr;

const VOLUME_MIN_DB: f32 = -144.0;
const VOLUME_MAX_DB: f32 = 0.0;

/// Volume update from SET_PARAMETER
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeUpdate {
    /// Volume in dB (-144.0 to 0.0)
    pub db: f32,
    /// Muted (volume = -144)
    pub muted: bool,
    /// Linear volume (0.0 to 1.0)
    pub linear: f32,
}

impl VolumeUpdate {
    /// Create from dB value, clamped into range
    #[must_use]
    pub fn from_db(db: f32) -> Self {
        let db = db.clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
        let muted = db <= VOLUME_MIN_DB;
        let linear = db_to_linear(db);

        Self { db, muted, linear }
    }
}

/// Parse volume from a SET_PARAMETER body
///
/// Format: `volume: -15.000000\r\n`. Non-finite values are ignored.
#[must_use]
pub fn parse_volume_parameter(body: &str) -> Option<VolumeUpdate> {
    body.lines()
        .filter_map(|line| line.trim().strip_prefix("volume:"))
        .filter_map(|value| f32::from_str(value.trim()).ok())
        .find(|db| db.is_finite())
        .map(VolumeUpdate::from_db)
}

/// Convert dB volume to linear (0.0 to 1.0)
///
/// Power law: linear = 10^(dB/20), with -144 dB pinned to silence.
#[must_use]
pub fn db_to_linear(db: f32) -> f32 {
    if db <= VOLUME_MIN_DB {
        return 0.0;
    }
    if db >= VOLUME_MAX_DB {
        return 1.0;
    }

    10.0_f32.powf(db / 20.0)
}

/// Convert linear volume (0.0 to 1.0) to dB
#[must_use]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        return VOLUME_MIN_DB;
    }
    if linear >= 1.0 {
        return VOLUME_MAX_DB;
    }

    20.0 * linear.log10()
}
