//! Network service advertisement
//!
//! [`Advertiser`] is the publish / collide / fail state machine, written
//! against the [`ServiceRegistry`] seam. [`MdnsRegistry`] backs it with
//! `mdns-sd`, and [`AdvertiserHandle`] runs it on a blocking task.

pub mod advertiser;
pub mod mdns;

#[cfg(test)]
mod advertiser_tests;

pub use advertiser::{
    Advertiser, AdvertiserState, RegistryEvent, ServiceRecord, ServiceRegistry, disambiguate,
};
pub use mdns::{AdvertiserHandle, MdnsRegistry};

/// Service type for `AirPlay` discovery
pub const AIRPLAY_SERVICE_TYPE: &str = "_airplay._tcp.local.";

/// Source version advertised in the `srcvers` TXT key
pub const SOURCE_VERSION: &str = "220.68";

/// Errors from service advertisement
#[derive(Debug, thiserror::Error)]
pub enum AdvertiserError {
    /// mDNS error
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),

    /// Advertisement task panicked or was cancelled
    #[error("Advertiser task failed: {0}")]
    Join(String),
}
