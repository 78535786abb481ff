//! # airplay-lite
//!
//! A lightweight `AirPlay` receiver session server.
//!
//! ## Features
//!
//! - mDNS advertisement with collision renaming and failure backoff
//! - Discovery (HTTP) and streaming-setup (RTSP) control protocols
//! - Per-session state machine with echoed `CSeq` and session identifiers
//! - Optional shared-key challenge/response pairing gating SETUP
//! - Collaborator callbacks for audio, volume, playback and multiroom
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use airplay_lite::{ServerConfig, SessionServer};
//!
//! # async fn example() -> airplay_lite::Result<()> {
//! let mut server = SessionServer::new(ServerConfig::with_name("Kitchen").port(7000));
//! server.set_volume_handler(Some(Arc::new(|linear: f32| {
//!     println!("volume {linear:.2}");
//! })));
//!
//! server.start().await?;
//! server.run_until(tokio::signal::ctrl_c()).await?;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Facade**: [`SessionServer`] - start / process / stop lifecycle
//! - **Receiver**: multiplexer, dispatcher and session state
//! - **Protocol**: wire codec, pairing and crypto primitives, all sans-IO
//! - **Discovery**: advertisement state machine over `mdns-sd`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;
/// Core types
pub mod types;

pub mod discovery;
pub mod protocol;
pub mod receiver;

// Re-exports
pub use error::{Result, ServerError};
pub use receiver::{
    AudioPort, AudioSink, ClientInfo, MultiroomSink, PlaybackControl, SessionServer,
    SessionState, VolumeListener,
};
pub use types::{AudioFrame, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AudioFrame, AudioSink, MultiroomSink, PlaybackControl, ServerConfig, ServerError,
        SessionServer, VolumeListener,
    };
}
