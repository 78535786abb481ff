//! Core types shared by the server and its collaborators

mod config;

pub use config::ServerConfig;

use bytes::Bytes;

/// Default sample rate of decoded audio (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default channel count of decoded audio
pub const DEFAULT_CHANNELS: u16 = 2;

/// One block of decoded audio handed to the audio and multiroom collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Interleaved PCM bytes
    pub data: Bytes,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Presentation timestamp, in samples
    pub timestamp: u64,
}

impl AudioFrame {
    /// Stereo 44.1 kHz frame
    pub fn new(data: impl Into<Bytes>, timestamp: u64) -> Self {
        Self {
            data: data.into(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            timestamp,
        }
    }

    /// Override the stream format
    #[must_use]
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
