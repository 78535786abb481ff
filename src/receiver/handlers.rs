//! Collaborator interfaces
//!
//! The server calls these synchronously on its loop task. Implementations
//! must return promptly: hand the work to a channel or a lock-free buffer
//! rather than blocking.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::AudioFrame;

/// Consumes decoded audio while a session is recording
pub trait AudioSink: Send + Sync {
    /// Deliver one frame
    fn on_audio(&self, frame: &AudioFrame);
}

impl<F> AudioSink for F
where
    F: Fn(&AudioFrame) + Send + Sync,
{
    fn on_audio(&self, frame: &AudioFrame) {
        self(frame);
    }
}

/// Notified of volume changes
pub trait VolumeListener: Send + Sync {
    /// New volume, linear 0.0 (mute) to 1.0 (full)
    fn on_volume(&self, linear: f32);
}

impl<F> VolumeListener for F
where
    F: Fn(f32) + Send + Sync,
{
    fn on_volume(&self, linear: f32) {
        self(linear);
    }
}

/// Transport controls forwarded from the streaming protocol
///
/// Every method defaults to a no-op.
pub trait PlaybackControl: Send + Sync {
    /// Streaming started (RECORD)
    fn play(&self) {}
    /// Playback paused (PAUSE)
    fn pause(&self) {}
    /// Session ended (TEARDOWN, or a recording session was lost)
    fn stop(&self) {}
    /// Skip forward
    fn next(&self) {}
    /// Skip back
    fn previous(&self) {}
    /// Buffered audio discarded (FLUSH)
    fn flush(&self) {}
}

/// Replicates audio to peer rooms
pub trait MultiroomSink: Send + Sync {
    /// Fan one frame out to `group`; the frame carries its timestamp
    fn distribute(&self, group: &str, frame: &AudioFrame);
}

impl<F> MultiroomSink for F
where
    F: Fn(&str, &AudioFrame) + Send + Sync,
{
    fn distribute(&self, group: &str, frame: &AudioFrame) {
        self(group, frame);
    }
}

type Slot<T> = RwLock<Option<Arc<T>>>;

/// Registered collaborators, one per event kind
///
/// Registration replaces any earlier handler; `None` unregisters. Missing
/// handlers turn notifications into no-ops.
#[derive(Default)]
pub struct HandlerRegistry {
    audio: Slot<dyn AudioSink>,
    volume: Slot<dyn VolumeListener>,
    playback: Slot<dyn PlaybackControl>,
    multiroom: Slot<dyn MultiroomSink>,
}

fn load<T: ?Sized>(slot: &Slot<T>) -> Option<Arc<T>> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn store<T: ?Sized>(slot: &Slot<T>, value: Option<Arc<T>>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = value;
}

impl HandlerRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the audio handler
    pub fn set_audio(&self, handler: Option<Arc<dyn AudioSink>>) {
        store(&self.audio, handler);
    }

    /// Register the volume handler
    pub fn set_volume(&self, handler: Option<Arc<dyn VolumeListener>>) {
        store(&self.volume, handler);
    }

    /// Register the playback handler
    pub fn set_playback(&self, handler: Option<Arc<dyn PlaybackControl>>) {
        store(&self.playback, handler);
    }

    /// Register the multiroom handler
    pub fn set_multiroom(&self, handler: Option<Arc<dyn MultiroomSink>>) {
        store(&self.multiroom, handler);
    }

    /// Forward a frame to the audio handler
    pub fn audio(&self, frame: &AudioFrame) {
        if let Some(handler) = load(&self.audio) {
            handler.on_audio(frame);
        }
    }

    /// Forward a volume change
    pub fn volume(&self, linear: f32) {
        if let Some(handler) = load(&self.volume) {
            handler.on_volume(linear);
        }
    }

    /// Run `f` against the playback handler, if any
    pub fn playback(&self, f: impl FnOnce(&dyn PlaybackControl)) {
        if let Some(handler) = load(&self.playback) {
            f(handler.as_ref());
        }
    }

    /// Forward a frame to the multiroom handler
    pub fn multiroom(&self, group: &str, frame: &AudioFrame) {
        if let Some(handler) = load(&self.multiroom) {
            handler.distribute(group, frame);
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("audio", &load(&self.audio).is_some())
            .field("volume", &load(&self.volume).is_some())
            .field("playback", &load(&self.playback).is_some())
            .field("multiroom", &load(&self.multiroom).is_some())
            .finish()
    }
}

/// Cloneable entry point for decoded audio
///
/// Frames pass through only while at least one session is recording.
#[derive(Debug, Clone)]
pub struct AudioPort {
    handlers: Arc<HandlerRegistry>,
    recording: Arc<AtomicUsize>,
    multiroom_group: Option<String>,
}

impl AudioPort {
    pub(crate) fn new(
        handlers: Arc<HandlerRegistry>,
        recording: Arc<AtomicUsize>,
        multiroom_group: Option<String>,
    ) -> Self {
        Self {
            handlers,
            recording,
            multiroom_group,
        }
    }

    /// Is any session recording?
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire) > 0
    }

    /// Deliver a frame; returns whether it was forwarded
    pub fn deliver(&self, frame: &AudioFrame) -> bool {
        if !self.is_recording() {
            tracing::trace!(bytes = frame.len(), "dropping audio, no recording session");
            return false;
        }
        self.handlers.audio(frame);
        if let Some(ref group) = self.multiroom_group {
            self.handlers.multiroom(group, frame);
        }
        true
    }
}
