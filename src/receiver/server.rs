//! Session server facade
//!
//! Composes the multiplexer and the advertiser into an explicit
//! start / process / stop lifecycle, and owns the collaborator registry.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use tracing::{error, info};

use super::handlers::{
    AudioPort, AudioSink, HandlerRegistry, MultiroomSink, PlaybackControl, VolumeListener,
};
use super::multiplexer::{ClientInfo, Multiplexer, MultiplexerConfig};
use crate::discovery::{AdvertiserHandle, ServiceRecord};
use crate::error::{Result, ServerError};
use crate::types::{AudioFrame, ServerConfig};

/// Receiver session server
///
/// # Example
///
/// ```rust,no_run
/// use airplay_lite::{ServerConfig, SessionServer};
///
/// # async fn example() -> airplay_lite::Result<()> {
/// let mut server = SessionServer::new(ServerConfig::with_name("Kitchen"));
/// server.start().await?;
/// server.run_until(tokio::signal::ctrl_c()).await?;
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionServer {
    config: ServerConfig,
    handlers: Arc<HandlerRegistry>,
    recording: Arc<AtomicUsize>,
    multiplexer: Option<Multiplexer>,
    advertiser: Option<AdvertiserHandle>,
}

impl SessionServer {
    /// Create a stopped server
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(HandlerRegistry::new()),
            recording: Arc::new(AtomicUsize::new(0)),
            multiplexer: None,
            advertiser: None,
        }
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Replace the configuration
    ///
    /// # Errors
    ///
    /// Returns `ServerError::AlreadyRunning` while started, or
    /// `ServerError::InvalidConfig` if the new configuration is rejected.
    pub fn set_config(&mut self, config: ServerConfig) -> Result<()> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Bind the listener and publish the advertisement
    ///
    /// On failure nothing stays acquired.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::AlreadyRunning`, `ServerError::InvalidConfig`,
    /// `ServerError::Bind`, or `ServerError::Advertisement`.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }
        self.config.validate()?;

        let pairing_key = self.config.decoded_pairing_key()?.map(Arc::new);
        let multiplexer = Multiplexer::bind(
            MultiplexerConfig {
                bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.port)),
                max_sessions: self.config.max_sessions,
                poll_interval: self.config.poll_interval_duration(),
                session_timeout: self.config.session_timeout_duration(),
                recording_timeout: self.config.recording_timeout_duration(),
                pairing_key,
            },
            Arc::clone(&self.handlers),
            Arc::clone(&self.recording),
        )
        .await
        .inspect_err(|e| error!(port = self.config.port, error = %e, "failed to start"))?;

        let local_addr = multiplexer.local_addr()?;

        let advertiser = if self.config.advertise {
            let record = ServiceRecord::from_config(&self.config, local_addr.port());
            match AdvertiserHandle::start(record) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!(error = %e, "failed to start advertisement");
                    multiplexer.shutdown().await;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            name = %self.config.device_name,
            addr = %local_addr,
            max_sessions = self.config.max_sessions,
            pairing = self.config.pairing_key.is_some(),
            advertise = self.config.advertise,
            "session server started"
        );

        self.multiplexer = Some(multiplexer);
        self.advertiser = advertiser;
        Ok(())
    }

    /// Run one multiplexer iteration
    ///
    /// Bounded by the configured poll interval. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::NotRunning` before `start`.
    pub async fn process(&mut self) -> Result<()> {
        let multiplexer = self.multiplexer.as_mut().ok_or(ServerError::NotRunning)?;
        multiplexer.poll_once().await;
        Ok(())
    }

    /// Call [`process`](Self::process) until `shutdown` resolves
    ///
    /// Does not stop the server; call [`stop`](Self::stop) afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::NotRunning` before `start`.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                result = self.process() => result?,
            }
        }
    }

    /// Close the listener and every session, then withdraw the advertisement
    ///
    /// Idempotent. Everything is released when this returns.
    pub async fn stop(&mut self) {
        let multiplexer = self.multiplexer.take();
        let advertiser = self.advertiser.take();
        if multiplexer.is_none() && advertiser.is_none() {
            return;
        }

        if let Some(multiplexer) = multiplexer {
            multiplexer.shutdown().await;
        }
        if let Some(advertiser) = advertiser {
            advertiser.shutdown().await;
        }
        info!(name = %self.config.device_name, "session server stopped");
    }

    /// Is the server started?
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.multiplexer.is_some()
    }

    /// Is any client connected?
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session_count() > 0
    }

    /// The client in the lowest occupied slot
    #[must_use]
    pub fn client_info(&self) -> Option<ClientInfo> {
        self.clients().into_iter().next()
    }

    /// Every connected client, in slot order
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.multiplexer
            .as_ref()
            .map(Multiplexer::clients)
            .unwrap_or_default()
    }

    /// Number of occupied session slots
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.multiplexer
            .as_ref()
            .map_or(0, Multiplexer::session_count)
    }

    /// Bound listening address while running
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.multiplexer.as_ref()?.local_addr().ok()
    }

    /// Name currently advertised, if advertising
    #[must_use]
    pub fn advertised_name(&self) -> Option<String> {
        self.advertiser.as_ref().map(AdvertiserHandle::current_name)
    }

    /// Register the audio handler; `None` unregisters
    pub fn set_audio_handler(&self, handler: Option<Arc<dyn AudioSink>>) {
        self.handlers.set_audio(handler);
    }

    /// Register the volume handler; `None` unregisters
    pub fn set_volume_handler(&self, handler: Option<Arc<dyn VolumeListener>>) {
        self.handlers.set_volume(handler);
    }

    /// Register the playback handler; `None` unregisters
    pub fn set_playback_handler(&self, handler: Option<Arc<dyn PlaybackControl>>) {
        self.handlers.set_playback(handler);
    }

    /// Register the multiroom handler; `None` unregisters
    pub fn set_multiroom_handler(&self, handler: Option<Arc<dyn MultiroomSink>>) {
        self.handlers.set_multiroom(handler);
    }

    /// Handle for pushing decoded audio from another task
    #[must_use]
    pub fn audio_port(&self) -> AudioPort {
        let group = self
            .config
            .multiroom_enabled
            .then(|| self.config.multiroom_group.clone());
        AudioPort::new(
            Arc::clone(&self.handlers),
            Arc::clone(&self.recording),
            group,
        )
    }

    /// Forward a frame while any session is recording; returns whether it was
    pub fn deliver_audio(&self, frame: &AudioFrame) -> bool {
        self.audio_port().deliver(frame)
    }
}
