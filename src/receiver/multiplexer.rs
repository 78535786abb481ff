//! Session table and connection multiplexer
//!
//! One owner holds the listener and every [`Session`]. Each connection gets
//! a reader task, which forwards raw bytes into a shared channel, and a writer
//! task, which flushes queued responses. Neither task touches session state;
//! all parsing and dispatch happens in [`Multiplexer::poll_once`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::dispatcher::{Notification, Outcome, dispatch};
use super::handlers::HandlerRegistry;
use super::session::{Session, SessionState};
use super::session_table::{SessionTable, SlotId};
use crate::error::ServerError;
use crate::protocol::pairing::{PairingGate, PairingKey};
use crate::protocol::rtsp::RequestCodec;

/// Bytes requested per socket read
const READ_CHUNK: usize = 4096;

/// Buffered reader events before readers wait on the loop
const INBOUND_CAPACITY: usize = 256;

/// Response batches queued per connection before the peer counts as stalled
///
/// One batch holds every response produced by a single read.
const WRITER_QUEUE_CAPACITY: usize = 64;

/// How long shutdown waits for writers to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Event from a connection's reader task
#[derive(Debug)]
enum Inbound {
    Data { slot: SlotId, bytes: Bytes },
    Closed { slot: SlotId, error: Option<io::Error> },
}

/// Why a session left the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection
    PeerClosed,
    /// Socket read failed
    ReadError,
    /// Input could not be framed
    Malformed,
    /// TEARDOWN, or pairing lockout
    Requested,
    /// No recognized request within the session or recording timeout
    IdleTimeout,
    /// Peer stopped reading and its response queue filled up
    Backpressure,
    /// Server stopping
    Shutdown,
}

/// Snapshot of one occupied slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Slot number
    pub slot: usize,
    /// Peer address
    pub peer: SocketAddr,
    /// Lifecycle state
    pub state: SessionState,
    /// Session identifier, once assigned
    pub session_id: Option<String>,
    /// Pairing completed (or not required)
    pub authenticated: bool,
}

/// Runtime knobs taken from the server configuration
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Listen address
    pub bind_addr: SocketAddr,
    /// Session slot capacity
    pub max_sessions: usize,
    /// Upper bound on one readiness wait
    pub poll_interval: Duration,
    /// Idle eviction threshold, zero disables eviction
    pub session_timeout: Duration,
    /// Idle eviction threshold while recording, zero disables it
    pub recording_timeout: Duration,
    /// Shared pairing key; `Some` gates SETUP
    pub pairing_key: Option<Arc<PairingKey>>,
}

struct Connection {
    session: Session,
    codec: RequestCodec,
    writer: mpsc::Sender<Bytes>,
    writer_task: Option<JoinHandle<()>>,
    reader_task: JoinHandle<()>,
}

impl Connection {
    /// Queue one batch of responses
    ///
    /// Returns false once the peer has stopped draining its queue. A closed
    /// writer means the peer is gone, which its reader reports.
    fn send(&self, bytes: Vec<u8>) -> bool {
        !matches!(
            self.writer.try_send(Bytes::from(bytes)),
            Err(TrySendError::Full(_))
        )
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Listener plus bounded session table, driven one iteration at a time
pub struct Multiplexer {
    listener: TcpListener,
    table: SessionTable<Connection>,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: mpsc::Receiver<Inbound>,
    handlers: Arc<HandlerRegistry>,
    recording: Arc<AtomicUsize>,
    config: MultiplexerConfig,
}

impl Multiplexer {
    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        config: MultiplexerConfig,
        handlers: Arc<HandlerRegistry>,
        recording: Arc<AtomicUsize>,
    ) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(config.bind_addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: config.bind_addr,
                    source,
                })?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        Ok(Self {
            listener,
            table: SessionTable::new(config.max_sessions),
            inbound_tx,
            inbound_rx,
            handlers,
            recording,
            config,
        })
    }

    /// Bound address
    ///
    /// # Errors
    ///
    /// Returns the socket error if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of occupied slots
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.table.len()
    }

    /// Slot capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Snapshot of every occupied slot, in slot order
    #[must_use]
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.table
            .iter()
            .map(|(id, conn)| ClientInfo {
                slot: id.index(),
                peer: conn.session.peer(),
                state: conn.session.state(),
                session_id: conn.session.id().map(str::to_string),
                authenticated: conn.session.is_authenticated(),
            })
            .collect()
    }

    /// Run one loop iteration
    ///
    /// Waits up to the poll interval for a connection or inbound bytes,
    /// handles it, drains every other event already queued, then runs
    /// housekeeping. Cancel-safe: dropping the future loses no events.
    pub async fn poll_once(&mut self) {
        tokio::select! {
            accepted = self.listener.accept() => self.on_accept(accepted),
            Some(event) = self.inbound_rx.recv() => self.on_inbound(event),
            () = tokio::time::sleep(self.config.poll_interval) => {}
        }

        while let Ok(event) = self.inbound_rx.try_recv() {
            self.on_inbound(event);
        }

        self.housekeeping(Instant::now());
    }

    fn on_accept(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                // Interrupted, aborted handshakes and fd exhaustion are all retried
                warn!(error = %e, "accept failed");
                return;
            }
        };

        let Some(slot) = self.table.next_id() else {
            warn!(
                peer = %peer,
                capacity = self.table.capacity(),
                "session table full, rejecting connection"
            );
            drop(stream);
            return;
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "could not set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let (writer, writer_rx) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        let reader_task = tokio::spawn(read_loop(read_half, slot, self.inbound_tx.clone()));
        let writer_task = tokio::spawn(write_loop(write_half, writer_rx, peer));

        let gate = self
            .config
            .pairing_key
            .as_ref()
            .map(|key| PairingGate::new(Arc::clone(key)));

        let conn = Connection {
            session: Session::new(peer, gate),
            codec: RequestCodec::new(),
            writer,
            writer_task: Some(writer_task),
            reader_task,
        };

        match self.table.insert(conn) {
            Ok(id) => info!(
                peer = %peer,
                slot = id.index(),
                sessions = self.table.len(),
                "session connected"
            ),
            Err(e) => warn!(peer = %peer, error = %e, "could not place session"),
        }
    }

    fn on_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Data { slot, bytes } => self.on_data(slot, &bytes),
            Inbound::Closed { slot, error: None } => self.close(slot, CloseReason::PeerClosed),
            Inbound::Closed {
                slot,
                error: Some(e),
            } => {
                warn!(slot = slot.index(), error = %e, "session read failed");
                self.close(slot, CloseReason::ReadError);
            }
        }
    }

    fn on_data(&mut self, slot: SlotId, bytes: &[u8]) {
        let Some(conn) = self.table.get_mut(slot) else {
            trace!(slot = %slot, "discarding bytes for a freed slot");
            return;
        };

        conn.codec.feed(bytes);

        let mut out = Vec::new();
        let mut close = None;
        loop {
            match conn.codec.decode() {
                Ok(Some(decoded)) => {
                    let Outcome {
                        response,
                        notification,
                        close: close_after,
                    } = dispatch(decoded, &mut conn.session);

                    if let Some(response) = response {
                        out.extend_from_slice(&response.encode());
                    }
                    if let Some(notification) = notification {
                        notify(&self.handlers, notification);
                    }
                    if close_after {
                        close = Some(CloseReason::Requested);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        peer = %conn.session.peer(),
                        slot = slot.index(),
                        error = %e,
                        "malformed input, disconnecting"
                    );
                    close = Some(CloseReason::Malformed);
                    break;
                }
            }
        }

        if !out.is_empty() && !conn.send(out) {
            warn!(
                peer = %conn.session.peer(),
                slot = slot.index(),
                queued = WRITER_QUEUE_CAPACITY,
                "peer is not reading responses, disconnecting"
            );
            close = Some(CloseReason::Backpressure);
        }

        if let Some(reason) = close {
            self.close(slot, reason);
        } else {
            self.refresh_recording();
        }
    }

    /// Free a slot; queued responses are still flushed by its writer
    ///
    /// A stalled writer is aborted instead, since it would never finish.
    fn close(&mut self, slot: SlotId, reason: CloseReason) {
        let Some(mut conn) = self.table.remove(slot) else {
            return;
        };

        if reason == CloseReason::Backpressure {
            if let Some(writer) = conn.writer_task.take() {
                writer.abort();
            }
        }

        if conn.session.state().is_recording() {
            self.handlers.playback(|p| p.stop());
        }

        info!(
            peer = %conn.session.peer(),
            slot = slot.index(),
            state = %conn.session.state(),
            reason = ?reason,
            sessions = self.table.len(),
            "session closed"
        );

        // Dropping the sender lets the writer flush and shut down
        drop(conn);
        self.refresh_recording();
    }

    fn housekeeping(&mut self, now: Instant) {
        let mut idle = Vec::new();

        for (id, conn) in self.table.iter_mut() {
            conn.session.expire_challenge(now);
            let timeout = if conn.session.state().is_recording() {
                self.config.recording_timeout
            } else {
                self.config.session_timeout
            };
            if !timeout.is_zero() && conn.session.idle_at(now) >= timeout {
                idle.push(id);
            }
        }

        for id in idle {
            self.close(id, CloseReason::IdleTimeout);
        }
    }

    fn refresh_recording(&self) {
        let count = self
            .table
            .iter()
            .filter(|(_, conn)| conn.session.state().is_recording())
            .count();
        self.recording.store(count, Ordering::Release);
    }

    /// Close every session and release the listener
    ///
    /// Returns once every writer has flushed, or the drain timeout passed.
    pub async fn shutdown(mut self) {
        let mut writers = Vec::new();
        for mut conn in self.table.drain() {
            if conn.session.state().is_recording() {
                self.handlers.playback(|p| p.stop());
            }
            debug!(
                peer = %conn.session.peer(),
                reason = ?CloseReason::Shutdown,
                "session closed"
            );
            writers.extend(conn.writer_task.take());
        }

        self.recording.store(0, Ordering::Release);
        // Releases the listening socket
        drop(self);

        for mut writer in writers {
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
                .await
                .is_err()
            {
                writer.abort();
            }
        }
    }
}

fn notify(handlers: &HandlerRegistry, notification: Notification) {
    match notification {
        Notification::Play => handlers.playback(|p| p.play()),
        Notification::Pause => handlers.playback(|p| p.pause()),
        Notification::Flush => handlers.playback(|p| p.flush()),
        Notification::Stop => handlers.playback(|p| p.stop()),
        Notification::Volume(linear) => handlers.volume(linear),
    }
}

async fn read_loop(mut reader: OwnedReadHalf, slot: SlotId, tx: mpsc::Sender<Inbound>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => Inbound::Closed { slot, error: None },
            Ok(n) => Inbound::Data {
                slot,
                bytes: Bytes::copy_from_slice(&buf[..n]),
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Inbound::Closed {
                slot,
                error: Some(e),
            },
        };

        let done = matches!(event, Inbound::Closed { .. });
        if tx.send(event).await.is_err() || done {
            return;
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Bytes>,
    peer: SocketAddr,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            debug!(peer = %peer, error = %e, "write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("sessions", &self.table.len())
            .field("capacity", &self.table.capacity())
            .finish_non_exhaustive()
    }
}
