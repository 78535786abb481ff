//! `mdns-sd` backend and the background advertisement task

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{DaemonEvent, DnsNameChange, RRType, Receiver, ServiceDaemon, ServiceInfo};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::AdvertiserError;
use super::advertiser::{
    Advertiser, AdvertiserState, RegistryEvent, ServiceRecord, ServiceRegistry,
};

/// How long one advertiser iteration waits for a daemon event
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// [`ServiceRegistry`] over an `mdns-sd` daemon
pub struct MdnsRegistry {
    daemon: ServiceDaemon,
    monitor: Receiver<DaemonEvent>,
    hostname: String,
    fullname: Option<String>,
    interfaces: HashSet<IpAddr>,
    pending: VecDeque<RegistryEvent>,
    monitor_lost: bool,
}

impl MdnsRegistry {
    /// Start a daemon and subscribe to its events
    ///
    /// The daemon is running once this returns, so the first event reported
    /// is [`RegistryEvent::ClientRunning`].
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be created.
    pub fn new() -> Result<Self, AdvertiserError> {
        let daemon = ServiceDaemon::new()?;
        let monitor = daemon.monitor()?;

        Ok(Self {
            daemon,
            monitor,
            hostname: Self::get_hostname(),
            fullname: None,
            interfaces: HashSet::new(),
            pending: VecDeque::from([RegistryEvent::ClientRunning]),
            monitor_lost: false,
        })
    }

    /// Host name records are published under
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn get_hostname() -> String {
        hostname::get().map_or_else(
            |_| "airplay-receiver.local.".to_string(),
            |s| format!("{}.local.", s.to_string_lossy()),
        )
    }

    fn translate(&mut self, event: DaemonEvent) -> Option<RegistryEvent> {
        match event {
            DaemonEvent::Announce(fullname, addrs) => {
                tracing::trace!(fullname = %fullname, addrs = %addrs, "mDNS announce");
                (self.fullname.as_deref() == Some(fullname.as_str()))
                    .then_some(RegistryEvent::Established)
            }
            DaemonEvent::Error(e) => Some(RegistryEvent::Failed(e.to_string())),
            DaemonEvent::IpAdd(addr) => {
                let was_empty = self.interfaces.is_empty();
                self.interfaces.insert(addr);
                was_empty.then_some(RegistryEvent::ClientRunning)
            }
            DaemonEvent::IpDel(addr) => {
                self.interfaces.remove(&addr);
                self.interfaces
                    .is_empty()
                    .then_some(RegistryEvent::ClientDisconnected)
            }
            DaemonEvent::NameChange(change) => name_change_event(&change, self.fullname.as_deref()),
            _ => None,
        }
    }
}

/// Map a daemon rename onto the advertiser's collision event
///
/// Only instance records (SRV, TXT) of the record currently published count.
/// Host name conflicts are resolved by the daemon alone, and the rest of a
/// burst for an already withdrawn name no longer matches `published`.
pub(crate) fn name_change_event(
    change: &DnsNameChange,
    published: Option<&str>,
) -> Option<RegistryEvent> {
    if !matches!(change.rr_type, RRType::SRV | RRType::TXT) {
        tracing::debug!(
            original = %change.original,
            new_name = %change.new_name,
            rr_type = ?change.rr_type,
            "mDNS host name changed"
        );
        return None;
    }
    if published != Some(change.original.as_str()) {
        tracing::trace!(original = %change.original, "ignoring rename of a stale record");
        return None;
    }

    tracing::debug!(
        original = %change.original,
        new_name = %change.new_name,
        intf = %change.intf_name,
        "mDNS instance name conflict"
    );
    Some(RegistryEvent::NameCollision)
}

impl ServiceRegistry for MdnsRegistry {
    fn publish(&mut self, record: &ServiceRecord) -> Result<(), AdvertiserError> {
        self.withdraw()?;

        let properties: HashMap<String, String> = record
            .txt
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let service_info = ServiceInfo::new(
            &record.service_type,
            &record.name,
            &self.hostname,
            "",
            record.port,
            properties,
        )?
        .enable_addr_auto();

        let fullname = service_info.get_fullname().to_string();
        self.daemon.register(service_info)?;

        tracing::info!(
            name = %record.name,
            fullname = %fullname,
            port = record.port,
            "mDNS service registered"
        );
        self.fullname = Some(fullname);
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), AdvertiserError> {
        if let Some(fullname) = self.fullname.take() {
            self.daemon.unregister(&fullname)?;
            tracing::info!(fullname = %fullname, "mDNS service unregistered");
        }
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<RegistryEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.monitor_lost {
            std::thread::sleep(timeout);
            return None;
        }

        match self.monitor.recv_timeout(timeout) {
            Ok(event) => self.translate(event),
            Err(_) if self.monitor.is_disconnected() => {
                self.monitor_lost = true;
                Some(RegistryEvent::ClientDisconnected)
            }
            Err(_) => None,
        }
    }
}

impl Drop for MdnsRegistry {
    fn drop(&mut self) {
        let _ = self.withdraw();
        let _ = self.daemon.shutdown();
    }
}

impl std::fmt::Debug for MdnsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsRegistry")
            .field("hostname", &self.hostname)
            .field("fullname", &self.fullname)
            .field("interfaces", &self.interfaces.len())
            .finish_non_exhaustive()
    }
}

/// Snapshot published by the advertisement task
#[derive(Debug, Clone, PartialEq, Eq)]
struct Status {
    state: AdvertiserState,
    name: String,
}

/// Advertisement running on a blocking task
///
/// Dropping the handle stops the task; [`shutdown`](Self::shutdown) also
/// waits for the record to be withdrawn.
#[derive(Debug)]
pub struct AdvertiserHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    status: watch::Receiver<Status>,
    task: Option<JoinHandle<()>>,
}

impl AdvertiserHandle {
    /// Create the daemon and start advertising `record`
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the mDNS daemon cannot be created.
    pub fn start(record: ServiceRecord) -> Result<Self, AdvertiserError> {
        let registry = MdnsRegistry::new()?;
        let advertiser = Advertiser::new(registry, record);
        let (status_tx, status) = watch::channel(Status {
            state: advertiser.state(),
            name: advertiser.current_name().to_string(),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::task::spawn_blocking(move || run(advertiser, shutdown_rx, &status_tx));

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            status,
            task: Some(task),
        })
    }

    /// Current advertisement state
    #[must_use]
    pub fn state(&self) -> AdvertiserState {
        self.status.borrow().state
    }

    /// Name currently advertised
    #[must_use]
    pub fn current_name(&self) -> String {
        self.status.borrow().name.clone()
    }

    /// Withdraw the record and wait for the task to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                let error = AdvertiserError::Join(e.to_string());
                tracing::warn!(error = %error, "advertiser task ended abnormally");
            }
        }
    }
}

fn run<R: ServiceRegistry>(
    mut advertiser: Advertiser<R>,
    mut shutdown: oneshot::Receiver<()>,
    status: &watch::Sender<Status>,
) {
    tracing::debug!(name = %advertiser.current_name(), "advertiser task started");

    // Sender dropped or signalled: either way, stop
    while let Err(oneshot::error::TryRecvError::Empty) = shutdown.try_recv() {
        advertiser.poll(EVENT_POLL_INTERVAL);
        status.send_if_modified(|current| {
            let next = Status {
                state: advertiser.state(),
                name: advertiser.current_name().to_string(),
            };
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    advertiser.shutdown();
    tracing::debug!("advertiser task stopped");
}
