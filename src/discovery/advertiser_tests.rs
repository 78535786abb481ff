use super::advertiser::*;
use super::{AIRPLAY_SERVICE_TYPE, AdvertiserError, SOURCE_VERSION};
use crate::types::ServerConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Scripted registry: replays queued events and records publications
#[derive(Debug, Default)]
struct FakeRegistry {
    events: VecDeque<RegistryEvent>,
    published: Vec<String>,
    withdrawals: usize,
    live: Option<String>,
    refuse_publish: bool,
}

impl ServiceRegistry for FakeRegistry {
    fn publish(&mut self, record: &ServiceRecord) -> Result<(), AdvertiserError> {
        if self.refuse_publish {
            return Err(AdvertiserError::Join("refused".into()));
        }
        self.published.push(record.name.clone());
        self.live = Some(record.name.clone());
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), AdvertiserError> {
        if self.live.take().is_some() {
            self.withdrawals += 1;
        }
        Ok(())
    }

    fn poll_event(&mut self, _timeout: Duration) -> Option<RegistryEvent> {
        self.events.pop_front()
    }
}

fn kitchen() -> ServiceRecord {
    ServiceRecord::from_config(&ServerConfig::with_name("Kitchen"), 7000)
}

fn running(record: ServiceRecord) -> Advertiser<FakeRegistry> {
    let mut advertiser = Advertiser::new(FakeRegistry::default(), record);
    advertiser.handle_event(RegistryEvent::ClientRunning, Instant::now());
    advertiser
}

#[test]
fn test_record_from_config() {
    let config = ServerConfig::with_name("Kitchen")
        .model_name("Speaker")
        .device_id("AA:BB");
    let record = ServiceRecord::from_config(&config, 7001);

    assert_eq!(record.name, "Kitchen");
    assert_eq!(record.service_type, AIRPLAY_SERVICE_TYPE);
    assert_eq!(record.port, 7001);
    assert_eq!(record.txt.get("deviceid").map(String::as_str), Some("AA:BB"));
    assert_eq!(record.txt.get("model").map(String::as_str), Some("Speaker"));
    assert_eq!(
        record.txt.get("srcvers").map(String::as_str),
        Some(SOURCE_VERSION)
    );
    assert!(!record.txt.contains_key("gid"));

    let grouped = ServiceRecord::from_config(&config.multiroom("upstairs"), 7001);
    assert_eq!(grouped.txt.get("gid").map(String::as_str), Some("upstairs"));
}

#[test]
fn test_disambiguate() {
    assert_eq!(disambiguate("Kitchen", 1), "Kitchen");
    assert_eq!(disambiguate("Kitchen", 2), "Kitchen (2)");
    assert_eq!(disambiguate("Kitchen", 10), "Kitchen (10)");
}

#[test]
fn test_waits_for_running_client() {
    let mut advertiser = Advertiser::new(FakeRegistry::default(), kitchen());
    assert_eq!(advertiser.state(), AdvertiserState::Unpublished);

    advertiser.tick(Instant::now());
    assert!(advertiser.registry().published.is_empty());

    advertiser.handle_event(RegistryEvent::ClientRunning, Instant::now());
    assert_eq!(advertiser.state(), AdvertiserState::Publishing);
    assert_eq!(advertiser.registry().published, vec!["Kitchen"]);

    advertiser.handle_event(RegistryEvent::Established, Instant::now());
    assert_eq!(advertiser.state(), AdvertiserState::Established);
}

#[test]
fn test_collision_republishes_under_new_name() {
    let mut advertiser = running(kitchen());
    advertiser.handle_event(RegistryEvent::Established, Instant::now());

    advertiser.handle_event(RegistryEvent::NameCollision, Instant::now());
    assert_eq!(advertiser.state(), AdvertiserState::Colliding);
    assert_eq!(advertiser.current_name(), "Kitchen (2)");
    assert_eq!(advertiser.registry().withdrawals, 1);

    advertiser.tick(Instant::now());
    assert_eq!(advertiser.state(), AdvertiserState::Publishing);
    assert_eq!(
        advertiser.registry().published,
        vec!["Kitchen", "Kitchen (2)"]
    );

    advertiser.handle_event(RegistryEvent::NameCollision, Instant::now());
    advertiser.tick(Instant::now());
    advertiser.handle_event(RegistryEvent::Established, Instant::now());
    assert_eq!(advertiser.current_name(), "Kitchen (3)");
    assert_eq!(advertiser.state(), AdvertiserState::Established);
}

#[test]
fn test_poll_drives_scripted_collision() {
    let mut registry = FakeRegistry::default();
    registry.events.extend([
        RegistryEvent::ClientRunning,
        RegistryEvent::NameCollision,
        RegistryEvent::Established,
    ]);
    let mut advertiser = Advertiser::new(registry, kitchen());

    for _ in 0..3 {
        advertiser.poll(Duration::ZERO);
    }

    assert_eq!(advertiser.state(), AdvertiserState::Established);
    assert_eq!(advertiser.current_name(), "Kitchen (2)");
    assert_eq!(
        advertiser.registry().live.as_deref(),
        Some("Kitchen (2)")
    );
}

#[test]
fn test_failure_backs_off_then_retries() {
    let start = Instant::now();
    let mut advertiser = running(kitchen());

    advertiser.handle_event(RegistryEvent::Failed("socket error".into()), start);
    assert_eq!(advertiser.state(), AdvertiserState::Failed);
    assert!(advertiser.registry().live.is_none());
    assert_eq!(advertiser.retry_at(), Some(start + INITIAL_BACKOFF));

    advertiser.tick(start + INITIAL_BACKOFF / 2);
    assert_eq!(advertiser.state(), AdvertiserState::Failed);

    advertiser.tick(start + INITIAL_BACKOFF);
    assert_eq!(advertiser.state(), AdvertiserState::Publishing);
    assert_eq!(advertiser.registry().published.len(), 2);
}

#[test]
fn test_backoff_doubles_to_cap() {
    let mut now = Instant::now();
    let mut advertiser = Advertiser::new(
        FakeRegistry {
            refuse_publish: true,
            ..FakeRegistry::default()
        },
        kitchen(),
    );
    advertiser.handle_event(RegistryEvent::ClientRunning, now);
    assert_eq!(advertiser.state(), AdvertiserState::Failed);

    let mut expected = INITIAL_BACKOFF;
    for _ in 0..8 {
        let retry_at = advertiser.retry_at().unwrap();
        assert_eq!(retry_at - now, expected);
        now = retry_at;
        advertiser.tick(now);
        expected = (expected * 2).min(MAX_BACKOFF);
    }
    assert_eq!(advertiser.retry_at().unwrap() - now, MAX_BACKOFF);

    // A client restart clears the pending retry
    advertiser.handle_event(RegistryEvent::ClientDisconnected, now);
    assert_eq!(advertiser.state(), AdvertiserState::Unpublished);
    assert!(advertiser.retry_at().is_none());
}

#[test]
fn test_established_resets_backoff() {
    let now = Instant::now();
    let mut advertiser = running(kitchen());
    advertiser.handle_event(RegistryEvent::Failed("one".into()), now);
    advertiser.tick(now + INITIAL_BACKOFF);
    advertiser.handle_event(RegistryEvent::Failed("two".into()), now + INITIAL_BACKOFF);
    assert_eq!(
        advertiser.retry_at(),
        Some(now + INITIAL_BACKOFF + INITIAL_BACKOFF * 2)
    );

    let later = now + Duration::from_secs(10);
    advertiser.tick(later);
    advertiser.handle_event(RegistryEvent::Established, later);
    advertiser.handle_event(RegistryEvent::Failed("three".into()), later);
    assert_eq!(advertiser.retry_at(), Some(later + INITIAL_BACKOFF));
}

#[test]
fn test_republishes_after_client_restart() {
    let now = Instant::now();
    let mut advertiser = running(kitchen());
    advertiser.handle_event(RegistryEvent::Established, now);

    advertiser.handle_event(RegistryEvent::ClientDisconnected, now);
    assert_eq!(advertiser.state(), AdvertiserState::Unpublished);
    assert!(advertiser.registry().live.is_none());

    // Nothing happens while the client is down
    advertiser.tick(now + MAX_BACKOFF);
    assert_eq!(advertiser.registry().published.len(), 1);

    advertiser.handle_event(RegistryEvent::ClientRunning, now);
    assert_eq!(advertiser.state(), AdvertiserState::Publishing);
    assert_eq!(advertiser.registry().published, vec!["Kitchen", "Kitchen"]);
}

#[test]
fn test_events_ignored_out_of_state() {
    let now = Instant::now();
    let mut advertiser = Advertiser::new(FakeRegistry::default(), kitchen());

    advertiser.handle_event(RegistryEvent::Established, now);
    advertiser.handle_event(RegistryEvent::NameCollision, now);
    advertiser.handle_event(RegistryEvent::Failed("early".into()), now);
    assert_eq!(advertiser.state(), AdvertiserState::Unpublished);
    assert_eq!(advertiser.current_name(), "Kitchen");
}

#[test]
fn test_shutdown_withdraws() {
    let mut advertiser = running(kitchen());
    advertiser.handle_event(RegistryEvent::Established, Instant::now());

    advertiser.shutdown();
    assert_eq!(advertiser.state(), AdvertiserState::Unpublished);
    assert!(advertiser.registry().live.is_none());
    assert_eq!(advertiser.registry().withdrawals, 1);

    advertiser.shutdown();
    assert_eq!(advertiser.registry().withdrawals, 1);
}
