//! Own-state monitor integration tests
//!
//! Drives the polling loop with a scripted sampler and checks that events
//! are emitted exactly on state transitions, that unpausing forces a
//! re-emission, and that shutdown is clean.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use nodeman::events::{EventPublisher, ManagerEvent};
use nodeman::{ManagerConfig, OwnStateMonitor, ReporterIdentity, StateSampler, StateSnapshot};

/// Replays a fixed snapshot sequence, then repeats the last one forever
struct ScriptedSampler {
    sequence: Vec<StateSnapshot>,
    index: usize,
}

impl ScriptedSampler {
    fn new(sequence: Vec<StateSnapshot>) -> Self {
        ScriptedSampler { sequence, index: 0 }
    }
}

impl StateSampler for ScriptedSampler {
    fn sample(&mut self) -> nodeman::Result<StateSnapshot> {
        let snapshot = self.sequence[self.index.min(self.sequence.len() - 1)].clone();
        self.index += 1;
        Ok(snapshot)
    }
}

fn snapshot(fingerprint: u64) -> StateSnapshot {
    StateSnapshot {
        timestamp: Utc.timestamp_opt(1_700_000_000 + fingerprint as i64, 0).unwrap(),
        fingerprint,
    }
}

fn fast_config() -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.base_poll_hz = 50.0;
    config.min_poll_hz = 1.0;
    config
}

fn identity() -> ReporterIdentity {
    ReporterIdentity {
        host: "robot1".to_string(),
        registry_uri: "http://robot1:11311/".to_string(),
        reporter: "/node_manager".to_string(),
        monitor_uri: "http://robot1:22622".to_string(),
    }
}

fn expect_state(subscriber: &nodeman::EventSubscriber) -> nodeman::MasterState {
    match subscriber.recv_timeout(Duration::from_secs(2)) {
        Some(ManagerEvent::MasterState(state)) => state,
        other => panic!("expected a state event, got {:?}", other),
    }
}

#[test]
fn test_repeated_samples_emit_once_per_transition() {
    let (publisher, subscriber) = EventPublisher::unbounded();
    let monitor = OwnStateMonitor::new(&fast_config(), identity(), publisher);
    let sampler = ScriptedSampler::new(vec![
        snapshot(1),
        snapshot(1),
        snapshot(2),
        snapshot(2),
    ]);
    let handle = monitor.spawn(Box::new(sampler));

    let first = expect_state(&subscriber);
    assert_eq!(first.host, "robot1");
    assert!(first.online);

    let second = expect_state(&subscriber);
    assert!(second.timestamp > first.timestamp);

    // The repeated samples produce nothing further
    assert!(subscriber.recv_timeout(Duration::from_millis(300)).is_none());
    handle.shutdown();
}

#[test]
fn test_unpausing_forces_a_re_emission() {
    let (publisher, subscriber) = EventPublisher::unbounded();
    let monitor = OwnStateMonitor::new(&fast_config(), identity(), publisher);
    let sampler = ScriptedSampler::new(vec![snapshot(7)]);
    let handle = monitor.spawn(Box::new(sampler));

    expect_state(&subscriber);
    assert!(subscriber.recv_timeout(Duration::from_millis(200)).is_none());

    handle.pause(true);
    assert!(handle.is_paused());
    // Paused: checks are skipped entirely
    assert!(subscriber.recv_timeout(Duration::from_millis(200)).is_none());

    handle.pause(false);
    // The reset guarantees at least one event for the unchanged state
    expect_state(&subscriber);
    handle.shutdown();
}

#[test]
fn test_emission_after_subscriber_dropped_is_a_noop() {
    let (publisher, subscriber) = EventPublisher::unbounded();
    let monitor = OwnStateMonitor::new(&fast_config(), identity(), publisher);
    let handle = monitor.spawn(Box::new(ScriptedSampler::new(vec![
        snapshot(1),
        snapshot(2),
        snapshot(3),
    ])));

    drop(subscriber);
    std::thread::sleep(Duration::from_millis(200));
    // The loop survived emitting into the void
    handle.shutdown();
}
