/*!
 * Events produced toward presentation layers
 *
 * Every emission is a full snapshot, never a delta. The publisher side is
 * cheap to clone and may be a no-op; send failures are ignored because the
 * subscriber may already be gone at shutdown.
 */

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// State snapshot of one coordination endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterState {
    /// Address of the host the state describes
    pub host: String,

    /// Registry endpoint URI on that host
    pub registry_uri: String,

    /// Timestamp of the last observed change
    pub timestamp: DateTime<Utc>,

    /// Whether the endpoint is reachable
    pub online: bool,

    /// Identity of the reporting component
    pub reporter: String,

    /// Monitoring endpoint of the reporter
    pub monitor_uri: String,
}

/// A master known to a discovery service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredMaster {
    pub name: String,
    pub uri: String,
    pub timestamp: DateTime<Utc>,
    pub online: bool,
    pub discoverer: String,
    pub monitor_uri: String,

    /// Link quality in percent (0-100), absent when unknown. Computed
    /// externally and carried through unchanged.
    pub quality: Option<f64>,
}

/// Link quality toward one master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    pub destination: String,
    pub quality: f64,
}

/// Events delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManagerEvent {
    /// A coordination endpoint changed state
    MasterState(MasterState),

    /// Result of a one-shot master-list call
    MasterList(Vec<DiscoveredMaster>),

    /// A one-shot master-list call reached no usable service
    MasterListError { endpoint: String, reason: String },

    /// Link statistics toward the discovered masters
    LinkStats(Vec<LinkState>),
}

/// Event publisher - sends events to the subscriber
#[derive(Clone)]
pub struct EventPublisher {
    sender: Option<Sender<ManagerEvent>>,
}

impl EventPublisher {
    /// Create a publisher with a bounded channel
    pub fn new(buffer_size: usize) -> (Self, EventSubscriber) {
        let (tx, rx) = bounded(buffer_size);
        (
            EventPublisher { sender: Some(tx) },
            EventSubscriber { receiver: rx },
        )
    }

    /// Create a publisher with an unbounded channel
    pub fn unbounded() -> (Self, EventSubscriber) {
        let (tx, rx) = unbounded();
        (
            EventPublisher { sender: Some(tx) },
            EventSubscriber { receiver: rx },
        )
    }

    /// Create a no-op publisher (for when nothing listens)
    pub fn noop() -> Self {
        EventPublisher { sender: None }
    }

    /// Publish an event
    pub fn publish(&self, event: ManagerEvent) {
        if let Some(ref tx) = self.sender {
            let _ = tx.send(event); // Ignore send errors (subscriber may have dropped)
        }
    }
}

/// Event subscriber - receives events
pub struct EventSubscriber {
    receiver: Receiver<ManagerEvent>,
}

impl EventSubscriber {
    /// Get the receiver for consuming events
    pub fn receiver(&self) -> &Receiver<ManagerEvent> {
        &self.receiver
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Option<ManagerEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv(&self) -> Option<ManagerEvent> {
        self.receiver.recv().ok()
    }

    /// Receive an event with a timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ManagerEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Create an iterator over events
    pub fn iter(&self) -> impl Iterator<Item = ManagerEvent> + '_ {
        self.receiver.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> MasterState {
        MasterState {
            host: "robot1".to_string(),
            registry_uri: "http://robot1:11311/".to_string(),
            timestamp: Utc::now(),
            online: true,
            reporter: "/node_manager".to_string(),
            monitor_uri: "http://robot1:22622".to_string(),
        }
    }

    #[test]
    fn test_publish_and_receive() {
        let (publisher, subscriber) = EventPublisher::new(10);
        publisher.publish(ManagerEvent::MasterState(sample_state()));

        match subscriber.try_recv() {
            Some(ManagerEvent::MasterState(state)) => {
                assert_eq!(state.host, "robot1");
                assert!(state.online);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_noop_publisher_drops_events() {
        let publisher = EventPublisher::noop();
        publisher.publish(ManagerEvent::MasterList(Vec::new()));
    }

    #[test]
    fn test_publish_after_subscriber_dropped_is_harmless() {
        let (publisher, subscriber) = EventPublisher::unbounded();
        drop(subscriber);
        publisher.publish(ManagerEvent::MasterState(sample_state()));
    }
}
