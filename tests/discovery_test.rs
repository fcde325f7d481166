//! Discovery listener integration tests
//!
//! Uses in-process fake discovery services to verify the one-shot master
//! list outcomes and the replace-on-resubscribe behavior of the push
//! channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use nodeman::events::{DiscoveredMaster, EventPublisher, LinkState, ManagerEvent, MasterState};
use nodeman::{DiscoveryListener, DiscoveryService, Error, MasterListOutcome, ServiceFinder};

fn master(name: &str) -> DiscoveredMaster {
    DiscoveredMaster {
        name: name.to_string(),
        uri: format!("http://{}:11311/", name),
        timestamp: Utc::now(),
        online: true,
        discoverer: "/master_discovery".to_string(),
        monitor_uri: format!("http://{}:11611", name),
        quality: Some(100.0),
    }
}

/// Discovery service fed from the test: scripted list answers plus
/// hand-held push channels
struct FakeService {
    masters: Option<Vec<DiscoveredMaster>>,
    state_tx: Sender<MasterState>,
    state_rx: Receiver<MasterState>,
    links_rx: Receiver<Vec<LinkState>>,
}

impl FakeService {
    fn new(masters: Option<Vec<DiscoveredMaster>>) -> Arc<Self> {
        let (state_tx, state_rx) = unbounded();
        let (_links_tx, links_rx) = unbounded();
        Arc::new(FakeService {
            masters,
            state_tx,
            state_rx,
            links_rx,
        })
    }
}

impl DiscoveryService for FakeService {
    fn list_masters(&self) -> nodeman::Result<Vec<DiscoveredMaster>> {
        match &self.masters {
            Some(masters) => Ok(masters.clone()),
            None => Err(Error::Connect {
                host: "robot1".to_string(),
                message: "service unreachable".to_string(),
            }),
        }
    }

    fn subscribe_states(&self) -> nodeman::Result<Receiver<MasterState>> {
        Ok(self.state_rx.clone())
    }

    fn subscribe_links(&self) -> nodeman::Result<Receiver<Vec<LinkState>>> {
        Ok(self.links_rx.clone())
    }
}

/// Maps registry endpoints to their services
struct FakeFinder {
    services: HashMap<String, Vec<Arc<dyn DiscoveryService>>>,
}

impl ServiceFinder for FakeFinder {
    fn find(&self, registry_uri: &str, _wait: bool) -> Vec<Arc<dyn DiscoveryService>> {
        self.services.get(registry_uri).cloned().unwrap_or_default()
    }
}

fn listener_with(
    services: HashMap<String, Vec<Arc<dyn DiscoveryService>>>,
) -> (DiscoveryListener, nodeman::EventSubscriber) {
    let (publisher, subscriber) = EventPublisher::unbounded();
    (
        DiscoveryListener::new(Arc::new(FakeFinder { services }), publisher),
        subscriber,
    )
}

#[test]
fn test_no_service_is_distinct_from_empty_list() {
    let empty_service = FakeService::new(Some(Vec::new()));
    let mut services: HashMap<String, Vec<Arc<dyn DiscoveryService>>> = HashMap::new();
    services.insert(
        "http://robot1:11311/".to_string(),
        vec![empty_service as Arc<dyn DiscoveryService>],
    );
    let (listener, subscriber) = listener_with(services);

    // A reachable service with nothing discovered yet
    let outcome = listener.retrieve_master_list("http://robot1:11311/", false);
    assert_eq!(outcome, MasterListOutcome::Retrieved(Vec::new()));
    assert!(matches!(
        subscriber.try_recv(),
        Some(ManagerEvent::MasterList(masters)) if masters.is_empty()
    ));

    // No service at all
    let outcome = listener.retrieve_master_list("http://robot2:11311/", false);
    assert_eq!(outcome, MasterListOutcome::ServiceNotFound);
    assert!(matches!(
        subscriber.try_recv(),
        Some(ManagerEvent::MasterListError { .. })
    ));
}

#[test]
fn test_failed_call_surfaces_error_event() {
    let broken = FakeService::new(None);
    let mut services: HashMap<String, Vec<Arc<dyn DiscoveryService>>> = HashMap::new();
    services.insert(
        "http://robot1:11311/".to_string(),
        vec![broken as Arc<dyn DiscoveryService>],
    );
    let (listener, subscriber) = listener_with(services);

    let outcome = listener.retrieve_master_list("http://robot1:11311/", false);
    assert!(matches!(outcome, MasterListOutcome::CallFailed(_)));
    match subscriber.try_recv() {
        Some(ManagerEvent::MasterListError { endpoint, reason }) => {
            assert_eq!(endpoint, "http://robot1:11311/");
            assert!(reason.contains("service unreachable"));
        }
        other => panic!("expected an error event, got {:?}", other),
    }
}

#[test]
fn test_master_list_is_ordered_by_name() {
    let service = FakeService::new(Some(vec![master("zulu"), master("alpha"), master("mike")]));
    let mut services: HashMap<String, Vec<Arc<dyn DiscoveryService>>> = HashMap::new();
    services.insert(
        "http://robot1:11311/".to_string(),
        vec![service as Arc<dyn DiscoveryService>],
    );
    let (listener, _subscriber) = listener_with(services);

    match listener.retrieve_master_list("http://robot1:11311/", false) {
        MasterListOutcome::Retrieved(masters) => {
            let names: Vec<&str> = masters.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["alpha", "mike", "zulu"]);
        }
        other => panic!("expected a retrieved list, got {:?}", other),
    }
}

#[test]
fn test_resubscribe_replaces_previous_listener() {
    let service_a = FakeService::new(Some(Vec::new()));
    let service_b = FakeService::new(Some(Vec::new()));
    let mut services: HashMap<String, Vec<Arc<dyn DiscoveryService>>> = HashMap::new();
    services.insert(
        "http://robot-a:11311/".to_string(),
        vec![service_a.clone() as Arc<dyn DiscoveryService>],
    );
    services.insert(
        "http://robot-b:11311/".to_string(),
        vec![service_b.clone() as Arc<dyn DiscoveryService>],
    );
    let (listener, subscriber) = listener_with(services);

    assert!(listener.listen_states("http://robot-a:11311/", false).unwrap());
    // Replaces the subscription on robot-a
    assert!(listener.listen_states("http://robot-b:11311/", false).unwrap());

    let state = MasterState {
        host: "stale".to_string(),
        registry_uri: "http://robot-a:11311/".to_string(),
        timestamp: Utc::now(),
        online: true,
        reporter: "/master_discovery".to_string(),
        monitor_uri: "http://robot-a:11611".to_string(),
    };
    service_a.state_tx.send(state.clone()).unwrap();
    assert!(
        subscriber.recv_timeout(Duration::from_millis(300)).is_none(),
        "a replaced subscription must not forward events"
    );

    let fresh = MasterState {
        host: "robot-b".to_string(),
        ..state
    };
    service_b.state_tx.send(fresh).unwrap();
    match subscriber.recv_timeout(Duration::from_secs(2)) {
        Some(ManagerEvent::MasterState(received)) => assert_eq!(received.host, "robot-b"),
        other => panic!("expected the fresh state, got {:?}", other),
    }

    listener.stop_states();
}

#[test]
fn test_listen_states_reports_missing_service() {
    let (listener, _subscriber) = listener_with(HashMap::new());
    assert!(!listener.listen_states("http://robot1:11311/", false).unwrap());
}
