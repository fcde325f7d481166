/*!
 * Discovery service listener
 *
 * Connects to whatever transports the discovery services of a registry
 * endpoint advertise: a one-shot request for the current master list, and
 * push channels for continuous state and link-statistics updates. Received
 * data is republished on the manager event channel. Re-subscribing to a
 * channel kind replaces the previous subscription, so listeners never
 * accumulate.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{info, warn};

use crate::error::Result;
use crate::events::{DiscoveredMaster, EventPublisher, LinkState, ManagerEvent, MasterState};

/// One reachable discovery service
pub trait DiscoveryService: Send + Sync {
    /// One-shot call returning the currently discovered masters
    fn list_masters(&self) -> Result<Vec<DiscoveredMaster>>;

    /// Open the push channel of master state events
    fn subscribe_states(&self) -> Result<Receiver<MasterState>>;

    /// Open the push channel of link statistics
    fn subscribe_links(&self) -> Result<Receiver<Vec<LinkState>>>;
}

/// Locates the discovery services advertised for a registry endpoint.
/// `wait` blocks until at least one service appears.
pub trait ServiceFinder: Send + Sync {
    fn find(&self, registry_uri: &str, wait: bool) -> Vec<Arc<dyn DiscoveryService>>;
}

/// Outcome of a one-shot master-list retrieval. An empty retrieved list is
/// distinct from not reaching any service.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterListOutcome {
    Retrieved(Vec<DiscoveredMaster>),
    ServiceNotFound,
    CallFailed(String),
}

/// A running push-channel subscription; dropping it stops the forwarders
struct Subscription {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Subscription {
    fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

/// Forwards discovery data to the manager event channel
pub struct DiscoveryListener {
    finder: Arc<dyn ServiceFinder>,
    publisher: EventPublisher,
    state_sub: Mutex<Option<Subscription>>,
    stats_sub: Mutex<Option<Subscription>>,
}

impl DiscoveryListener {
    pub fn new(finder: Arc<dyn ServiceFinder>, publisher: EventPublisher) -> Self {
        DiscoveryListener {
            finder,
            publisher,
            state_sub: Mutex::new(None),
            stats_sub: Mutex::new(None),
        }
    }

    /// Ask the discovery services of `registry_uri` for their master lists.
    ///
    /// Results and failures are also published as events. The returned
    /// outcome distinguishes "no service reachable" from a service that
    /// answered with an empty list.
    pub fn retrieve_master_list(&self, registry_uri: &str, wait: bool) -> MasterListOutcome {
        let services = self.finder.find(registry_uri, wait);
        if services.is_empty() {
            let reason = "no discovery service found".to_string();
            self.publisher.publish(ManagerEvent::MasterListError {
                endpoint: registry_uri.to_string(),
                reason: reason.clone(),
            });
            return MasterListOutcome::ServiceNotFound;
        }

        let mut retrieved: Option<Vec<DiscoveredMaster>> = None;
        let mut last_error = String::new();
        for service in services {
            match service.list_masters() {
                Ok(mut masters) => {
                    masters.sort_by(|a, b| a.name.cmp(&b.name));
                    info!(registry_uri, count = masters.len(), "master list retrieved");
                    self.publisher
                        .publish(ManagerEvent::MasterList(masters.clone()));
                    retrieved.get_or_insert_with(Vec::new).extend(masters);
                }
                Err(e) => {
                    warn!(registry_uri, error = %e, "master list call failed");
                    last_error = e.to_string();
                    self.publisher.publish(ManagerEvent::MasterListError {
                        endpoint: registry_uri.to_string(),
                        reason: last_error.clone(),
                    });
                }
            }
        }
        match retrieved {
            Some(masters) => MasterListOutcome::Retrieved(masters),
            None => MasterListOutcome::CallFailed(last_error),
        }
    }

    /// Subscribe to master state updates. Replaces any prior state
    /// subscription. Returns whether a service was found.
    pub fn listen_states(&self, registry_uri: &str, wait: bool) -> Result<bool> {
        let services = self.finder.find(registry_uri, wait);
        let mut subscription = Subscription {
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        };
        let found = !services.is_empty();
        for service in services {
            let rx = service.subscribe_states()?;
            subscription.threads.push(forward(
                rx,
                subscription.stop.clone(),
                self.publisher.clone(),
                ManagerEvent::MasterState,
            ));
        }
        self.replace(&self.state_sub, subscription);
        Ok(found)
    }

    /// Subscribe to link statistics. Replaces any prior stats subscription.
    pub fn listen_stats(&self, registry_uri: &str, wait: bool) -> Result<bool> {
        let services = self.finder.find(registry_uri, wait);
        let mut subscription = Subscription {
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        };
        let found = !services.is_empty();
        for service in services {
            let rx = service.subscribe_links()?;
            subscription.threads.push(forward(
                rx,
                subscription.stop.clone(),
                self.publisher.clone(),
                ManagerEvent::LinkStats,
            ));
        }
        self.replace(&self.stats_sub, subscription);
        Ok(found)
    }

    /// Stop the state subscription, if one is running
    pub fn stop_states(&self) {
        if let Some(old) = self.state_sub.lock().expect("subscription poisoned").take() {
            old.stop();
        }
    }

    /// Stop the stats subscription, if one is running
    pub fn stop_stats(&self) {
        if let Some(old) = self.stats_sub.lock().expect("subscription poisoned").take() {
            old.stop();
        }
    }

    fn replace(&self, slot: &Mutex<Option<Subscription>>, new: Subscription) {
        let old = slot
            .lock()
            .expect("subscription poisoned")
            .replace(new);
        if let Some(old) = old {
            old.stop();
        }
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        self.stop_states();
        self.stop_stats();
    }
}

fn forward<T, F>(
    rx: Receiver<T>,
    stop: Arc<AtomicBool>,
    publisher: EventPublisher,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> ManagerEvent + Send + 'static,
{
    std::thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(msg) => publisher.publish(wrap(msg)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}
