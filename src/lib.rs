/*!
 * nodeman - distributed node launch and coordination core
 *
 * Starts, monitors and stops the nodes of a distributed robot
 * configuration across an arbitrary number of hosts:
 * - Connection-caching remote execution with interactive credential retry
 * - Launch resolution from a declarative node/parameter description
 * - Idempotent bulk parameter registration against remote registries
 * - Adaptive own-state monitoring and discovery event forwarding
 *
 * All outputs toward presentation layers are plain data events; nothing in
 * the core depends on a UI framework.
 */

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod host;
pub mod launch;
pub mod logging;
pub mod monitor;
pub mod remote;
pub mod screen;
pub mod session;

// Re-export commonly used types
pub use config::{LogLevel, ManagerConfig};
pub use discovery::{DiscoveryListener, DiscoveryService, MasterListOutcome, ServiceFinder};
pub use error::{Error, Result};
pub use events::{DiscoveredMaster, EventPublisher, EventSubscriber, ManagerEvent, MasterState};
pub use launch::{LaunchConfig, LaunchResult, NodeDescriptor, NodeLauncher, ParamRegistrar};
pub use monitor::{OwnStateMonitor, ReporterIdentity, StateSampler, StateSnapshot};
pub use remote::{RemoteCommand, RemoteExecutor};
pub use session::{CredentialPrompt, SessionPool};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
