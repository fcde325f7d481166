/*!
 * Launch data model and node start orchestration
 *
 * The data model mirrors what the external launch-description parser
 * yields: an ordered set of node descriptors, a flat parameter table, the
 * namespaces to clear before re-registration, and the machine table. The
 * submodules resolve descriptors to concrete invocations, push parameters
 * to the registry, and spawn nodes locally or remotely.
 */

pub mod launcher;
pub mod registrar;
pub mod resolver;

pub use launcher::{AmbiguityResolver, FailOnAmbiguity, FirstMatch, NodeLauncher, PackageIndex};
pub use registrar::{CallStatus, ParamBatch, ParamRegistrar, ParamRegistry};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::process::Child;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Value stored in the parameter registry
pub type ParamValue = serde_json::Value;

/// One node of a launch description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node name without namespace
    pub name: String,

    /// Namespace the node runs in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Package containing the executable
    pub package: String,

    /// Executable type inside the package
    pub node_type: String,

    /// Declared command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Remap pairs (from, to)
    #[serde(default)]
    pub remap_args: Vec<(String, String)>,

    /// Environment variable pairs propagated to the node
    #[serde(default)]
    pub env_args: Vec<(String, String)>,

    /// Working directory of the node
    #[serde(default)]
    pub cwd: Option<String>,

    /// Prefix put in front of the executable (debugger, nice, ...)
    #[serde(default)]
    pub launch_prefix: Option<String>,

    /// Machine the node runs on; absent means the launch context's host
    #[serde(default)]
    pub machine_name: Option<String>,
}

fn default_namespace() -> String {
    "/".to_string()
}

impl NodeDescriptor {
    /// Fully qualified name, normalized to a single leading slash
    pub fn full_name(&self) -> String {
        let ns = self.namespace.trim_matches('/');
        if ns.is_empty() {
            format!("/{}", self.name)
        } else {
            format!("/{}/{}", ns, self.name)
        }
    }
}

/// A parsed launch description
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Host of the launch context; nodes without a machine run here
    #[serde(default)]
    pub host: String,

    /// Registry endpoint URI per host
    #[serde(default)]
    pub registries: HashMap<String, String>,

    /// Nodes of the configuration, in declaration order
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,

    /// Fully qualified parameter name to value
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,

    /// Parameter namespaces cleared before re-registration
    #[serde(default)]
    pub clear_params: Vec<String>,

    /// Machine name to host address
    #[serde(default)]
    pub machines: HashMap<String, String>,

    /// Registry endpoints whose global parameters are already pushed for
    /// this configuration load
    #[serde(skip)]
    globals_registered: Mutex<HashSet<String>>,
}

impl LaunchConfig {
    /// Create an empty configuration for the given launch-context host
    pub fn new(host: impl Into<String>) -> Self {
        LaunchConfig {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Load a launch description from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Registry endpoint for a host, if the configuration knows one
    pub fn registry_uri(&self, host: &str) -> Option<String> {
        self.registries.get(host).cloned()
    }

    /// Claim the global-parameter registration for an endpoint. Returns
    /// true exactly once per endpoint per configuration load.
    pub fn try_begin_globals(&self, endpoint: &str) -> bool {
        self.globals_registered
            .lock()
            .expect("globals marker poisoned")
            .insert(endpoint.to_string())
    }

    /// Release the claim after a failed registration so a later start can
    /// try again
    pub fn clear_globals_marker(&self, endpoint: &str) {
        self.globals_registered
            .lock()
            .expect("globals marker poisoned")
            .remove(endpoint);
    }

    /// Whether globals were pushed to an endpoint already
    pub fn globals_registered(&self, endpoint: &str) -> bool {
        self.globals_registered
            .lock()
            .expect("globals marker poisoned")
            .contains(endpoint)
    }
}

/// Outcome of a successful node start
#[derive(Debug)]
pub enum LaunchResult {
    /// Node spawned locally, detached process handle
    Local { child: Child },

    /// Node started remotely; captured stdout is informational only
    Remote { output: String },
}
