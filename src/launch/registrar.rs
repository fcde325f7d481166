/*!
 * Parameter registration against a remote registry
 *
 * Registration is a two-phase batched exchange: one batch deleting the
 * namespaces to clear, then a fresh batch setting every parameter. Batch
 * objects are not reusable across phases. Delete failures of single items
 * are logged and ignored (clearing a namespace that was never set is not an
 * error); any failed set fails the registration as a whole.
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{LaunchConfig, ParamValue};
use crate::error::{Error, Result};

/// Status of one call inside an executed batch; code 1 is success
#[derive(Debug, Clone)]
pub struct CallStatus {
    pub code: i32,
    pub message: String,
}

impl CallStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        CallStatus {
            code: 1,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 1
    }
}

/// One batched call against a registry endpoint. Enqueue operations, then
/// execute; execution consumes the batch.
pub trait ParamBatch {
    fn delete(&mut self, caller_id: &str, name: &str);
    fn set(&mut self, caller_id: &str, name: &str, value: &ParamValue);
    fn execute(self: Box<Self>) -> Result<Vec<CallStatus>>;
}

/// Access to parameter registries, addressed by endpoint URI
pub trait ParamRegistry: Send + Sync {
    fn open_batch(&self, endpoint: &str) -> Box<dyn ParamBatch>;
}

/// Pushes launch parameters to registry endpoints
pub struct ParamRegistrar {
    registry: Arc<dyn ParamRegistry>,
    caller_id: String,
}

impl ParamRegistrar {
    pub fn new(registry: Arc<dyn ParamRegistry>, caller_id: impl Into<String>) -> Self {
        ParamRegistrar {
            registry,
            caller_id: caller_id.into(),
        }
    }

    /// Delete `clear_namespaces`, then set `params`, on `endpoint`.
    ///
    /// Deletes that were applied are not rolled back when a later set
    /// fails; the registration reports [`Error::Registration`] and the
    /// launch that triggered it must not proceed.
    pub fn register(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, ParamValue>,
        clear_namespaces: &[String],
    ) -> Result<()> {
        if !clear_namespaces.is_empty() {
            let mut batch = self.registry.open_batch(endpoint);
            for ns in clear_namespaces {
                batch.delete(&self.caller_id, ns);
            }
            for status in batch.execute()? {
                if !status.is_success() {
                    debug!(endpoint, message = status.message, "parameter delete skipped");
                }
            }
        }

        if params.is_empty() {
            return Ok(());
        }

        // Fresh batch: batch objects are not reusable
        let mut batch = self.registry.open_batch(endpoint);
        for (name, value) in params {
            batch.set(&self.caller_id, name, value);
        }
        for status in batch.execute()? {
            if !status.is_success() {
                return Err(Error::Registration(format!(
                    "Failed to set parameter: {}",
                    status.message
                )));
            }
        }
        Ok(())
    }

    /// Push the configuration's global parameters to `endpoint`, at most
    /// once per endpoint per configuration load.
    pub fn register_globals_once(&self, endpoint: &str, config: &LaunchConfig) -> Result<()> {
        if !config.try_begin_globals(endpoint) {
            return Ok(());
        }
        let globals = global_params(config);
        info!(
            endpoint,
            count = globals.len(),
            "registering global parameters"
        );
        if let Err(e) = self.register(endpoint, &globals, &[]) {
            // Release the claim so a later start can retry
            config.clear_globals_marker(endpoint);
            warn!(endpoint, error = %e, "global parameter registration failed");
            return Err(e);
        }
        Ok(())
    }

    /// Push the parameter subset and clear-list scoped under a node name
    pub fn register_node_params(
        &self,
        endpoint: &str,
        config: &LaunchConfig,
        full_name: &str,
    ) -> Result<()> {
        let prefix = format!("{}/", full_name);
        let params: BTreeMap<String, ParamValue> = config
            .params
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let clear: Vec<String> = config
            .clear_params
            .iter()
            .filter(|ns| ns.starts_with(&prefix))
            .cloned()
            .collect();
        self.register(endpoint, &params, &clear)
    }
}

/// Parameters of a configuration not scoped under any node's resolved name
pub fn global_params(config: &LaunchConfig) -> BTreeMap<String, ParamValue> {
    let node_names: Vec<String> = config.nodes.iter().map(|n| n.full_name()).collect();
    config
        .params
        .iter()
        .filter(|(name, _)| !node_names.iter().any(|n| name.starts_with(n.as_str())))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
