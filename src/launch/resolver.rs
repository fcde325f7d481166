/*!
 * Node resolution
 *
 * Maps a node name to its descriptor in a launch configuration and derives
 * the pieces of a concrete invocation: the effective host, the launch
 * prefix, and the generated replacement arguments.
 */

use super::{LaunchConfig, NodeDescriptor};
use crate::error::{Error, Result};

/// Find the descriptor for a node name.
///
/// Identity is (basename, namespace) with leading and trailing slashes
/// stripped from both sides of the namespace comparison; the first match
/// wins. Matching is case-sensitive.
pub fn resolve<'a>(config: &'a LaunchConfig, name: &str) -> Result<&'a NodeDescriptor> {
    let (basename, namespace) = split_node_name(name);
    config
        .nodes
        .iter()
        .find(|n| n.name == basename && n.namespace.trim_matches('/') == namespace)
        .ok_or_else(|| Error::NotFound(format!("node '{}'", name)))
}

/// Host the node runs on: its machine's address if one is named, else the
/// launch context's host. Naming an unknown machine is an error.
pub fn effective_host(config: &LaunchConfig, node: &NodeDescriptor) -> Result<String> {
    match &node.machine_name {
        Some(machine) => config
            .machines
            .get(machine)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("machine '{}'", machine))),
        None => Ok(config.host.clone()),
    }
}

/// Launch prefix of the node. For an anticipated remote start the prefix is
/// quoted so a remote shell does not word-split it.
pub fn effective_prefix(node: &NodeDescriptor, remote: bool) -> String {
    match node.launch_prefix.as_deref() {
        None | Some("") => String::new(),
        Some(prefix) if remote => format!("\"{}\"", prefix),
        Some(prefix) => prefix.to_string(),
    }
}

/// Replacement arguments generated for a node: namespace, name, optional
/// working directory, then one `from:=to` per remap, in that order.
pub fn generated_args(node: &NodeDescriptor) -> Vec<String> {
    let mut args = vec![
        format!("__ns:={}", node.namespace),
        format!("__name:={}", node.name),
    ];
    if let Some(cwd) = &node.cwd {
        args.push(format!("__cwd:={}", cwd));
    }
    for (from, to) in &node.remap_args {
        args.push(format!("{}:={}", from, to));
    }
    args
}

fn split_node_name(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(idx) => (&name[idx + 1..], name[..idx].trim_matches('/')),
        None => (name, ""),
    }
}
