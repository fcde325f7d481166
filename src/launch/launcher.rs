/*!
 * Node start, kill and log handling on local and remote hosts
 *
 * A launch request resolves the node, registers its parameters, then
 * branches on host locality: local nodes are spawned as detached processes
 * wrapped in a screen session, remote nodes are bootstrapped through the
 * starter entry point over the remote executor. Kill and log operations
 * branch the same way.
 */

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::resolver;
use super::{LaunchConfig, LaunchResult, NodeDescriptor, ParamRegistrar};
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::host;
use crate::remote::{spawn_detached, terminal_command, RemoteExecutor};
use crate::screen::ScreenLayout;

/// Selection policy when a package holds several executables of the same
/// name. A GUI may plug in a picker dialog; headless contexts use a
/// deterministic policy.
pub trait AmbiguityResolver: Send + Sync {
    fn resolve(&self, candidates: &[PathBuf]) -> Option<PathBuf>;
}

/// Deterministic default: the first candidate in path order
pub struct FirstMatch;

impl AmbiguityResolver for FirstMatch {
    fn resolve(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.first().cloned()
    }
}

/// Strict policy: any ambiguity cancels the launch
pub struct FailOnAmbiguity;

impl AmbiguityResolver for FailOnAmbiguity {
    fn resolve(&self, _candidates: &[PathBuf]) -> Option<PathBuf> {
        None
    }
}

/// Locates package executables below the configured search roots
pub struct PackageIndex {
    roots: Vec<PathBuf>,
}

impl PackageIndex {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        PackageIndex { roots }
    }

    /// All executable files named `node_type` below `<root>/<package>/`,
    /// in deterministic path order
    pub fn find_executables(&self, package: &str, node_type: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for root in &self.roots {
            let package_dir = root.join(package);
            if !package_dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&package_dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file()
                    && entry.file_name().to_str() == Some(node_type)
                    && is_executable(entry.path())
                {
                    found.push(entry.path().to_path_buf());
                }
            }
        }
        found.sort();
        found
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Starts, kills and inspects nodes on local and remote hosts
pub struct NodeLauncher {
    executor: RemoteExecutor,
    registrar: Option<ParamRegistrar>,
    screen: ScreenLayout,
    packages: PackageIndex,
    ambiguity: Box<dyn AmbiguityResolver>,
    starter_cmd: String,
    terminal_cmd: String,
    terminal_geometry: String,
}

impl NodeLauncher {
    pub fn new(
        config: &ManagerConfig,
        executor: RemoteExecutor,
        registrar: Option<ParamRegistrar>,
    ) -> Self {
        NodeLauncher {
            executor,
            registrar,
            screen: ScreenLayout::new(config),
            packages: PackageIndex::new(config.package_roots.clone()),
            ambiguity: Box::new(FirstMatch),
            starter_cmd: config.starter_cmd.clone(),
            terminal_cmd: config.terminal_cmd.clone(),
            terminal_geometry: config.terminal_geometry.clone(),
        }
    }

    /// Replace the ambiguity policy
    pub fn with_ambiguity_resolver(mut self, resolver: Box<dyn AmbiguityResolver>) -> Self {
        self.ambiguity = resolver;
        self
    }

    /// Start the named node from a launch configuration.
    ///
    /// Parameters scoped to the node (and, once per registry endpoint, the
    /// configuration's globals) are registered before the process starts.
    pub fn run_node(&self, config: &LaunchConfig, node_name: &str) -> Result<LaunchResult> {
        let node = resolver::resolve(config, node_name)?.clone();
        let full_name = node.full_name();
        let host = resolver::effective_host(config, &node)?;
        let local = host::is_local(Some(&host))?;
        let prefix = resolver::effective_prefix(&node, !local);
        let generated = resolver::generated_args(&node);

        if let Some(registrar) = &self.registrar {
            if let Some(endpoint) = config.registry_uri(&host) {
                registrar.register_globals_once(&endpoint, config)?;
                registrar.register_node_params(&endpoint, config, &full_name)?;
            }
        }

        if local {
            self.spawn_local(&node, &full_name, &prefix, &generated)
        } else {
            self.start_remote(&host, &node, &full_name, &prefix, &generated)
        }
    }

    /// Start a node without a loaded configuration. The full name is
    /// derived from a `__ns:=` argument if one is present; no parameters
    /// are registered.
    pub fn run_node_adhoc(
        &self,
        target_host: &str,
        package: &str,
        node_type: &str,
        name: &str,
        args: &[String],
    ) -> Result<LaunchResult> {
        let mut full_name = format!("/{}", name);
        for arg in args {
            if let Some(ns) = arg.strip_prefix("__ns:=") {
                full_name = format!("/{}{}", ns.trim_matches('/'), full_name);
            }
        }
        let full_name = full_name.replace("//", "/");

        let mut all_args = args.to_vec();
        all_args.push(format!("__name:={}", name));

        let node = NodeDescriptor {
            name: name.to_string(),
            namespace: "/".to_string(),
            package: package.to_string(),
            node_type: node_type.to_string(),
            args: all_args,
            remap_args: Vec::new(),
            env_args: Vec::new(),
            cwd: None,
            launch_prefix: None,
            machine_name: None,
        };

        if host::is_local(Some(target_host))? {
            self.spawn_local(&node, &full_name, "", &[])
        } else {
            self.start_remote(target_host, &node, &full_name, "", &[])
        }
    }

    fn spawn_local(
        &self,
        node: &NodeDescriptor,
        full_name: &str,
        prefix: &str,
        generated: &[String],
    ) -> Result<LaunchResult> {
        let candidates = self
            .packages
            .find_executables(&node.package, &node.node_type);
        let executable = match candidates.as_slice() {
            [] => {
                return Err(Error::NotFound(format!(
                    "executable '{}' in package [{}]",
                    node.node_type, node.package
                )))
            }
            [single] => single.clone(),
            _ => self
                .ambiguity
                .resolve(&candidates)
                .ok_or_else(|| Error::AmbiguousExecutable {
                    package: node.package.clone(),
                    node_type: node.node_type.clone(),
                })?,
        };

        self.screen.ensure_log_dirs()?;
        let mut argv = self.screen.screen_cmd(full_name);
        argv.extend(prefix.split_whitespace().map(|s| s.to_string()));
        argv.push(executable.display().to_string());
        argv.extend(node.args.iter().cloned());
        argv.extend(generated.iter().cloned());
        info!(command = argv.join(" "), "run node");

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        for (key, value) in &node.env_args {
            command.env(key, value);
        }
        let child = command.spawn().map_err(|e| Error::Spawn {
            command: argv.join(" "),
            source: e,
        })?;
        Ok(LaunchResult::Local { child })
    }

    fn start_remote(
        &self,
        host: &str,
        node: &NodeDescriptor,
        full_name: &str,
        prefix: &str,
        generated: &[String],
    ) -> Result<LaunchResult> {
        let mut argv: Vec<String> = Vec::new();
        if !node.env_args.is_empty() {
            argv.push("env".to_string());
            argv.extend(node.env_args.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        argv.extend(starter_args(
            &self.starter_cmd,
            node,
            full_name,
            prefix,
            generated,
        ));
        info!(host, command = argv.join(" "), "run node remote");

        let mut remote = self.executor.run(host, &argv, None, None)?;
        remote.close_stdin()?;
        let stderr = remote.read_stderr()?;
        let output = if stderr.is_empty() {
            remote.read_stdout()?
        } else {
            String::new()
        };
        remote_outcome(host, full_name, stderr, output)
    }

    /// Kill the process with the given pid on the given host
    pub fn kill(&self, target_host: &str, pid: u32) -> Result<()> {
        if host::is_local(Some(target_host))? {
            kill_local(pid)?;
            info!(pid, "killed local process");
            Ok(())
        } else {
            let argv = vec!["kill".to_string(), "-9".to_string(), pid.to_string()];
            info!(host = target_host, pid, "kill remote process");
            let mut remote = self.executor.run(target_host, &argv, None, None)?;
            remote.close_stdin()?;
            let stderr = remote.read_stderr()?;
            if !stderr.is_empty() {
                warn!(host = target_host, pid, stderr, "remote kill failed");
                return Err(Error::RemoteExecution {
                    host: target_host.to_string(),
                    stderr,
                });
            }
            Ok(())
        }
    }

    /// Open the log files of a node in pager terminals.
    ///
    /// Locally this opens the captured-output log and the framework log if
    /// they exist; absence is not an error. Remotely the starter shows the
    /// logs inside interactive terminals and `false` is returned.
    pub fn open_log(&self, node_name: &str, target_host: &str) -> Result<bool> {
        let title = format!("LOG {} on {}", node_name, target_host);
        if host::is_local(Some(target_host))? {
            let mut found = false;
            let screen_log = self.screen.screen_log_file(node_name);
            if screen_log.is_file() {
                self.open_pager(&screen_log, &title)?;
                found = true;
            }
            let framework_log = self.screen.framework_log_file(node_name);
            if framework_log.is_file() {
                let title = title.replacen("LOG", "FRAMEWORK LOG", 1);
                self.open_pager(&framework_log, &title)?;
                found = true;
            }
            Ok(found)
        } else {
            self.executor.run_interactive(
                target_host,
                &[
                    self.starter_cmd.clone(),
                    "--show_screen_log".to_string(),
                    node_name.to_string(),
                ],
                Some(&title),
                None,
            )?;
            self.executor.run_interactive(
                target_host,
                &[
                    self.starter_cmd.clone(),
                    "--show_ros_log".to_string(),
                    node_name.to_string(),
                ],
                Some(&title.replacen("LOG", "FRAMEWORK LOG", 1)),
                None,
            )?;
            Ok(false)
        }
    }

    /// Delete the log files of a node. Missing files are not an error.
    pub fn delete_log(&self, node_name: &str, target_host: &str) -> Result<()> {
        if host::is_local(Some(target_host))? {
            delete_node_logs(&self.screen, node_name)
        } else {
            let argv = vec![
                self.starter_cmd.clone(),
                "--delete_logs".to_string(),
                node_name.to_string(),
            ];
            let mut remote = self.executor.run(target_host, &argv, None, None)?;
            remote.close_stdin()?;
            let stderr = remote.read_stderr()?;
            if !stderr.is_empty() {
                warn!(host = target_host, node = node_name, stderr, "remote log delete failed");
            }
            Ok(())
        }
    }

    fn open_pager(&self, file: &Path, title: &str) -> Result<()> {
        let pager = self.screen.pager_command(file);
        let argv = terminal_command(&self.terminal_cmd, &self.terminal_geometry, &pager, title);
        info!(command = argv.join(" "), "open log");
        spawn_detached(&argv)
    }
}

/// Remove the captured-output log, pid file and framework log of a node
pub fn delete_node_logs(screen: &ScreenLayout, node_name: &str) -> Result<()> {
    for file in [
        screen.screen_log_file(node_name),
        screen.screen_pid_file(node_name),
        screen.framework_log_file(node_name),
    ] {
        if file.is_file() {
            std::fs::remove_file(&file)?;
        }
    }
    Ok(())
}

/// Interpret the channels of a finished remote start: any stderr text is
/// the failure reason, stdout is informational only
fn remote_outcome(
    host: &str,
    full_name: &str,
    stderr: String,
    output: String,
) -> Result<LaunchResult> {
    if !stderr.is_empty() {
        warn!(host, node = full_name, stderr, "remote start failed");
        return Err(Error::RemoteExecution {
            host: host.to_string(),
            stderr,
        });
    }
    if !output.is_empty() {
        debug!(host, node = full_name, output, "remote start output");
    }
    Ok(LaunchResult::Remote { output })
}

/// Send SIGKILL to a process on this host
#[cfg(unix)]
pub fn kill_local(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
        .map_err(|e| Error::Io(std::io::Error::other(format!("kill {}: {}", pid, e))))
}

#[cfg(not(unix))]
pub fn kill_local(pid: u32) -> Result<()> {
    Err(Error::Config(format!(
        "local kill of pid {} is not supported on this platform",
        pid
    )))
}

/// Remote-start argument list for a node, exposed for callers that build
/// the bootstrap command without dispatching it
pub fn starter_args(
    starter_cmd: &str,
    node: &NodeDescriptor,
    full_name: &str,
    prefix: &str,
    generated: &[String],
) -> Vec<String> {
    let mut argv = vec![
        starter_cmd.to_string(),
        "--package".to_string(),
        node.package.clone(),
        "--node_type".to_string(),
        node.node_type.clone(),
        "--node_name".to_string(),
        full_name.to_string(),
    ];
    if !prefix.is_empty() {
        argv.push("--prefix".to_string());
        argv.push(prefix.to_string());
    }
    argv.extend(node.args.iter().cloned());
    argv.extend(generated.iter().cloned());
    argv
}
