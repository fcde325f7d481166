/*!
 * Screen-wrapper command and log file conventions
 *
 * Every spawned node runs inside a detached screen session so its output
 * survives the manager and can be inspected later. These are pure path and
 * argv functions over the configured directories.
 */

use std::path::PathBuf;

use crate::config::ManagerConfig;

/// Path and argv conventions for screen-wrapped nodes
#[derive(Debug, Clone)]
pub struct ScreenLayout {
    screen_cmd: String,
    screen_log_dir: PathBuf,
    framework_log_dir: PathBuf,
    pager_cmd: String,
}

impl ScreenLayout {
    pub fn new(config: &ManagerConfig) -> Self {
        ScreenLayout {
            screen_cmd: config.screen_cmd.clone(),
            screen_log_dir: config.screen_log_dir.clone(),
            framework_log_dir: config.framework_log_dir.clone(),
            pager_cmd: config.pager_cmd.clone(),
        }
    }

    /// Screen session name for a node: slashes collapse to underscores
    pub fn session_name(&self, node: &str) -> String {
        node.trim_start_matches('/').replace('/', "_")
    }

    /// Command prefix that wraps a node in a detached, logging screen session
    pub fn screen_cmd(&self, node: &str) -> Vec<String> {
        vec![
            self.screen_cmd.clone(),
            "-dmS".to_string(),
            self.session_name(node),
            "-L".to_string(),
            "-Logfile".to_string(),
            self.screen_log_file(node).display().to_string(),
        ]
    }

    /// Captured-output log of a node
    pub fn screen_log_file(&self, node: &str) -> PathBuf {
        self.screen_log_dir
            .join(format!("{}.log", self.session_name(node)))
    }

    /// Pid file of the screen session wrapping a node
    pub fn screen_pid_file(&self, node: &str) -> PathBuf {
        self.screen_log_dir
            .join(format!("{}.pid", self.session_name(node)))
    }

    /// Framework log of a node
    pub fn framework_log_file(&self, node: &str) -> PathBuf {
        self.framework_log_dir
            .join(format!("{}.log", self.session_name(node)))
    }

    /// Create the log directories if they do not exist yet
    pub fn ensure_log_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.screen_log_dir)?;
        std::fs::create_dir_all(&self.framework_log_dir)
    }

    /// Pager invocation for a log file
    pub fn pager_command(&self, file: &std::path::Path) -> Vec<String> {
        let mut argv: Vec<String> = self
            .pager_cmd
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        argv.push(file.display().to_string());
        argv
    }
}
