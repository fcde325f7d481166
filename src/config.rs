/*!
 * Configuration types for nodeman
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Main configuration for the node manager core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Fallback user for remote sessions when the caller supplies none
    #[serde(default = "default_user")]
    pub default_user: String,

    /// Session connect timeout in seconds (kept short so foreground
    /// requests stay responsive)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Keep-alive interval in seconds for authenticated sessions
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u32,

    /// Base rate for the own-state polling loop in Hz
    #[serde(default = "default_base_poll_hz")]
    pub base_poll_hz: f64,

    /// Lower clamp for the adaptive polling rate in Hz
    #[serde(default = "default_min_poll_hz")]
    pub min_poll_hz: f64,

    /// Directories searched for package executables
    #[serde(default)]
    pub package_roots: Vec<PathBuf>,

    /// Directory holding screen output logs and pid files
    #[serde(default = "default_screen_log_dir")]
    pub screen_log_dir: PathBuf,

    /// Directory holding the framework log files of nodes
    #[serde(default = "default_framework_log_dir")]
    pub framework_log_dir: PathBuf,

    /// Terminal emulator used for interactive remote shells and log viewers
    #[serde(default = "default_terminal_cmd")]
    pub terminal_cmd: String,

    /// Geometry passed to the terminal emulator
    #[serde(default = "default_terminal_geometry")]
    pub terminal_geometry: String,

    /// Pager used to view log files
    #[serde(default = "default_pager_cmd")]
    pub pager_cmd: String,

    /// Screen binary wrapping every spawned node
    #[serde(default = "default_screen_cmd")]
    pub screen_cmd: String,

    /// Name of the starter entry point invoked on remote hosts
    #[serde(default = "default_starter_cmd")]
    pub starter_cmd: String,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

fn default_user() -> String {
    "robot".to_string()
}

fn default_connect_timeout() -> u64 {
    3
}

fn default_keepalive() -> u32 {
    10
}

fn default_base_poll_hz() -> f64 {
    1.0
}

fn default_min_poll_hz() -> f64 {
    0.0625
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".nodeman")
}

fn default_screen_log_dir() -> PathBuf {
    data_dir().join("log")
}

fn default_framework_log_dir() -> PathBuf {
    data_dir().join("roslog")
}

fn default_terminal_cmd() -> String {
    "/usr/bin/xterm".to_string()
}

fn default_terminal_geometry() -> String {
    "112x35".to_string()
}

fn default_pager_cmd() -> String {
    "/usr/bin/less -fKLnQrSU".to_string()
}

fn default_screen_cmd() -> String {
    "/usr/bin/screen".to_string()
}

fn default_starter_cmd() -> String {
    "nodeman-starter".to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            default_user: default_user(),
            connect_timeout_secs: default_connect_timeout(),
            keepalive_secs: default_keepalive(),
            base_poll_hz: default_base_poll_hz(),
            min_poll_hz: default_min_poll_hz(),
            package_roots: Vec::new(),
            screen_log_dir: default_screen_log_dir(),
            framework_log_dir: default_framework_log_dir(),
            terminal_cmd: default_terminal_cmd(),
            terminal_geometry: default_terminal_geometry(),
            pager_cmd: default_pager_cmd(),
            screen_cmd: default_screen_cmd(),
            starter_cmd: default_starter_cmd(),
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

impl ManagerConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Add a package search root
    pub fn with_package_root(mut self, root: PathBuf) -> Self {
        self.package_roots.push(root);
        self
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
