/*!
 * nodeman-starter - bootstrap entry point invoked on remote hosts
 *
 * The manager dispatches this executable over ssh to start nodes, show or
 * delete their logs, and kill processes on this host. Any diagnostic text
 * on stderr is read by the caller as the failure reason; stdout is
 * log-only.
 */

use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

use nodeman::launch::launcher::{delete_node_logs, kill_local, FirstMatch, PackageIndex};
use nodeman::launch::AmbiguityResolver;
use nodeman::remote::spawn_detached;
use nodeman::screen::ScreenLayout;
use nodeman::{Error, ManagerConfig, Result};

#[derive(Parser)]
#[command(name = "nodeman-starter")]
#[command(version, about = "Starts nodes and serves log requests on behalf of a remote node manager", long_about = None)]
struct Cli {
    /// Package containing the node to run
    #[arg(long = "package")]
    package: Option<String>,

    /// Executable type of the node to run
    #[arg(long = "node_type")]
    node_type: Option<String>,

    /// Name of the node (with namespace)
    #[arg(long = "node_name")]
    node_name: Option<String>,

    /// Prefix put in front of the executable
    #[arg(long = "prefix", default_value = "")]
    prefix: String,

    /// Show the captured-output log of the given node
    #[arg(long = "show_screen_log", value_name = "NODE")]
    show_screen_log: Option<String>,

    /// Show the framework log of the given node
    #[arg(long = "show_ros_log", value_name = "NODE")]
    show_ros_log: Option<String>,

    /// Delete the log files of the given node
    #[arg(long = "delete_logs", value_name = "NODE")]
    delete_logs: Option<String>,

    /// Kill the process with the given pid
    #[arg(long = "pidkill", value_name = "PID")]
    pidkill: Option<u32>,

    /// Manager configuration file
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Arguments passed through to the node
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        // The caller interprets stderr as the failure reason
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ManagerConfig::load(path)?,
        None => load_default_config()?,
    };
    let screen = ScreenLayout::new(&config);

    if let Some(node) = &cli.show_screen_log {
        return page_log(&config, &screen.screen_log_file(node));
    }
    if let Some(node) = &cli.show_ros_log {
        return page_log(&config, &screen.framework_log_file(node));
    }
    if let Some(node) = &cli.delete_logs {
        return delete_node_logs(&screen, node);
    }
    if let Some(pid) = cli.pidkill {
        return kill_local(pid);
    }
    match (&cli.package, &cli.node_type, &cli.node_name) {
        (Some(package), Some(node_type), Some(node_name)) => run_node(
            &config,
            &screen,
            package,
            node_type,
            node_name,
            &cli.prefix,
            &cli.args,
        ),
        _ => Err(Error::Config(
            "nothing to do: pass --package/--node_type/--node_name or a log/kill flag".to_string(),
        )),
    }
}

fn load_default_config() -> Result<ManagerConfig> {
    let path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".nodeman")
        .join("config.toml");
    if path.is_file() {
        ManagerConfig::load(&path)
    } else {
        Ok(ManagerConfig::default())
    }
}

/// Run the node inside a detached, logging screen session
fn run_node(
    config: &ManagerConfig,
    screen: &ScreenLayout,
    package: &str,
    node_type: &str,
    node_name: &str,
    prefix: &str,
    args: &[String],
) -> Result<()> {
    let index = PackageIndex::new(config.package_roots.clone());
    let candidates = index.find_executables(package, node_type);
    let executable = match FirstMatch.resolve(&candidates) {
        Some(path) => path,
        None => {
            return Err(Error::NotFound(format!(
                "executable '{}' in package [{}]",
                node_type, package
            )))
        }
    };

    screen.ensure_log_dirs()?;
    let mut argv = screen.screen_cmd(node_name);
    argv.extend(
        prefix
            .trim_matches('"')
            .split_whitespace()
            .map(|s| s.to_string()),
    );
    argv.push(executable.display().to_string());
    argv.extend(args.iter().cloned());
    println!("run on remote host: {}", argv.join(" "));
    spawn_detached(&argv)
}

/// Page a log file in the terminal this starter runs in
fn page_log(config: &ManagerConfig, file: &std::path::Path) -> Result<()> {
    if !file.is_file() {
        return Err(Error::NotFound(format!("log file {}", file.display())));
    }
    let mut parts = config.pager_cmd.split_whitespace();
    let pager = parts.next().ok_or_else(|| {
        Error::Config("pager command is empty".to_string())
    })?;
    let status = Command::new(pager)
        .args(parts)
        .arg(file)
        .status()
        .map_err(|e| Error::Spawn {
            command: config.pager_cmd.clone(),
            source: e,
        })?;
    if !status.success() {
        return Err(Error::Config(format!(
            "pager exited with {}",
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

