/*!
 * nodeman CLI - start, kill and inspect nodes of a launch configuration
 */

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use nodeman::launch::launcher::FailOnAmbiguity;
use nodeman::session::{NoPrompt, TerminalPrompt};
use nodeman::{
    logging, LaunchConfig, LaunchResult, ManagerConfig, NodeLauncher, RemoteExecutor, SessionPool,
};

#[derive(Parser)]
#[command(name = "nodeman")]
#[command(version, about = "Launch, monitor and stop nodes of a distributed robot configuration", long_about = None)]
struct Cli {
    /// Manager configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Never prompt for credentials; fail on rejected authentication
    #[arg(long = "no-interactive", global = true)]
    no_interactive: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node from a launch description
    Run {
        /// Launch description file
        #[arg(short = 'l', long = "launch", value_name = "FILE")]
        launch: PathBuf,

        /// Name of the node to start (with namespace)
        node: String,
    },

    /// Start a node without a launch description
    RunAdhoc {
        /// Host to run the node on
        #[arg(long = "host", default_value = "")]
        host: String,

        /// Package containing the executable
        #[arg(long = "package")]
        package: String,

        /// Executable type inside the package
        #[arg(long = "node-type")]
        node_type: String,

        /// Node name (without namespace)
        #[arg(long = "name")]
        name: String,

        /// Arguments passed to the node
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Kill a process on a host
    Kill {
        #[arg(long = "host", default_value = "")]
        host: String,

        /// Process id to kill
        pid: u32,
    },

    /// Open the log files of a node
    ShowLog {
        #[arg(long = "host", default_value = "")]
        host: String,

        /// Node name (with namespace)
        node: String,
    },

    /// Delete the log files of a node
    DeleteLog {
        #[arg(long = "host", default_value = "")]
        host: String,

        /// Node name (with namespace)
        node: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match ManagerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(2);
            }
        },
        None => ManagerConfig::default(),
    };
    config.verbose = config.verbose || cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    let prompt: Box<dyn nodeman::CredentialPrompt> = if cli.no_interactive {
        Box::new(NoPrompt)
    } else {
        Box::new(TerminalPrompt)
    };
    let pool = Arc::new(SessionPool::new(&config, prompt));
    let executor = RemoteExecutor::new(&config, pool.clone());
    // No parameter registry is wired in the CLI; library embedders inject one
    let launcher = NodeLauncher::new(&config, executor, None)
        .with_ambiguity_resolver(Box::new(FailOnAmbiguity));

    let result = run_command(&cli.command, &launcher);
    pool.release_all();

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_command(command: &Commands, launcher: &NodeLauncher) -> nodeman::Result<()> {
    match command {
        Commands::Run { launch, node } => {
            let config = LaunchConfig::load(launch)?;
            match launcher.run_node(&config, node)? {
                LaunchResult::Local { child } => {
                    println!("started '{}' locally, pid {}", node, child.id());
                }
                LaunchResult::Remote { output } => {
                    println!("started '{}' remotely", node);
                    if !output.is_empty() {
                        println!("{}", output);
                    }
                }
            }
            Ok(())
        }
        Commands::RunAdhoc {
            host,
            package,
            node_type,
            name,
            args,
        } => {
            match launcher.run_node_adhoc(host, package, node_type, name, args)? {
                LaunchResult::Local { child } => {
                    println!("started '{}' locally, pid {}", name, child.id());
                }
                LaunchResult::Remote { .. } => {
                    println!("started '{}' on {}", name, host);
                }
            }
            Ok(())
        }
        Commands::Kill { host, pid } => launcher.kill(host, *pid),
        Commands::ShowLog { host, node } => {
            if !launcher.open_log(node, host)? {
                println!("no log for '{}' on {}", node, host);
            }
            Ok(())
        }
        Commands::DeleteLog { host, node } => launcher.delete_log(node, host),
    }
}
