/*!
 * Remote command execution on top of the session pool
 *
 * `run` issues a command over a pooled session and hands back the command's
 * I/O channels without waiting for completion; the caller drains stdout and
 * stderr and closes stdin. `run_interactive` wraps the command in an ssh
 * invocation with X11 forwarding, optionally inside a titled terminal
 * emulator, and launches it as a detached local process whose lifetime is
 * not tracked further.
 */

use std::io::Read;
use std::process::Command;
use std::sync::Arc;

use secrecy::SecretString;
use ssh2::Channel;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::session::SessionPool;

/// ssh options for the interactive invocation: no agent/X11-reverse
/// forwarding surprises, no host-key interaction on robot networks
const SSH_INTERACTIVE_OPTS: [&str; 5] = [
    "-aqtx",
    "-oClearAllForwardings=yes",
    "-oStrictHostKeyChecking=no",
    "-oVerifyHostKeyDNS=no",
    "-oCheckHostIP=no",
];

/// A command running on a remote host, with its three I/O channels
pub struct RemoteCommand {
    host: String,
    channel: Channel,
}

impl RemoteCommand {
    /// Close the command's stdin
    pub fn close_stdin(&mut self) -> Result<()> {
        self.channel.send_eof().map_err(|e| Error::Connect {
            host: self.host.clone(),
            message: e.to_string(),
        })
    }

    /// Drain standard output to a string
    pub fn read_stdout(&mut self) -> Result<String> {
        let mut out = String::new();
        self.channel.read_to_string(&mut out)?;
        Ok(out)
    }

    /// Drain standard error to a string
    pub fn read_stderr(&mut self) -> Result<String> {
        let mut err = String::new();
        self.channel.stderr().read_to_string(&mut err)?;
        Ok(err)
    }

    /// Wait for the remote side to close the channel, returning its exit status
    pub fn finish(mut self) -> Result<i32> {
        self.channel.wait_close().map_err(|e| Error::Connect {
            host: self.host.clone(),
            message: e.to_string(),
        })?;
        self.channel.exit_status().map_err(|e| Error::Connect {
            host: self.host,
            message: e.to_string(),
        })
    }
}

/// Executes commands on remote hosts through pooled sessions
pub struct RemoteExecutor {
    pool: Arc<SessionPool>,
    terminal_cmd: String,
    terminal_geometry: String,
}

impl RemoteExecutor {
    pub fn new(config: &ManagerConfig, pool: Arc<SessionPool>) -> Self {
        RemoteExecutor {
            pool,
            terminal_cmd: config.terminal_cmd.clone(),
            terminal_geometry: config.terminal_geometry.clone(),
        }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Run `argv` on `host` and return the command's I/O channels.
    ///
    /// Host-unreachable and rejected-credential conditions are expected
    /// branches and surface as [`Error::Connect`] / [`Error::Auth`].
    pub fn run(
        &self,
        host: &str,
        argv: &[String],
        user: Option<&str>,
        secret: Option<&SecretString>,
    ) -> Result<RemoteCommand> {
        let session = self.pool.acquire(host, user, secret)?;
        let mut channel = session.channel_session().map_err(|e| Error::Connect {
            host: host.to_string(),
            message: e.to_string(),
        })?;
        let command = argv.join(" ");
        info!(host, command, "remote execute");
        channel.exec(&command).map_err(|e| Error::Connect {
            host: host.to_string(),
            message: e.to_string(),
        })?;
        Ok(RemoteCommand {
            host: host.to_string(),
            channel,
        })
    }

    /// Run `argv` on `host` in a visible terminal with X11 forwarding,
    /// detached from the manager. The spawned process is not tracked.
    pub fn run_interactive(
        &self,
        host: &str,
        argv: &[String],
        title: Option<&str>,
        user: Option<&str>,
    ) -> Result<()> {
        let user = self.pool.effective_user(host, user);
        let mut ssh_argv: Vec<String> = vec![String::from("/usr/bin/ssh")];
        ssh_argv.extend(SSH_INTERACTIVE_OPTS.iter().map(|s| s.to_string()));
        ssh_argv.push(format!("{}@{}", user, host));
        ssh_argv.extend(argv.iter().cloned());

        let command = match title {
            Some(title) => terminal_command(
                &self.terminal_cmd,
                &self.terminal_geometry,
                &ssh_argv,
                title,
            ),
            None => ssh_argv,
        };
        debug!(host, command = command.join(" "), "remote interactive execute");
        spawn_detached(&command)
    }
}

/// Wrap a command in a titled terminal-emulator invocation
pub fn terminal_command(
    terminal_cmd: &str,
    geometry: &str,
    cmd: &[String],
    title: &str,
) -> Vec<String> {
    let mut argv: Vec<String> = vec![
        terminal_cmd.to_string(),
        "-geometry".to_string(),
        geometry.to_string(),
        "-title".to_string(),
        title.to_string(),
        "-e".to_string(),
    ];
    argv.extend(cmd.iter().cloned());
    argv
}

/// Launch a command as a detached local process, dropping the handle
pub fn spawn_detached(argv: &[String]) -> Result<()> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        Error::Config("cannot spawn an empty command".to_string())
    })?;
    Command::new(program)
        .args(args)
        .spawn()
        .map_err(|e| Error::Spawn {
            command: argv.join(" "),
            source: e,
        })?;
    Ok(())
}
