/*!
 * Connection-caching session pool for remote execution
 *
 * One authenticated SSH session is kept per host, created lazily on first
 * use and rebuilt in place when a cached transport is found dead. A failed
 * password authentication triggers a single round through the injected
 * credential prompt; the username a host finally accepted is remembered for
 * later acquisitions, the secret is not.
 *
 * The pool map is guarded by one mutex held only for map operations; each
 * host owns a second lock that serializes session setup for that host, so a
 * slow connect to one host never delays an unrelated host.
 */

use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use ssh2::Session;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};

/// libssh2 status for a rejected authentication attempt
const AUTH_FAILED: ssh2::ErrorCode = ssh2::ErrorCode::Session(-18);

/// Replacement credentials supplied by a prompt
pub struct Credentials {
    pub user: String,
    pub secret: Option<SecretString>,
}

/// Interactive boundary used when non-interactive authentication fails.
///
/// Returning `None` is a definitive cancellation and aborts the connection
/// attempt. The pool invokes the prompt at most once per acquisition.
pub trait CredentialPrompt: Send + Sync {
    fn prompt(&self, user: &str, host: &str) -> Option<Credentials>;
}

/// Terminal prompt built on dialoguer
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self, user: &str, host: &str) -> Option<Credentials> {
        let user: String = dialoguer::Input::new()
            .with_prompt(format!("User name on {}", host))
            .default(user.to_string())
            .interact_text()
            .ok()?;
        let secret = dialoguer::Password::new()
            .with_prompt(format!("Password for {}@{}", user, host))
            .allow_empty_password(true)
            .interact()
            .ok()?;
        Some(Credentials {
            user,
            secret: Some(SecretString::from(secret)),
        })
    }
}

/// Headless policy: every prompt is declined
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn prompt(&self, _user: &str, _host: &str) -> Option<Credentials> {
        None
    }
}

/// Per-host slot; the inner lock serializes setup for this host only
struct HostSlot {
    session: Mutex<Option<Arc<Session>>>,
}

/// Pool of authenticated sessions, keyed by host address
pub struct SessionPool {
    slots: Mutex<HashMap<String, Arc<HostSlot>>>,
    usernames: Mutex<HashMap<String, String>>,
    prompt: Box<dyn CredentialPrompt>,
    default_user: String,
    connect_timeout: Duration,
    keepalive_secs: u32,
}

impl SessionPool {
    pub fn new(config: &ManagerConfig, prompt: Box<dyn CredentialPrompt>) -> Self {
        SessionPool {
            slots: Mutex::new(HashMap::new()),
            usernames: Mutex::new(HashMap::new()),
            prompt,
            default_user: config.default_user.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            keepalive_secs: config.keepalive_secs,
        }
    }

    /// Acquire the session for `host`, connecting if none is cached or the
    /// cached transport is dead. `host` may carry a `:port` suffix.
    pub fn acquire(
        &self,
        host: &str,
        user: Option<&str>,
        secret: Option<&SecretString>,
    ) -> Result<Arc<Session>> {
        let slot = {
            let mut slots = self.slots.lock().expect("session pool poisoned");
            slots
                .entry(host.to_string())
                .or_insert_with(|| {
                    Arc::new(HostSlot {
                        session: Mutex::new(None),
                    })
                })
                .clone()
        };

        let mut guard = slot.session.lock().expect("host slot poisoned");
        if let Some(session) = guard.as_ref() {
            if session_alive(session) {
                return Ok(session.clone());
            }
            debug!(host, "cached session is dead, reconnecting");
            *guard = None;
        }

        let session = Arc::new(self.connect(host, user, secret)?);
        *guard = Some(session.clone());
        Ok(session)
    }

    /// The username `host` last accepted, if an interactive retry resolved one
    pub fn resolved_user(&self, host: &str) -> Option<String> {
        self.usernames
            .lock()
            .expect("username cache poisoned")
            .get(host)
            .cloned()
    }

    /// The user to present to `host` when the caller supplies none
    pub fn effective_user(&self, host: &str, user: Option<&str>) -> String {
        match user {
            Some(u) => u.to_string(),
            None => self
                .resolved_user(host)
                .unwrap_or_else(|| self.default_user.clone()),
        }
    }

    /// Close every open transport. Used at process shutdown.
    pub fn release_all(&self) {
        let slots: Vec<Arc<HostSlot>> = {
            let mut map = self.slots.lock().expect("session pool poisoned");
            map.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            let mut guard = slot.session.lock().expect("host slot poisoned");
            if let Some(session) = guard.take() {
                let _ = session.disconnect(None, "node manager closing", None);
            }
        }
    }

    fn connect(
        &self,
        host: &str,
        user: Option<&str>,
        secret: Option<&SecretString>,
    ) -> Result<Session> {
        let (addr, port) = split_host_port(host);
        let user = self.effective_user(host, user);

        let sockaddr = (addr, port)
            .to_socket_addrs()
            .map_err(|e| Error::Connect {
                host: host.to_string(),
                message: format!("cannot resolve host address: {}", e),
            })?
            .next()
            .ok_or_else(|| Error::Connect {
                host: host.to_string(),
                message: "host resolved to no address".to_string(),
            })?;

        let tcp = TcpStream::connect_timeout(&sockaddr, self.connect_timeout).map_err(|e| {
            Error::Connect {
                host: host.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut session = Session::new().map_err(|e| Error::Connect {
            host: host.to_string(),
            message: format!("failed to create session: {}", e),
        })?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.connect_timeout.as_millis() as u32);
        session.handshake().map_err(|e| Error::Connect {
            host: host.to_string(),
            message: e.to_string(),
        })?;

        let empty = SecretString::from(String::new());
        let first = session.userauth_password(
            &user,
            secret.unwrap_or(&empty).expose_secret(),
        );
        match first {
            Ok(()) => {}
            Err(e) if e.code() == AUTH_FAILED => {
                // Bad credentials, not a dead transport: one round through
                // the prompt, then one more attempt.
                let creds = self.prompt.prompt(&user, host).ok_or_else(|| Error::Auth {
                    host: host.to_string(),
                    message: "credential prompt declined".to_string(),
                })?;
                let retry_secret = creds.secret.unwrap_or(empty);
                session
                    .userauth_password(&creds.user, retry_secret.expose_secret())
                    .map_err(|e| Error::Auth {
                        host: host.to_string(),
                        message: e.to_string(),
                    })?;
                self.usernames
                    .lock()
                    .expect("username cache poisoned")
                    .insert(host.to_string(), creds.user);
            }
            Err(e) => {
                warn!(host, error = %e, "ssh connection failed");
                return Err(Error::Connect {
                    host: host.to_string(),
                    message: e.to_string(),
                });
            }
        }

        if !session.authenticated() {
            return Err(Error::Auth {
                host: host.to_string(),
                message: "authentication failed".to_string(),
            });
        }

        session.set_keepalive(true, self.keepalive_secs);
        // Commands run without a transport timeout once authenticated
        session.set_timeout(0);
        info!(host, user, "ssh session established");
        Ok(session)
    }
}

/// Liveness probe for a cached session
fn session_alive(session: &Session) -> bool {
    session.authenticated() && session.keepalive_send().is_ok()
}

fn split_host_port(host: &str) -> (&str, u16) {
    match host.rsplit_once(':') {
        Some((addr, port)) => match port.parse() {
            Ok(p) => (addr, p),
            Err(_) => (host, 22),
        },
        None => (host, 22),
    }
}
