/*!
 * Error types for nodeman
 */

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Host unreachable or transport-level failure while opening a session
    Connect { host: String, message: String },

    /// Credentials rejected or the credential prompt was declined
    Auth { host: String, message: String },

    /// Node, machine or executable absent from the configuration
    NotFound(String),

    /// Multiple executables matched and the ambiguity was not resolved
    AmbiguousExecutable { package: String, node_type: String },

    /// A parameter set/delete call reported non-success
    Registration(String),

    /// The remote starter reported diagnostic text on stderr
    RemoteExecution { host: String, stderr: String },

    /// Local process spawn failed
    Spawn { command: String, source: io::Error },

    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),
}

impl Error {
    /// Check if this error is an authentication failure (not retried
    /// automatically, the caller owns any further prompting)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }

    /// Check if this error is retryable by the caller (transport-level
    /// conditions that often resolve on a later attempt)
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Connect { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    /// Check if this error is fatal to the single request that triggered it
    /// but leaves the manager in a usable state
    pub fn is_request_local(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::AmbiguousExecutable { .. }
                | Error::Registration(_)
                | Error::RemoteExecution { .. }
                | Error::Spawn { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connect { host, message } => {
                write!(f, "Connection to {} failed: {}", host, message)
            }
            Error::Auth { host, message } => {
                write!(f, "Authentication on {} failed: {}", host, message)
            }
            Error::NotFound(what) => {
                write!(f, "{} not found", what)
            }
            Error::AmbiguousExecutable { package, node_type } => {
                write!(
                    f,
                    "Multiple executables for '{}' in package [{}], selection cancelled",
                    node_type, package
                )
            }
            Error::Registration(msg) => {
                write!(f, "Parameter registration failed: {}", msg)
            }
            Error::RemoteExecution { host, stderr } => {
                write!(f, "The host \"{}\" reports:\n{}", host, stderr)
            }
            Error::Spawn { command, source } => {
                write!(f, "Failed to spawn '{}': {}", command, source)
            }
            Error::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            Error::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_detection() {
        let err = Error::Auth {
            host: "10.0.0.5".to_string(),
            message: "prompt declined".to_string(),
        };
        assert!(err.is_auth_error());
        assert!(!err.is_retriable());

        let err = Error::Connect {
            host: "10.0.0.5".to_string(),
            message: "no route".to_string(),
        };
        assert!(!err.is_auth_error());
        assert!(err.is_retriable());
    }

    #[test]
    fn test_request_local_errors() {
        assert!(Error::NotFound("node '/ns/talker'".to_string()).is_request_local());
        assert!(Error::Registration("code 0".to_string()).is_request_local());
        assert!(Error::RemoteExecution {
            host: "h".to_string(),
            stderr: "permission denied".to_string(),
        }
        .is_request_local());
        assert!(!Error::Config("bad".to_string()).is_request_local());
    }

    #[test]
    fn test_remote_execution_display_carries_stderr_verbatim() {
        let err = Error::RemoteExecution {
            host: "10.0.0.5".to_string(),
            stderr: "permission denied".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("10.0.0.5"));
        assert!(text.contains("permission denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        let err: Error = io_err.into();
        assert!(err.is_retriable());
    }
}
