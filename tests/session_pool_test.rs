//! Session pool and remote executor integration tests
//!
//! Basic tests (no SSH server required):
//! ```bash
//! cargo test --test session_pool_test
//! ```
//!
//! Integration tests (require a live SSH server):
//! ```bash
//! TEST_SSH_HOST=localhost TEST_SSH_USER=robot TEST_SSH_PASSWORD=... \
//!     cargo test --test session_pool_test -- --ignored
//! ```

use std::sync::Arc;

use nodeman::session::NoPrompt;
use nodeman::{Error, ManagerConfig, RemoteExecutor, SessionPool};
use secrecy::SecretString;

fn pool() -> Arc<SessionPool> {
    Arc::new(SessionPool::new(
        &ManagerConfig::default(),
        Box::new(NoPrompt),
    ))
}

fn live_target() -> Option<(String, String, SecretString)> {
    let host = std::env::var("TEST_SSH_HOST").ok()?;
    let user = std::env::var("TEST_SSH_USER").ok()?;
    let password = std::env::var("TEST_SSH_PASSWORD").unwrap_or_default();
    Some((host, user, SecretString::from(password)))
}

#[test]
fn test_unresolvable_host_is_connect_error() {
    let err = pool()
        .acquire("no-such-host.invalid", None, None)
        .unwrap_err();
    assert!(matches!(err, Error::Connect { .. }));
    assert!(err.is_retriable());
}

#[test]
fn test_username_cache_starts_empty() {
    let pool = pool();
    assert_eq!(pool.resolved_user("10.0.0.5"), None);
    assert_eq!(pool.effective_user("10.0.0.5", None), "robot");
}

/// Integration test: the pool reuses one transport per host
#[test]
#[ignore] // Requires SSH server
fn test_session_reuse() {
    let (host, user, password) = live_target().expect("TEST_SSH_HOST/TEST_SSH_USER not set");
    let pool = pool();

    let first = pool
        .acquire(&host, Some(&user), Some(&password))
        .expect("first acquire failed");
    let second = pool
        .acquire(&host, Some(&user), Some(&password))
        .expect("second acquire failed");
    assert!(
        Arc::ptr_eq(&first, &second),
        "both acquisitions must refer to the same transport"
    );
    pool.release_all();
}

/// Integration test: run a command and drain its channels
#[test]
#[ignore] // Requires SSH server
fn test_remote_echo() {
    let (host, user, password) = live_target().expect("TEST_SSH_HOST/TEST_SSH_USER not set");
    let config = ManagerConfig::default();
    let pool = Arc::new(SessionPool::new(&config, Box::new(NoPrompt)));
    let executor = RemoteExecutor::new(&config, pool.clone());

    // Prime the pool with explicit credentials
    pool.acquire(&host, Some(&user), Some(&password))
        .expect("acquire failed");

    let argv = vec!["echo".to_string(), "hello".to_string()];
    let mut command = executor.run(&host, &argv, Some(&user), None).unwrap();
    command.close_stdin().unwrap();
    assert!(command.read_stderr().unwrap().is_empty());
    assert!(command.read_stdout().unwrap().contains("hello"));
    assert_eq!(command.finish().unwrap(), 0);
    pool.release_all();
}
