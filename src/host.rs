/*!
 * Host locality resolution
 *
 * Decides whether a host name or address refers to this machine or a remote
 * one. The local address set is read from the current network interfaces on
 * every call, so interface changes (VPN up/down) are observed immediately.
 */

use std::net::{IpAddr, ToSocketAddrs};

use sysinfo::{Networks, System};

use crate::error::{Error, Result};

/// Addresses assigned to the current network interfaces
pub fn local_addresses() -> Vec<IpAddr> {
    let networks = Networks::new_with_refreshed_list();
    let mut addrs = Vec::new();
    for (_name, data) in &networks {
        for net in data.ip_networks() {
            addrs.push(net.addr);
        }
    }
    addrs
}

/// Host name of this machine, if known
pub fn local_hostname() -> Option<String> {
    System::host_name()
}

/// Test whether the given host is this machine.
///
/// `None` or an empty host means "local to the launch context" and is
/// always local. Name resolution failures surface as [`Error::Connect`].
pub fn is_local(host: Option<&str>) -> Result<bool> {
    let host = match host {
        None => return Ok(true),
        Some(h) if h.is_empty() => return Ok(true),
        Some(h) => h,
    };

    if host == "localhost" {
        return Ok(true);
    }
    if let Some(name) = local_hostname() {
        if name == host {
            return Ok(true);
        }
    }

    let resolved: Vec<IpAddr> = (host, 0u16)
        .to_socket_addrs()
        .map_err(|e| Error::Connect {
            host: host.to_string(),
            message: format!("cannot resolve host address: {}", e),
        })?
        .map(|sa| sa.ip())
        .collect();

    let locals = local_addresses();
    Ok(resolved
        .iter()
        .any(|ip| ip.is_loopback() || locals.contains(ip)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_host_is_local() {
        assert!(is_local(None).unwrap());
        assert!(is_local(Some("")).unwrap());
    }

    #[test]
    fn test_localhost_is_local() {
        assert!(is_local(Some("localhost")).unwrap());
        assert!(is_local(Some("127.0.0.1")).unwrap());
    }

    #[test]
    fn test_routable_address_is_remote() {
        // Documentation range, never assigned to an interface
        assert!(!is_local(Some("192.0.2.1")).unwrap());
    }

    #[test]
    fn test_unresolvable_host_errors() {
        let err = is_local(Some("no-such-host.invalid")).unwrap_err();
        assert!(err.is_retriable());
    }
}
