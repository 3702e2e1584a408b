//! Checking which signing servers accept connections.

use std::{
    env, fmt,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    thread,
    time::Duration,
};

use log::{debug, warn};

use crate::constants::{DEFAULT_HEALTH_CHECK_TIMEOUT_SECS, SIGNPROXY_ENV_HEALTH_TIMEOUT};

//------------ ProbeStatus ---------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeStatus {
    Reachable,
    Unreachable,
}

impl ProbeStatus {
    /// Returns `0` for a reachable and `1` for an unreachable address.
    pub fn code(self) -> i32 {
        match self {
            ProbeStatus::Reachable => 0,
            ProbeStatus::Unreachable => 1,
        }
    }

    pub fn is_reachable(self) -> bool {
        self == ProbeStatus::Reachable
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProbeStatus::Reachable => write!(f, "reachable"),
            ProbeStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

//------------ Probing -------------------------------------------------------

/// Parses a health check timeout in seconds.
///
/// Falls back to the default if the value is absent, not a number, or zero.
pub fn parse_health_timeout(value: Option<&str>) -> Duration {
    let secs = value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Returns the health check timeout, honouring the environment.
pub fn health_check_timeout(configured: Duration) -> Duration {
    match env::var(SIGNPROXY_ENV_HEALTH_TIMEOUT) {
        Ok(value) => parse_health_timeout(Some(&value)),
        Err(_) => configured,
    }
}

/// Tries to open a TCP connection to an `address:port` string.
pub fn check(address: &str, timeout: Duration) -> ProbeStatus {
    let addrs: Vec<SocketAddr> = match address.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            warn!("Cannot resolve {}: {}", address, e);
            return ProbeStatus::Unreachable;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return ProbeStatus::Reachable,
            Err(e) => debug!("Probe of {} via {} failed: {}", address, addr, e),
        }
    }
    ProbeStatus::Unreachable
}

/// Probes all addresses in parallel.
///
/// The result holds one status per address, in input order.
pub fn check_all<S: AsRef<str> + Sync>(addresses: &[S], timeout: Duration) -> Vec<ProbeStatus> {
    thread::scope(|scope| {
        let handles: Vec<_> = addresses
            .iter()
            .map(|address| scope.spawn(move || check(address.as_ref(), timeout)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(ProbeStatus::Unreachable))
            .collect()
    })
}

/// Like [`check_all`] but returns the numeric status codes.
pub fn check_all_codes<S: AsRef<str> + Sync>(addresses: &[S], timeout: Duration) -> Vec<i32> {
    check_all(addresses, timeout).into_iter().map(ProbeStatus::code).collect()
}

//------------ Tests ---------------------------------------------------------
