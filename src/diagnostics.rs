//! TCP reachability probe run after every candidate endpoint has failed.
//!
//! The probe is independent of the messaging protocol: it only checks whether
//! a plain TCP connection to `host:port` can be opened within a timeout. The
//! result tells a user whether the server is down or only the WebSocket/STOMP
//! handshake is failing.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

/// Reachability of a single host on the probe port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReachability {
    pub host: String,
    pub reachable: bool,
    /// Connect error or `"timed out"` when unreachable.
    pub detail: Option<String>,
}

/// Per-host reachability results for one port, in probe-host order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityReport {
    pub port: u16,
    pub hosts: Vec<HostReachability>,
}

impl ReachabilityReport {
    /// Create a report from already-collected results.
    pub fn new(port: u16, hosts: Vec<HostReachability>) -> Self {
        Self { port, hosts }
    }

    /// Returns `true` if at least one host accepted a TCP connection.
    pub fn any_reachable(&self) -> bool {
        self.hosts.iter().any(|h| h.reachable)
    }

    /// Look up the result for a host.
    pub fn host(&self, host: &str) -> Option<&HostReachability> {
        self.hosts.iter().find(|h| h.host == host)
    }
}

impl fmt::Display for ReachabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "connectivity diagnostics (port {}):", self.port)?;
        for entry in &self.hosts {
            match (entry.reachable, &entry.detail) {
                (true, _) => writeln!(f, "- {}: reachable", entry.host)?,
                (false, Some(detail)) => writeln!(f, "- {}: unreachable ({detail})", entry.host)?,
                (false, None) => writeln!(f, "- {}: unreachable", entry.host)?,
            }
        }
        Ok(())
    }
}

/// Probe every host on `port` concurrently, each bounded by `timeout`.
///
/// The returned report lists hosts in the order given, regardless of which
/// probe finished first.
pub async fn probe_hosts(hosts: &[String], port: u16, timeout: Duration) -> ReachabilityReport {
    let mut set = JoinSet::new();
    for (idx, host) in hosts.iter().enumerate() {
        let host = host.clone();
        set.spawn(async move {
            let result = probe_host(&host, port, timeout).await;
            (idx, result)
        });
    }

    let mut results: Vec<(usize, HostReachability)> = Vec::with_capacity(hosts.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(entry) => results.push(entry),
            Err(e) => debug!("reachability probe task failed: {e}"),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);

    ReachabilityReport::new(port, results.into_iter().map(|(_, r)| r).collect())
}

async fn probe_host(host: &str, port: u16, timeout: Duration) -> HostReachability {
    let outcome = tokio::time::timeout(timeout, TcpStream::connect((host, port))).await;
    let (reachable, detail) = match outcome {
        Ok(Ok(_stream)) => (true, None),
        Ok(Err(e)) => (false, Some(e.to_string())),
        Err(_) => (false, Some("timed out".to_string())),
    };
    debug!(host = %host, port, reachable, "reachability probe finished");
    HostReachability {
        host: host.to_string(),
        reachable,
        detail,
    }
}
