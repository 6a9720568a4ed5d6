//! Reachability probing.
//!
//! A host counts as reachable when it answers a TCP connection attempt on any
//! of the probe ports within the timeout, either by accepting it or by actively
//! refusing it. Silence, timeouts and network errors all read as unreachable.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

pub const DEFAULT_PROBE_PORTS: [u16; 4] = [7, 22, 80, 443];
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// `Ok(false)` covers both "host down" and "no answer before `timeout`".
    async fn probe(&self, address: &str, timeout: Duration) -> Result<bool, ProbeError>;
}

pub struct TcpProber {
    ports: Vec<u16>,
}

impl TcpProber {
    pub fn new(ports: Vec<u16>) -> Self {
        let ports = if ports.is_empty() { DEFAULT_PROBE_PORTS.to_vec() } else { ports };
        Self { ports }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<bool, ProbeError> {
        let deadline = Instant::now() + timeout;
        let Some(ips) = resolve(address, deadline).await? else {
            debug!(address, "name resolution timed out");
            return Ok(false);
        };

        let mut attempts = JoinSet::new();
        for ip in ips {
            for &port in &self.ports {
                attempts.spawn(knock(SocketAddr::new(ip, port)));
            }
        }

        let reachable = timeout_at(deadline, async {
            while let Some(answered) = attempts.join_next().await {
                if matches!(answered, Ok(true)) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        // dropping the set aborts the attempts still pending
        drop(attempts);
        debug!(address, reachable, "probe finished");
        Ok(reachable)
    }
}

async fn knock(target: SocketAddr) -> bool {
    match TcpStream::connect(target).await {
        Ok(_) => true,
        Err(e) => e.kind() == io::ErrorKind::ConnectionRefused,
    }
}

/// `Ok(None)` when resolution did not finish before the deadline.
async fn resolve(address: &str, deadline: Instant) -> Result<Option<Vec<IpAddr>>, ProbeError> {
    let invalid = || ProbeError::InvalidAddress(address.to_string());
    let host = address.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Some(vec![ip]));
    }
    if !is_host_name(host) {
        return Err(invalid());
    }

    match timeout_at(deadline, lookup_host((host, 0))).await {
        Err(_) => Ok(None),
        Ok(Err(_)) => Err(invalid()),
        Ok(Ok(addrs)) => {
            let ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
            if ips.is_empty() { Err(invalid()) } else { Ok(Some(ips)) }
        }
    }
}

fn is_host_name(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
