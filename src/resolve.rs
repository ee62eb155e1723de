//! Blocking host-name resolution, the pool's canonical workload.
//!
//! These helpers are plain blocking calls with no awareness of the pool;
//! [`submit_resolve`] runs one on an [`Executor`] and hands back the future.

use std::net::{IpAddr, ToSocketAddrs};

use crate::error::TaskError;
use crate::executor::Executor;
use crate::future::TaskFuture;
use crate::task::Task;

/// Which address families a lookup may return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddrFamily {
    /// Both IPv4 and IPv6 addresses.
    #[default]
    V4AndV6,
    /// IPv4 only; IPv6 records are filtered out.
    V4Only,
}

impl AddrFamily {
    fn accepts(self, addr: &IpAddr) -> bool {
        match self {
            AddrFamily::V4AndV6 => true,
            AddrFamily::V4Only => addr.is_ipv4(),
        }
    }
}

/// Resolve a host name to its addresses, blocking the calling thread.
///
/// Duplicates from multiple socket types collapse to one entry in
/// first-seen order. Fails if the name does not resolve or every address
/// was filtered out by `family`.
pub fn resolve_host(host: &str, family: AddrFamily) -> Result<Vec<IpAddr>, TaskError> {
    let addrs = (host, 0u16).to_socket_addrs()?;
    let mut out: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        let ip = addr.ip();
        if family.accepts(&ip) && !out.contains(&ip) {
            out.push(ip);
        }
    }
    if out.is_empty() {
        return Err(TaskError::Failed(format!("no addresses for host {}", host)));
    }
    Ok(out)
}

/// Resolve a host name and keep the first address.
pub fn first_address(host: &str, family: AddrFamily) -> Result<IpAddr, TaskError> {
    let addrs = resolve_host(host, family)?;
    Ok(addrs[0])
}

/// Run a lookup on the pool. The future's result is the address list.
pub fn submit_resolve(
    executor: &Executor,
    host: &str,
    family: AddrFamily,
) -> TaskFuture<Vec<IpAddr>> {
    let owned = host.to_string();
    let label = format!("resolve {}", host);
    executor.submit(Task::with_label(label, move || resolve_host(&owned, family)))
}
