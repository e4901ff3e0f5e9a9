//! Host link-state detection.
//!
//! A cheap heuristic for "is there a network at all": ask the OS to route a
//! UDP socket towards a public address. Connecting a UDP socket only picks a
//! route and a local address, no packet leaves the host. Without a usable
//! interface or default route the connect fails.

use log::debug;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Public address used only for the route lookup.
const ROUTE_PROBE_ADDR: &str = "1.1.1.1:53";

/// Whether the host currently has a route to the internet.
pub async fn link_available() -> bool {
    match route_to(ROUTE_PROBE_ADDR).await {
        Ok(local) => {
            debug!("Link available via {}", local);
            true
        }
        Err(e) => {
            debug!("No route to the internet: {}", e);
            false
        }
    }
}

/// Local address the OS would use to reach `addr`.
async fn route_to(addr: &str) -> io::Result<SocketAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(addr).await?;
    let local = socket.local_addr()?;

    if local.ip().is_unspecified() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no local address for route",
        ));
    }

    Ok(local)
}

/// Turns periodic link-state readings into change notifications.
#[derive(Debug, Clone, Copy)]
pub struct LinkWatcher {
    last: bool,
}

impl LinkWatcher {
    pub fn new(online: bool) -> Self {
        Self { last: online }
    }

    /// Record a reading; returns the new state if it differs from the last.
    pub fn observe(&mut self, online: bool) -> Option<bool> {
        if online == self.last {
            return None;
        }
        self.last = online;
        Some(online)
    }
}
