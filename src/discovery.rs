//! UDP broadcast discovery of devices on the local networks.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use if_addrs::IfAddr;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::Result;

/// UDP port devices answer discovery probes on.
pub const DEFAULT_PORT: u16 = 20054;

const PROBE: &[u8] = b"discover";

/// Largest reply read per datagram.
const MAX_DATAGRAM: usize = 1500;

/// Directed broadcast address of the network `ip` belongs to.
pub fn directed_broadcast(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

/// Broadcast addresses of every non-loopback IPv4 interface, deduplicated.
pub fn broadcast_addresses() -> Result<Vec<Ipv4Addr>> {
    let mut addresses = BTreeSet::new();
    for iface in if_addrs::get_if_addrs()? {
        if iface.is_loopback() {
            continue;
        }
        if let IfAddr::V4(v4) = &iface.addr {
            let broadcast = directed_broadcast(v4.ip, v4.netmask);
            debug!("Interface {} {} -> {}", iface.name, v4.ip, broadcast);
            addresses.insert(broadcast);
        }
    }
    Ok(addresses.into_iter().collect())
}

/// Probe every local network and collect the devices that answer within `wait`.
pub async fn discover(port: u16, wait: Duration) -> Result<Vec<Device>> {
    let targets = broadcast_addresses()?;
    if targets.is_empty() {
        warn!("No IPv4 network interface to broadcast on");
    }
    info!("Discovering devices on {} network(s) for {wait:?}", targets.len());

    let devices = probe_all(targets, port, wait).await;
    info!("Discovery found {} device(s)", devices.len());
    Ok(devices)
}

/// Probe `targets` concurrently until one shared deadline.
pub(crate) async fn probe_all(targets: Vec<Ipv4Addr>, port: u16, wait: Duration) -> Vec<Device> {
    let deadline = Instant::now() + wait;
    let found = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = JoinSet::new();
    for target in targets {
        let found = found.clone();
        tasks.spawn(async move {
            if let Err(e) = probe(target, port, deadline, found).await {
                warn!("Discovery on {target} failed: {e}");
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Discovery task failed: {e}");
        }
    }

    std::mem::take(&mut *found.lock().await)
}

async fn probe(target: Ipv4Addr, port: u16, deadline: Instant, found: Arc<Mutex<Vec<Device>>>) -> Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(PROBE, (target, port)).await?;

    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await else {
            return Ok(());
        };
        let (len, from) = received?;
        let reply = String::from_utf8_lossy(&buf[..len]);

        match Device::from_discovery_reply(&reply) {
            Ok(device) => {
                debug!("Reply from {from}: {device}");
                found.lock().await.push(device);
            }
            Err(e) => debug!("Ignoring reply from {from}: {e}"),
        }
    }
}
