use clap::Parser;
use log::warn;

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::blockchain::DEFAULT_DIFFICULTY;

/// Proof-of-work ledger node
///
/// Keeps a fork-tolerant block store, mines on request and exchanges blocks
/// with peers over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node", version, about)]
pub struct NodeConfig {
    /// Port the HTTP API listens on
    #[arg(env = "LEDGER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address the HTTP API binds to
    #[arg(long, env = "LEDGER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Proof-of-work difficulty; every node of a network must agree on it
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    pub difficulty: u32,

    /// Seed peer (`host:port`) to announce to and sync from at startup
    #[arg(long = "peer", env = "LEDGER_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,
}

impl NodeConfig {
    /// Identifier other nodes use to reach this one: local IP and port
    pub fn self_id(&self) -> String {
        format!("{}:{}", local_ip(), self.port)
    }
}

/// Best guess at the address peers can reach this host on
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick the
/// outbound interface. Falls back to loopback when there is no route.
pub fn local_ip() -> IpAddr {
    let outbound = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match outbound {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(err) => {
            warn!("Could not determine local IP address: {}", err);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
