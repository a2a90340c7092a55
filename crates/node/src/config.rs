use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3505;
pub const DEFAULT_API_PORT: u16 = 5924;

/// Node configuration. Every field has a default, the CLI overrides
/// individual ones.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Human-readable prefix of the node name; a random suffix is appended
    /// to keep names unique across the cluster.
    pub moniker: String,
    /// Address used for communication with other nodes.
    pub bind: SocketAddr,
    /// Address advertised to other nodes, when `bind` is not reachable
    /// from them (e.g. a wildcard address).
    pub advertise: Option<SocketAddr>,
    /// Seed addresses of existing cluster members, `host` or `host:port`.
    /// A bare host inherits the local bind port.
    pub seeds: Vec<String>,
    /// Address the operator API listens on.
    pub api_bind: SocketAddr,
    /// How many peers each gossip hop targets.
    pub gossip_fanout: usize,
    /// How often remembered message ids are advertised to peers.
    pub advertise_interval: Duration,
    /// How many full messages are kept for retransmission.
    pub message_ring: usize,
    /// How many message ids are remembered for de-duplication. Must be at
    /// least `message_ring`.
    pub id_ring: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            moniker: "node".to_string(),
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            advertise: None,
            seeds: Vec::new(),
            api_bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
            gossip_fanout: 3,
            advertise_interval: Duration::from_secs(20),
            message_ring: 2_000,
            id_ring: 1_000_000,
        }
    }
}

impl Config {
    /// Resolve the configured seeds to socket addresses.
    pub fn seed_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        let mut addrs = Vec::with_capacity(self.seeds.len());

        for seed in &self.seeds {
            let seed = seed.trim();
            if seed.is_empty() {
                continue;
            }

            let hostport = if seed.contains(':') {
                seed.to_string()
            } else {
                format!("{}:{}", seed, self.bind.port())
            };

            let resolved = hostport.to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("seed {seed} did not resolve to an address"),
                )
            })?;
            addrs.push(resolved);
        }

        Ok(addrs)
    }
}
