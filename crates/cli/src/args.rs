use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use checkmesh_node::Config;

#[derive(Parser, Debug)]
#[command(name = "checkmesh", version, about = "Distributed health checks over gossip")]
pub struct Args {
    /// Address of the local daemon's operator API
    #[arg(long, global = true, default_value = "127.0.0.1:5924")]
    pub server: SocketAddr,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a node daemon
    Start(StartArgs),
    /// Run checks on the whole cluster
    Check(CheckArgs),
    /// Run checks on just one node (useful for validating a batch)
    LocalCheck(CheckArgs),
    /// List members of the cluster known to the local daemon
    ListMembers,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// JSON file with checks to run
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct StartArgs {
    /// Address used for communication with other nodes
    #[arg(long, default_value = "0.0.0.0:3505")]
    pub bind: SocketAddr,

    /// Address advertised to peers, when --bind is not reachable from them
    #[arg(long)]
    pub advertise: Option<SocketAddr>,

    /// Comma-separated seed addresses (host or host:port, a bare host
    /// inherits the local port)
    #[arg(long, value_delimiter = ',')]
    pub seeds: Vec<String>,

    /// Address the operator API listens on
    #[arg(long, default_value = "127.0.0.1:5924")]
    pub api_bind: SocketAddr,

    /// Node name prefix
    #[arg(long, default_value = "node")]
    pub moniker: String,

    /// Number of peers each gossip hop targets
    #[arg(long, default_value_t = 3)]
    pub fanout: usize,

    /// Seconds between advertisements of remembered messages
    #[arg(long, default_value_t = 20)]
    pub advertise_interval: u64,
}

impl StartArgs {
    pub fn to_config(&self) -> Config {
        Config {
            moniker: self.moniker.clone(),
            bind: self.bind,
            advertise: self.advertise,
            seeds: self.seeds.clone(),
            api_bind: self.api_bind,
            gossip_fanout: self.fanout,
            advertise_interval: Duration::from_secs(self.advertise_interval),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn start_args_build_the_config() {
        let args = Args::parse_from([
            "checkmesh",
            "start",
            "--bind",
            "0.0.0.0:4000",
            "--seeds",
            "10.0.0.1,10.0.0.2:4001",
            "--fanout",
            "5",
        ]);

        let Command::Start(start) = &args.command else {
            panic!("expected the start subcommand");
        };

        let config = start.to_config();
        assert_eq!(config.bind.port(), 4000);
        assert_eq!(config.seeds, ["10.0.0.1", "10.0.0.2:4001"]);
        assert_eq!(config.gossip_fanout, 5);
        assert_eq!(config.advertise_interval, Duration::from_secs(20));
    }
}
