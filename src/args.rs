use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::warn;

#[derive(Parser, Debug)]
#[command(version, about = "Send or listen for raw ICMP echo datagrams", long_about = None)]
pub struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single echo request carrying a message
    Send(SendArgs),
    /// Print every ICMP datagram received by this host
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// IP address or DNS name of the destination
    #[arg(short = 'd', long = "dest", value_name = "HOST")]
    pub destination: String,

    /// Physical interface to use (ex: -i eth0)
    #[arg(short, long, value_name = "IFACE")]
    pub interface: Option<String>,

    /// Source address (ex: -s 192.168.0.2)
    #[arg(short, long, value_name = "ADDR")]
    pub source: Option<String>,

    /// Message to send (ex: -m 1337.42)
    #[arg(short, long, value_name = "DATA", default_value = "")]
    pub message: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// How often the receive loop wakes up to check for Ctrl+C, in
    /// milliseconds; 0 blocks without a timeout
    #[arg(long = "poll-ms", value_name = "MS", default_value_t = 1000)]
    pub poll_ms: u64,
}

/// Everything the sender needs, fixed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub destination: String,
    pub interface: Option<String>,
    pub source: Ipv4Addr,
    pub message: Vec<u8>,
}

impl From<SendArgs> for SenderConfig {
    fn from(args: SendArgs) -> Self {
        // An unusable source address falls back to INADDR_ANY.
        let source = match args.source.as_deref().map(str::parse::<Ipv4Addr>) {
            Some(Ok(addr)) => addr,
            Some(Err(e)) => {
                warn!("invalid source address, using 0.0.0.0: {}", e);
                Ipv4Addr::UNSPECIFIED
            }
            None => Ipv4Addr::UNSPECIFIED,
        };

        SenderConfig {
            destination: args.destination,
            interface: args.interface,
            source,
            message: args.message.into_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenConfig {
    /// Receive timeout; `None` blocks indefinitely.
    pub poll_interval: Option<Duration>,
}

impl From<ListenArgs> for ListenConfig {
    fn from(args: ListenArgs) -> Self {
        ListenConfig {
            poll_interval: (args.poll_ms > 0).then(|| Duration::from_millis(args.poll_ms)),
        }
    }
}
