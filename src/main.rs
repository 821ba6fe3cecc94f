use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use rawicmp::args::{Cli, Command, ListenConfig, SenderConfig};
use rawicmp::transport;

/// Raw sockets need root (or CAP_NET_RAW). Any fatal error is printed by
/// anyhow and turns into exit status 1.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    transport::warn_if_unprivileged();

    match cli.command {
        Command::Send(args) => {
            let config = SenderConfig::from(args);
            debug!("Starting with options: {:?}", config);
            transport::send(&config)
        }
        Command::Listen(args) => {
            let config = ListenConfig::from(args);
            let running = Arc::new(AtomicBool::new(true));

            // A fully blocking receive never sees the flag, so leave the
            // default signal disposition in place.
            if config.poll_interval.is_some() {
                let r = running.clone();
                ctrlc::set_handler(move || {
                    r.store(false, Ordering::SeqCst);
                })
                .context("Failed to install the Ctrl+C handler")?;
            }

            transport::listen(&config, &running)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
