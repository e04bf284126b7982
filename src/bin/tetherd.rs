use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tether_rs::config;
use tether_rs::daemon::{
    Connector, ConnectorConfig, DevAuthenticator, SessionRegistry, SharedRegistry,
};
use tether_rs::telemetry;

/// Connector daemon for signon sessions over reconnectable connections.
#[derive(Parser)]
#[command(name = "tetherd", version)]
struct Args {
    /// Path to the config file.
    #[arg(long, default_value = "tether.toml")]
    config: PathBuf,

    /// Override the listen address from the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let mut cfg = config::load_or_init(&args.config);
    if let Some(listen) = args.listen {
        cfg.listen_addr = listen;
    }

    telemetry::init(args.verbose, &cfg.logging);
    tracing::warn!("using the development authenticator; embedders must supply their own");

    let registry = SharedRegistry::new(SessionRegistry::new(cfg.timings));
    let connector = Connector::new(
        registry,
        Arc::new(DevAuthenticator),
        ConnectorConfig {
            listen_addr: cfg.listen_addr,
            max_connections: cfg.max_connections,
            timings: cfg.timings,
        },
    );

    match connector.start() {
        Ok(handle) => handle.wait(),
        Err(err) => {
            tracing::error!("connector failed to start: {err}");
            std::process::exit(1);
        }
    }
}
