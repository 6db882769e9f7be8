//! Network server - share a driver over TCP.
//!
//! This demo:
//! - Loads an optional JSON config
//! - Starts the network server with a loopback-only admission filter
//! - Stops it on Ctrl-C
//!
//! # Running
//!
//! ```text
//! RUST_LOG=xbee_net=debug cargo run --example net_server -- 27015 [config.json]
//! ```
//!
//! Then, from another terminal, ask the Echo backchannel service for a reply:
//!
//! ```text
//! printf '\x7e\x00\x04\x00\x01hi' | nc 127.0.0.1 27015 | xxd
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use xbee_net::{ClientFilter, Driver, ServerConfig};

const DEFAULT_PORT: u16 = 27015;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = match args.next() {
        Some(p) => p.parse()?,
        None => DEFAULT_PORT,
    };
    let config = match args.next() {
        Some(path) => ServerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ServerConfig::default(),
    };

    let driver = Driver::builder().config(config).build()?;

    let loopback_only: ClientFilter = Arc::new(|address: &str| address == "127.0.0.1");
    driver.net_start(port, Some(loopback_only)).await?;

    tokio::signal::ctrl_c().await?;

    if let Some(counts) = driver.client_counts().await {
        tracing::info!(
            "Stopping with {} active and {} dead client(s)",
            counts.active,
            counts.dead
        );
    }
    driver.net_stop().await?;
    Ok(())
}
