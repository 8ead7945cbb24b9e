#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Entry point for the air-quality API server.

use airquality_server::{ServerConfig, run_server};
use clap::Parser;

/// Air-quality measurements API.
#[derive(Parser, Debug)]
#[command(name = "airquality_server", version)]
struct Args {
    /// Address to bind, overrides `BIND_ADDR`.
    #[arg(long)]
    bind_addr: Option<String>,

    /// Port to bind, overrides `PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let args = Args::parse();

    let mut config = ServerConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {e}");
        std::io::Error::other(e)
    })?;
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    run_server(config).await
}
