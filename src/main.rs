//! Secure Proxy Gateway
//!
//! A reverse proxy that rewrites requests and redacts responses, driven by
//! declarative route configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────────┐
//!                    │                        GATEWAY                            │
//!                    │                                                           │
//!  Client Request    │  ┌─────────┐    ┌──────────┐    ┌──────────────────────┐  │
//!  ──────────────────┼─▶│  http   │───▶│ routing  │───▶│ pipeline (request)   │  │
//!                    │  │ server  │    │ matcher  │    │ rate → url → headers │  │
//!                    │  └─────────┘    └──────────┘    │ → params → forwarder │──┼──▶ Upstream
//!                    │                                 └──────────────────────┘  │
//!  Client Response   │                                 ┌──────────────────────┐  │
//!  ◀─────────────────┼─────────────────────────────────│ pipeline (response)  │◀─┼─── Upstream
//!                    │                                 │ logger → masker →    │  │
//!                    │                                 │ headers              │  │
//!                    │                                 └──────────────────────┘  │
//!                    │  ┌─────────────────────────────────────────────────────┐  │
//!                    │  │  config (store, watcher) · gateway snapshot swap    │  │
//!                    │  │  admin API · observability · lifecycle              │  │
//!                    │  └─────────────────────────────────────────────────────┘  │
//!                    └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use secure_proxy_gateway::lifecycle::{self, StartupOptions};

#[derive(Parser)]
#[command(name = "secure-proxy-gateway")]
#[command(about = "Reverse proxy with request rewriting and response masking", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    lifecycle::run(StartupOptions {
        config_path: args.config,
        host: args.host,
        port: args.port,
    })
    .await?;

    Ok(())
}
