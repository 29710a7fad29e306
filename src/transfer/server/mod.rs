//! Transfer server implementation
//!
//! This module provides the serving side of the protocol:
//! - `server`: accept loop, request intake and worker dispatch
//! - `worker`: one task per connection, streams a single file
//! - `config`: server configuration

pub mod config;
mod server_impl;
mod worker;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

pub use config::Config;
pub use server_impl::Server;
pub use worker::{Worker, WorkerOptions, WorkerOutcome};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// IP address to listen on
    #[arg(short, long)]
    pub ip: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory to serve files from
    #[arg(short, long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Maximum bytes per chunk
    #[arg(short, long)]
    pub buffer_size: Option<usize>,

    /// Delay after each chunk in milliseconds (0 disables pacing)
    #[arg(long)]
    pub pacing_ms: Option<u64>,

    /// Pending connection backlog
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Maximum concurrent workers (unbounded when omitted)
    #[arg(short, long)]
    pub max_workers: Option<usize>,
}

/// Run the transfer server with CLI arguments and optional configuration
pub fn run_with_config(args: ServeArgs, config: Option<Config>) -> Result<()> {
    let config = config.unwrap_or_default().merge_cli(args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        let mut server = Server::bind(&config).await?;

        log::info!("Transfer server listening, press Ctrl+C to stop");
        server.listen_until(shutdown_signal()).await;

        Ok::<(), anyhow::Error>(())
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
