//! HTTP front end for the transfer server
//!
//! A browser-facing layer that lists the store, uploads into it and pulls
//! files through the regular transfer client. Requests are served one at a
//! time on the calling thread.
//!
//! ```bash
//! xfer web --port 5000 --server 127.0.0.1 --server-port 9999 --dir server_files
//! ```

pub mod config;
mod handlers;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::transfer::client::{Client, ClientConfig};
use crate::transfer::server::config::DEFAULT_DIRECTORY;

pub use config::WebConfig;
pub use handlers::format_size;

#[derive(Args, Debug, Default)]
pub struct WebArgs {
    /// IP address to listen on
    #[arg(short, long)]
    pub ip: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Transfer server address
    #[arg(short, long)]
    pub server: Option<String>,

    /// Transfer server port
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Store directory of the transfer server
    #[arg(short, long, value_name = "PATH")]
    pub dir: Option<PathBuf>,
}

pub struct WebServer {
    http: tiny_http::Server,
    addr: SocketAddr,
    state: handlers::State,
    // Removed on drop when no staging directory was configured.
    _staging: Option<TempDir>,
}

impl WebServer {
    pub fn bind(config: &WebConfig, client: ClientConfig, store_dir: PathBuf) -> Result<Self> {
        let (staging_dir, staging) = match &config.staging_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create staging directory {}", dir.display())
                })?;
                (dir.clone(), None)
            }
            None => {
                let temp = TempDir::new().context("Failed to create staging directory")?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        let address = config.address();
        let http = tiny_http::Server::http(&address)
            .map_err(|e| anyhow!("Failed to bind {}: {}", address, e))?;
        let addr = http
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow!("{} is not an IP listener", address))?;

        let client = Client::new(client);
        info!("Web interface listening on http://{}", addr);
        info!("Transfer server: {}", client.address());
        info!("Store directory: {}", store_dir.display());
        info!("Staging directory: {}", staging_dir.display());

        Ok(Self {
            http,
            addr,
            state: handlers::State {
                client,
                store_dir,
                staging_dir,
            },
            _staging: staging,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve requests until the listener is closed.
    pub fn serve(&self) {
        for request in self.http.incoming_requests() {
            if let Err(e) = handlers::handle(request, &self.state) {
                error!("Request handling error: {}", e);
            }
        }
    }
}

/// Run the web front end with CLI arguments and optional configuration
pub fn run_with_config(args: WebArgs, config: Option<&AppConfig>) -> Result<()> {
    let web = config
        .and_then(|c| c.web.clone())
        .unwrap_or_default()
        .merge_cli(args.ip, args.port);
    let client = config
        .and_then(|c| c.client.clone())
        .unwrap_or_default()
        .merge_cli(args.server, args.server_port, None);
    let store_dir = args
        .dir
        .or_else(|| config.and_then(|c| c.server.as_ref()).and_then(|s| s.directory.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIRECTORY));

    let server = WebServer::bind(&web, client, store_dir)?;
    info!("Press Ctrl+C to stop");
    server.serve();
    Ok(())
}
