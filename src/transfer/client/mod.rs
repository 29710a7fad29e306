//! Transfer client implementation
//!
//! ```rust,no_run
//! use xfer::transfer::client::{Client, ClientConfig};
//! use std::path::Path;
//!
//! let client = Client::new(ClientConfig::new("192.168.1.100", 9999));
//! let outcome = client.download("report.pdf", Some(Path::new("report.pdf")));
//! println!("{}", outcome.message());
//! ```
//!
//! # Command Line Usage
//!
//! ```bash
//! xfer get report.pdf -s 192.168.1.100 -o report.pdf
//! ```

mod client_impl;
pub mod config;

use anyhow::{Result, anyhow};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub use client_impl::{Client, Outcome};
pub use config::ClientConfig;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// File name to request from the server
    pub filename: String,

    /// Local destination (defaults to <download_dir>/<filename>)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Server address or hostname
    #[arg(short, long)]
    pub server: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Socket timeout in seconds (0 disables)
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Run a single download with CLI arguments and optional configuration
pub fn run_with_config(args: GetArgs, config: Option<&ClientConfig>) -> Result<()> {
    let cfg = config
        .cloned()
        .unwrap_or_default()
        .merge_cli(args.server, args.port, args.timeout);
    let client = Client::new(cfg);

    log::info!("Downloading {} from {}", args.filename, client.address());

    let style = ProgressStyle::with_template(
        "{msg} {spinner:.green} {bytes}/{total_bytes} ({percent}%) [{bar:40.cyan/blue}] {eta}",
    )?
    .progress_chars("=>-");
    let progress = ProgressBar::hidden();
    progress.set_style(style);
    progress.set_message(args.filename.clone());

    let outcome = client.download_with_progress(
        &args.filename,
        args.output.as_deref(),
        |received, total| {
            if progress.is_hidden() && total > 0 {
                progress.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                progress.set_length(total);
                progress.enable_steady_tick(Duration::from_millis(120));
            }
            progress.set_position(received);
        },
    );
    progress.finish_and_clear();

    match outcome {
        Outcome::Success {
            bytes_transferred,
            saved_location,
        } => {
            println!(
                "Downloaded {} ({} bytes) to {}",
                args.filename,
                bytes_transferred,
                saved_location.display()
            );
            Ok(())
        }
        Outcome::Failure { reason } => {
            let kind = reason.kind();
            Err(anyhow!(reason).context(format!("Download failed ({})", kind.as_str())))
        }
    }
}
