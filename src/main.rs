use anyhow::Result;
use clap::{Parser, Subcommand};
use log::error;

use xfer::config::AppConfig;
use xfer::transfer::{client, server};
use xfer::web;

#[derive(Parser)]
#[command(name = "xfer")]
#[command(about = "Concurrent TCP file server and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the transfer server
    Serve(server::ServeArgs),

    /// Download one file from a transfer server
    Get(client::GetArgs),

    /// Start the HTTP front end
    Web(web::WebArgs),

    /// Generate configuration file (.xfer.toml) in current directory
    Genconfig {
        /// Force overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logger, default info level, display file line number and time
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}:{}] {level_style}{}{level_style:#}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    let app_config = AppConfig::discover();

    match cli.command {
        Commands::Serve(args) => {
            server::run_with_config(args, app_config.as_ref().and_then(|c| c.server.clone()))?;
        }

        Commands::Get(args) => {
            client::run_with_config(args, app_config.as_ref().and_then(|c| c.client.as_ref()))?;
        }

        Commands::Web(args) => {
            web::run_with_config(args, app_config.as_ref())?;
        }

        Commands::Genconfig { force } => {
            if let Err(e) = AppConfig::generate_config_file(force) {
                error!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
