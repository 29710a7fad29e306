use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::transfer::client::config::ClientConfig;
use crate::transfer::server::config::Config as ServerConfig;
use crate::web::config::WebConfig;

pub const CONFIG_FILE: &str = ".xfer.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebConfig>,
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Look for the configuration file in the current directory.
    ///
    /// Returns `None` when there is none; a file that fails to load is
    /// logged and treated the same way.
    pub fn discover() -> Option<Self> {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            return None;
        }

        match Self::load_from_file(path) {
            Ok(cfg) => {
                let abs_path = fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path));
                info!("Using configuration file: {}", abs_path.display());
                Some(cfg)
            }
            Err(e) => {
                log::error!("Failed to load configuration file: {:#}, using defaults", e);
                None
            }
        }
    }

    pub fn generate_config_file(force: bool) -> anyhow::Result<()> {
        Self::generate_config_file_at(CONFIG_FILE, force)
    }

    pub fn generate_config_file_at(path: impl AsRef<Path>, force: bool) -> anyhow::Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            anyhow::bail!(
                "Configuration file {} already exists. Use --force to overwrite.",
                path.display()
            );
        }

        let config_content = Self::generate_full_config()?;
        fs::write(path, config_content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Configuration file generated: {}", path.display());
        info!("Contains full configuration (server + client + web)");
        info!("Please edit this file to customize configuration");
        Ok(())
    }

    pub fn generate_full_config() -> anyhow::Result<String> {
        let config = AppConfig {
            server: Some(ServerConfig::with_defaults()),
            client: Some(ClientConfig::new(
                crate::transfer::client::config::DEFAULT_SERVER,
                crate::transfer::DEFAULT_PORT,
            )),
            web: Some(WebConfig::with_defaults()),
        };
        let toml_content = toml::to_string_pretty(&config)?;
        Ok(format!(
            "# xfer configuration file\n# All fields are optional, command line arguments override config file values\n\n{}",
            toml_content
        ))
    }
}
