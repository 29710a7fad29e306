use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Where downloads are kept until the browser fetches them. A temporary
    /// directory living as long as the process when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl WebConfig {
    pub fn with_defaults() -> Self {
        Self {
            ip: Some(DEFAULT_IP.to_string()),
            port: Some(DEFAULT_PORT),
            staging_dir: None,
        }
    }

    pub fn merge_cli(mut self, cli_ip: Option<String>, cli_port: Option<u16>) -> Self {
        if cli_ip.is_some() {
            self.ip = cli_ip;
        }
        if cli_port.is_some() {
            self.port = cli_port;
        }
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn address(&self) -> String {
        format!(
            "{}:{}",
            self.ip.as_deref().unwrap_or(DEFAULT_IP),
            self.port.unwrap_or(DEFAULT_PORT)
        )
    }
}
