use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "127.0.0.1";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Where downloads land when no destination is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
    /// Connect, read and write timeout; none by default
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: Some(server.into()),
            port: Some(port),
            download_dir: Some(PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            timeout: None,
        }
    }

    /// Command line values win over the config file.
    pub fn merge_cli(
        mut self,
        cli_server: Option<String>,
        cli_port: Option<u16>,
        cli_timeout: Option<u64>,
    ) -> Self {
        if cli_server.is_some() {
            self.server = cli_server;
        }
        if cli_port.is_some() {
            self.port = cli_port;
        }
        match cli_timeout {
            Some(0) => self.timeout = None,
            Some(secs) => self.timeout = Some(Duration::from_secs(secs)),
            None => {}
        }
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
