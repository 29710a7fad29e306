use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::ServeArgs;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_DIRECTORY: &str = "server_files";
pub const DEFAULT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_PACING: Duration = Duration::from_millis(200);
pub const DEFAULT_BACKLOG: u32 = 5;

/// Transfer server configuration
///
/// Every field is optional so the `[server]` table of the config file only
/// needs the values it overrides. Unset fields fall back to the defaults above
/// when the server binds.
///
/// # Example
///
/// ```rust
/// use xfer::transfer::server::Config;
/// use std::time::Duration;
///
/// let config = Config::with_defaults()
///     .with_port(0)
///     .with_pacing(Duration::ZERO)
///     .with_max_workers(16);
/// assert_eq!(config.max_workers, Some(16));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Address to listen on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Store root: the only directory workers read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Upper bound on bytes per chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    /// Delay after every chunk
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub pacing: Option<Duration>,
    /// Pending connection queue length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog: Option<u32>,
    /// Concurrent worker ceiling; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Limit for waiting on the filename and the READY acknowledgment
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn with_defaults() -> Self {
        Self {
            ip: Some(DEFAULT_IP.to_string()),
            port: Some(crate::transfer::DEFAULT_PORT),
            directory: Some(PathBuf::from(DEFAULT_DIRECTORY)),
            buffer_size: Some(DEFAULT_BUFFER_SIZE),
            pacing: Some(DEFAULT_PACING),
            backlog: Some(DEFAULT_BACKLOG),
            max_workers: None,
            request_timeout: None,
        }
    }

    /// Apply command line values on top of the file configuration.
    pub fn merge_cli(mut self, args: ServeArgs) -> Self {
        if args.ip.is_some() {
            self.ip = args.ip;
        }
        if args.port.is_some() {
            self.port = args.port;
        }
        if args.dir.is_some() {
            self.directory = args.dir;
        }
        if args.buffer_size.is_some() {
            self.buffer_size = args.buffer_size;
        }
        if let Some(ms) = args.pacing_ms {
            self.pacing = Some(Duration::from_millis(ms));
        }
        if args.backlog.is_some() {
            self.backlog = args.backlog;
        }
        if args.max_workers.is_some() {
            self.max_workers = args.max_workers;
        }
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
