use log::{debug, error, info};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::config::{self, ClientConfig};
use crate::transfer::core::frame::{self, EOF_MARKER, MAX_CONTROL_LEN, RECV_BUFFER_SIZE};
use crate::transfer::core::{FailureKind, Reply, TransferError, TransferRequest};

/// Result of one download call. Built once at the end of the call.
#[derive(Debug)]
pub enum Outcome {
    Success {
        bytes_transferred: u64,
        saved_location: PathBuf,
    },
    Failure {
        reason: TransferError,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn reason(&self) -> Option<&TransferError> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { reason } => Some(reason),
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        self.reason().map(TransferError::kind)
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::Success { .. } => "File downloaded successfully".to_string(),
            Outcome::Failure { reason } => reason.to_string(),
        }
    }
}

/// Transfer client
///
/// Each download is one blocking exchange on a fresh connection.
///
/// # Example
///
/// ```rust,no_run
/// use xfer::transfer::client::{Client, ClientConfig, Outcome};
///
/// let client = Client::new(ClientConfig::new("127.0.0.1", 9999));
/// match client.download("hello.txt", None) {
///     Outcome::Success { bytes_transferred, saved_location } => {
///         println!("{} bytes -> {}", bytes_transferred, saved_location.display());
///     }
///     Outcome::Failure { reason } => eprintln!("{}", reason),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    host: String,
    port: u16,
    download_dir: PathBuf,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            host: config
                .server
                .unwrap_or_else(|| config::DEFAULT_SERVER.to_string()),
            port: config.port.unwrap_or(crate::transfer::DEFAULT_PORT),
            download_dir: config
                .download_dir
                .unwrap_or_else(|| PathBuf::from(config::DEFAULT_DOWNLOAD_DIR)),
            // Sockets reject a zero timeout; treat it as none.
            timeout: config.timeout.filter(|t| !t.is_zero()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Download `filename` to `destination`, or to the download directory
    /// when no destination is given.
    pub fn download(&self, filename: &str, destination: Option<&Path>) -> Outcome {
        self.download_with_progress(filename, destination, |_, _| {})
    }

    /// Same as [`Client::download`], reporting `(received, total)` after
    /// every write to the destination.
    pub fn download_with_progress<F>(
        &self,
        filename: &str,
        destination: Option<&Path>,
        mut progress: F,
    ) -> Outcome
    where
        F: FnMut(u64, u64),
    {
        match self.fetch(filename, destination, &mut progress) {
            Ok((bytes_transferred, saved_location)) => {
                info!("File downloaded successfully: {}", saved_location.display());
                info!("Total bytes received: {}", bytes_transferred);
                Outcome::Success {
                    bytes_transferred,
                    saved_location,
                }
            }
            Err(reason) => {
                error!("Error downloading {}: {}", filename, reason);
                Outcome::Failure { reason }
            }
        }
    }

    /// Explicit destinations are used as given. The default keeps only the
    /// last component of the requested name, so absolute names and `..`
    /// never leave the download directory.
    fn destination_for(
        &self,
        filename: &str,
        destination: Option<&Path>,
    ) -> Result<PathBuf, TransferError> {
        if let Some(path) = destination {
            return Ok(path.to_path_buf());
        }

        Path::new(filename)
            .file_name()
            .map(|name| self.download_dir.join(name))
            .ok_or_else(|| TransferError::InvalidName(filename.to_string()))
    }

    fn fetch(
        &self,
        filename: &str,
        destination: Option<&Path>,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(u64, PathBuf), TransferError> {
        let path = self.destination_for(filename, destination)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut stream = self.connect()?;

        info!("Requesting file: {}", filename);
        stream.write_all(TransferRequest::new(filename).encode())?;

        let mut control = [0u8; MAX_CONTROL_LEN];
        let n = stream.read(&mut control)?;
        if n == 0 {
            return Err(TransferError::ConnectionClosed);
        }

        let size = match Reply::parse(&control[..n])? {
            Reply::Error(message) => {
                info!("Server error: {}", message);
                return Err(TransferError::Rejected(message));
            }
            Reply::FileSize(size) => size,
        };
        info!("File size: {} bytes", size);

        stream.write_all(frame::READY)?;

        info!("Receiving file...");
        let mut file = File::create(&path)?;
        let received = receive_payload(&mut stream, &mut file, size, progress)?;
        file.flush()?;

        let _ = stream.shutdown(Shutdown::Both);
        Ok((received, path))
    }

    fn connect(&self) -> Result<TcpStream, TransferError> {
        let addr = self.address();
        info!("Connecting to server {}", addr);

        let connected = match self.timeout {
            Some(timeout) => {
                resolve(&addr).and_then(|target| TcpStream::connect_timeout(&target, timeout))
            }
            None => TcpStream::connect(&addr),
        };
        let stream = connected.map_err(|e| TransferError::connect(&addr, e))?;

        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        info!("Connected to server");
        Ok(stream)
    }
}

fn resolve(addr: &str) -> io::Result<std::net::SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved"))
}

/// Copy exactly `size` payload bytes from `stream` into `sink`.
///
/// Completion is decided by the byte count alone. Whatever follows the last
/// payload byte in the same read is expected to be the `EOF` marker and is
/// dropped either way.
fn receive_payload<R: Read, W: Write>(
    stream: &mut R,
    sink: &mut W,
    size: u64,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<u64, TransferError> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let mut received: u64 = 0;

    while received < size {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(TransferError::Interrupted {
                received,
                expected: size,
            });
        }

        let (payload, trailing) = frame::split_payload(&buf[..n], size - received);
        sink.write_all(payload)?;
        received += payload.len() as u64;
        progress(received, size);
        debug!("Progress: {}/{} bytes", received, size);

        if trailing == EOF_MARKER {
            debug!("Completion marker received");
        } else if !trailing.is_empty() {
            debug!("Ignoring {} bytes after payload", trailing.len());
        }
    }

    Ok(received)
}
