use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::transfer::core::frame::{self, MAX_CONTROL_LEN};
use crate::transfer::core::{FileStore, Reply, TransferError, TransferRequest};

/// Settings every worker of one server shares.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Upper bound on bytes per chunk
    pub buffer_size: usize,
    /// Delay after each chunk; zero disables pacing
    pub pacing: Duration,
    /// Limit for waiting on the READY acknowledgment
    pub ack_timeout: Option<Duration>,
}

/// How a worker's connection ended.
#[derive(Debug)]
pub enum WorkerOutcome {
    Completed { bytes: u64 },
    /// Refused with an `ERROR:` reply before any size was announced.
    NotFound,
    /// The client answered the size announcement with something other than
    /// `READY`.
    NotReady,
    Failed(TransferError),
}

/// Transfer worker
///
/// Owns one accepted connection from the moment its request has been read
/// until the connection is closed.
pub struct Worker {
    name: String,
    stream: TcpStream,
    peer: SocketAddr,
    request: TransferRequest,
    store: Arc<FileStore>,
    options: WorkerOptions,
    /// Set once the client acknowledged with READY. From then on it reads
    /// everything as payload, so no control reply can be sent.
    streaming: bool,
}

impl Worker {
    pub fn new(
        name: String,
        stream: TcpStream,
        peer: SocketAddr,
        request: TransferRequest,
        store: Arc<FileStore>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            name,
            stream,
            peer,
            request,
            store,
            options,
            streaming: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drive the exchange to its end. The connection is shut down on every
    /// path, and no failure escapes as anything but a [`WorkerOutcome`].
    pub async fn run(mut self) -> WorkerOutcome {
        info!("[{}] Handling request from {}", self.name, self.peer);
        info!("[{}] Requested file: {}", self.name, self.request.filename());

        let outcome = match self.transfer().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[{}] Error: {}", self.name, e);
                // After READY the client counts bytes, so an ERROR reply would
                // be read as file content. Closing early is the signal there.
                if !self.streaming {
                    // The connection may already be broken.
                    let _ = self
                        .stream
                        .write_all(&Reply::Error(e.to_string()).encode())
                        .await;
                }
                WorkerOutcome::Failed(e)
            }
        };

        let _ = self.stream.shutdown().await;
        debug!("[{}] Connection closed with {}", self.name, self.peer);
        outcome
    }

    async fn transfer(&mut self) -> Result<WorkerOutcome, TransferError> {
        let path = match self.store.resolve(self.request.filename()) {
            Ok(path) => path,
            Err(e) => {
                warn!("[{}] File not found: {}", self.name, self.request.filename());
                self.stream.write_all(&Reply::Error(e.to_string()).encode()).await?;
                return Ok(WorkerOutcome::NotFound);
            }
        };

        let size = tokio::fs::metadata(&path).await?.len();
        self.stream.write_all(&Reply::FileSize(size).encode()).await?;

        let mut ack = [0u8; MAX_CONTROL_LEN];
        let n = read_control(&mut self.stream, &mut ack, self.options.ack_timeout).await?;
        if !frame::is_ready(&ack[..n]) {
            warn!("[{}] Client not ready", self.name);
            return Ok(WorkerOutcome::NotReady);
        }
        self.streaming = true;

        info!("[{}] Starting file transfer ({} bytes)", self.name, size);

        // Never send more than announced, even if the file grows meanwhile.
        let mut file = tokio::fs::File::open(&path).await?.take(size);
        let mut chunk = vec![0u8; self.options.buffer_size];
        let mut sent: u64 = 0;
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }

            self.stream.write_all(&chunk[..n]).await?;
            sent += n as u64;
            debug!(
                "[{}] Sent {} bytes ({}/{} bytes total)",
                self.name, n, sent, size
            );

            if !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }
        }

        if sent < size {
            warn!(
                "[{}] File shrank during transfer: {} of {} bytes",
                self.name, sent, size
            );
            return Err(TransferError::Truncated {
                sent,
                expected: size,
            });
        }

        self.stream.write_all(frame::EOF_MARKER).await?;
        info!(
            "[{}] File transfer completed: {} bytes sent",
            self.name, sent
        );

        Ok(WorkerOutcome::Completed { bytes: sent })
    }
}

/// Read one control message, optionally bounded by `timeout`.
pub(super) async fn read_control(
    stream: &mut TcpStream,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> io::Result<usize> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, stream.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for peer"))?,
        None => stream.read(buf).await,
    }
}
