use anyhow::{Context, Result, anyhow, bail};
use log::{error, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;

use super::config::{self, Config};
use super::worker::{Worker, WorkerOptions, read_control};
use crate::transfer::core::frame::MAX_CONTROL_LEN;
use crate::transfer::core::{FileStore, TransferError, TransferRequest};

/// Transfer server
///
/// Accepts connections until told to stop. The loop itself reads the
/// filename from each connection, then hands the connection to a [`Worker`]
/// running as its own task. Workers share nothing but the read-only store, so
/// one failing transfer never touches the loop or its siblings.
///
/// # Example
///
/// ```rust,no_run
/// use xfer::transfer::server::{Config, Server};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::with_defaults().with_directory("/srv/files");
/// let mut server = Server::bind(&config).await?;
/// server.listen().await;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    listener: TcpListener,
    store: Arc<FileStore>,
    options: WorkerOptions,
    limiter: Option<Arc<Semaphore>>,
    request_timeout: Option<Duration>,
    /// Workers spawned so far; only used to name them.
    spawned: u64,
}

impl Server {
    /// Open the store and bind the listening socket.
    pub async fn bind(config: &Config) -> Result<Self> {
        let ip = config.ip.as_deref().unwrap_or(config::DEFAULT_IP);
        let port = config.port.unwrap_or(crate::transfer::DEFAULT_PORT);
        let directory = config
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(config::DEFAULT_DIRECTORY));
        let buffer_size = config.buffer_size.unwrap_or(config::DEFAULT_BUFFER_SIZE);
        let pacing = config.pacing.unwrap_or(config::DEFAULT_PACING);
        let backlog = config.backlog.unwrap_or(config::DEFAULT_BACKLOG);

        if buffer_size == 0 {
            bail!("buffer_size must be greater than zero");
        }

        let limiter = match config.max_workers {
            Some(0) => bail!("max_workers must be greater than zero"),
            Some(n) => Some(Arc::new(Semaphore::new(n))),
            None => None,
        };

        let store = FileStore::open(&directory)
            .with_context(|| format!("Failed to open store directory {}", directory.display()))?;

        let addr = tokio::net::lookup_host((ip, port))
            .await
            .with_context(|| format!("Failed to resolve {}:{}", ip, port))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}:{}", ip, port))?;
        let listener = listen(addr, backlog).with_context(|| format!("Failed to bind to {}", addr))?;

        info!("File server started on {}", listener.local_addr()?);
        info!("Serving files from: {}", store.root().display());
        info!("Buffer size: {} bytes", buffer_size);
        info!("Pacing: {:?}", pacing);
        match config.max_workers {
            Some(n) => info!("Worker ceiling: {}", n),
            None => info!("Worker ceiling: unbounded"),
        }

        Ok(Self {
            listener,
            store: Arc::new(store),
            options: WorkerOptions {
                buffer_size,
                pacing,
                ack_timeout: config.request_timeout,
            },
            limiter,
            request_timeout: config.request_timeout,
            spawned: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub async fn listen(&mut self) {
        self.listen_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` resolves. Workers already running
    /// are left to finish on their own.
    pub async fn listen_until<F: Future<Output = ()>>(&mut self, shutdown: F) {
        info!("Waiting for client connections...");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server...");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    // Intake may wait on a silent peer or a worker slot, so it
                    // races the shutdown signal too.
                    Ok((stream, peer)) => tokio::select! {
                        _ = &mut shutdown => {
                            info!("Shutting down server...");
                            break;
                        }
                        _ = self.handle_connection(stream, peer) => {}
                    },
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
        }

        info!("Server stopped");
    }

    async fn handle_connection(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        info!("New connection from {}", peer);

        let request = match self.read_request(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                info!("No filename received from {}", peer);
                return;
            }
            Err(e) => {
                warn!("Dropping connection from {}: {}", peer, e);
                return;
            }
        };

        let permit = match &self.limiter {
            Some(limiter) => match limiter.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return,
            },
            None => None,
        };

        self.spawned += 1;
        let name = format!("worker-{}", self.spawned);
        info!("Spawned {} for file: {}", name, request.filename());

        let worker = Worker::new(
            name,
            stream,
            peer,
            request,
            self.store.clone(),
            self.options,
        );
        tokio::spawn(async move {
            let _permit = permit;
            worker.run().await;
        });
    }

    async fn read_request(
        &self,
        stream: &mut TcpStream,
    ) -> Result<Option<TransferRequest>, TransferError> {
        let mut buf = [0u8; MAX_CONTROL_LEN];
        let n = read_control(stream, &mut buf, self.request_timeout).await?;
        TransferRequest::parse(&buf[..n])
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}
