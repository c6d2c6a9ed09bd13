//! Connection supervisor
//!
//! Accepts on one listener and runs every client in its own task. Tasks
//! share nothing mutable: each opens a private database handle and owns its
//! socket, so a failing connection cannot disturb the others.

use crate::config::{Config, StorageConfig};
use crate::connection::{Connection, ConnectionSettings};
use crate::handlers::HandlerContext;
use anyhow::Result;
use meeting_crypto::TokenService;
use meeting_storage::{Backend, MemoryBackend, MinutesStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Open the configured storage backend
pub fn open_backend(config: &StorageConfig) -> Result<Arc<dyn Backend>> {
    let backend = match &config.snapshot_path {
        Some(path) => {
            info!("Persisting database to {}", path.display());
            MemoryBackend::with_snapshot(path)?
        }
        None => {
            warn!("No snapshot_path configured, data is kept in memory only");
            MemoryBackend::new()
        }
    };
    Ok(Arc::new(backend))
}

/// Meeting server bound to its listener
pub struct Server {
    listener: TcpListener,
    tokens: Arc<TokenService>,
    backend: Arc<dyn Backend>,
    minutes: MinutesStore,
    settings: ConnectionSettings,
    limit: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl Server {
    /// Bind the listener and prepare shared state
    pub async fn bind(config: &Config, backend: Arc<dyn Backend>) -> Result<Self> {
        let security = &config.security;
        if security.accept_unsigned_tokens {
            warn!("accept_unsigned_tokens is enabled, forged tokens will be accepted");
        }
        let tokens = Arc::new(TokenService::new(
            security.token_secret()?,
            security.token_policy(),
        ));

        let minutes = MinutesStore::open(&config.storage.minutes_dir)?;
        let listener = TcpListener::bind(config.server.bind).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            tokens,
            backend,
            minutes,
            settings: ConnectionSettings {
                max_frame_size: config.server.max_frame_size,
                read_timeout: config.server.read_timeout(),
            },
            limit: Arc::new(Semaphore::new(config.server.max_connections.max(1))),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true (or its sender drops),
    /// then wait for every connection task to close.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut tasks = JoinSet::new();

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
                accepted = self.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    self.spawn(&mut tasks, stream, peer, permit, shutdown.clone());
                }
            }
        }

        info!("Shutting down, waiting for {} connections", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Wait for a free connection slot, then for a client
    async fn accept(&self) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit)> {
        let permit = Arc::clone(&self.limit).acquire_owned().await?;
        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, peer, permit))
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        permit: OwnedSemaphorePermit,
        shutdown: watch::Receiver<bool>,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Connection {}: TCP_NODELAY failed: {}", id, e);
        }

        let tokens = Arc::clone(&self.tokens);
        let backend = Arc::clone(&self.backend);
        let minutes = self.minutes.clone();
        let settings = self.settings;

        tasks.spawn(async move {
            let _permit = permit;
            let db = match backend.open() {
                Ok(db) => db,
                Err(e) => {
                    error!("Connection {} from {}: database unavailable: {}", id, peer, e);
                    return;
                }
            };
            let ctx = HandlerContext::new(tokens, db, minutes);
            Connection::new(id, peer, stream, ctx, settings)
                .run(shutdown)
                .await;
        });
    }
}
