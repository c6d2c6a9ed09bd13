//! Integration Test Harness
#![allow(dead_code)]
//!
//! Runs a complete server in-process on an ephemeral port, backed by a
//! temporary directory, and hands out connected clients.

use meeting_client::{Client, Session};
use meeting_daemon::{Config, Server, open_backend};
use meeting_protocol::Role;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A running server; stopped when [`TestServer::stop`] is awaited
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start with a config tweaked by `configure`
    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.server.bind = "127.0.0.1:0".parse().expect("valid address");
        config.storage.minutes_dir = dir.path().join("minutes");
        configure(&mut config);

        let backend = open_backend(&config.storage).expect("Failed to open backend");
        let server = Server::bind(&config, backend)
            .await
            .expect("Failed to bind server");
        let addr = server.local_addr().expect("Server has no address");

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));

        Self {
            addr,
            shutdown,
            handle,
            _dir: dir,
        }
    }

    pub async fn client(&self) -> Client {
        Client::connect(self.addr).await.expect("Failed to connect")
    }

    /// Connect and register a fresh account with password `secret`
    pub async fn user(&self, username: &str, role: Role) -> (Client, Session) {
        let mut client = self.client().await;
        let session = client
            .register(username, "secret", role)
            .await
            .expect("Failed to register");
        (client, session)
    }

    pub async fn stop(self) {
        self.shutdown.send(true).expect("Server already gone");
        self.handle
            .await
            .expect("Server task panicked")
            .expect("Server failed");
    }
}
