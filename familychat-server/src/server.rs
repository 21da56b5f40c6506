//! Server state and HTTP listener.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::directory::UserDirectory;
use crate::message_log::MessageLog;
use crate::registry::ConnectionRegistry;
use crate::session::SessionGate;

/// Shared state accessible by all connection handlers.
pub struct SharedState {
    /// identity -> the single live chat connection for it
    pub registry: ConnectionRegistry,
    /// Persisted history of every accepted message.
    pub log: MessageLog,
    pub directory: UserDirectory,
    pub sessions: SessionGate,
    pub config: ServerConfig,
    pub started_at: Instant,
}

impl SharedState {
    /// The group channel's pseudo-identity.
    pub fn group(&self) -> &str {
        &self.config.group_name
    }
}

pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Build SharedState: load the user directory and set up the session key.
    fn build_state(&self) -> Result<Arc<SharedState>> {
        let users_path = Path::new(&self.config.users_path);
        let directory = UserDirectory::load(users_path, self.config.group_name.clone())
            .context("Failed to load user directory")?;
        tracing::info!("Loaded {} users from {}", directory.len(), users_path.display());

        let sessions = match self.config.session_secret {
            Some(ref secret) => SessionGate::new(secret.as_bytes(), self.config.secure_cookies),
            None => {
                tracing::warn!("No session secret configured; sessions will not survive a restart");
                SessionGate::random(self.config.secure_cookies)
            }
        }
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {e}"))?;

        let log = MessageLog::new(&self.config.messages_path, self.config.group_name.clone());
        tracing::info!("Message log at {}", log.path().display());

        Ok(Arc::new(SharedState {
            registry: ConnectionRegistry::new(),
            log,
            directory,
            sessions,
            config: self.config.clone(),
            started_at: Instant::now(),
        }))
    }

    /// Run the server, blocking forever.
    pub async fn run(self) -> Result<()> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        tracing::info!("HTTP/WebSocket listener on {}", self.config.listen_addr);
        axum::serve(listener, crate::web::router(state))
            .await
            .context("HTTP server error")
    }

    /// Start the server and return the bound address + task handle (for testing).
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let state = self.build_state()?;
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {addr}");

        let router = crate::web::router(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await?;
            Ok(())
        });
        Ok((addr, handle))
    }
}
