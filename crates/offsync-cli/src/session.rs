//! Engine wiring for CLI commands
//!
//! Opens the SQLite store, builds the HTTP adapters from configuration and
//! starts a [`SyncEngine`]. One-shot commands probe connectivity once;
//! `offsync run` keeps the probe running in the background.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use offsync_cache::SqliteKeyValueStore;
use offsync_core::config::Config;
use offsync_remote::{HttpProbe, HttpRemoteClient};
use offsync_sync::{ConnectivityHandle, NetworkMonitor, SyncEngine};

/// How a command wants the engine started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Local-only; the engine starts offline and never contacts the server
    Offline,
    /// Probe the backend once and run no background loop
    OneShot,
    /// Run the trigger loop; the caller drives the probe
    Background,
}

/// A started engine and the handles that feed it
pub struct Session {
    pub engine: SyncEngine,
    pub connectivity: ConnectivityHandle,
    pub probe: HttpProbe,
    store: Arc<SqliteKeyValueStore>,
}

impl Session {
    pub async fn open(config: &Config, mode: Mode) -> Result<Self> {
        let db_path = &config.storage.database;
        let store = Arc::new(
            SqliteKeyValueStore::open(db_path)
                .await
                .context("Failed to open database")?,
        );

        let mut client = HttpRemoteClient::new(&config.remote.base_url, config.sync.remote_timeout())
            .context("Failed to build HTTP client")?;
        if let Some(token) = &config.remote.auth_token {
            client = client.with_bearer_token(token.clone());
        }

        let probe = HttpProbe::new(
            &config.remote.base_url,
            &config.remote.probe_path,
            Duration::from_secs(config.remote.probe_interval_secs),
            config.sync.remote_timeout(),
        )
        .context("Failed to build connectivity probe")?;

        let online = match mode {
            Mode::Offline => false,
            Mode::OneShot => probe.check_once().await,
            Mode::Background => false,
        };
        debug!(url = %probe.url(), online, "Initial connectivity");

        let (network, connectivity) = NetworkMonitor::new(online);
        let engine = SyncEngine::builder(store.clone(), Arc::new(client), network)
            .sync_config(config.sync.clone())
            .conflicts(&config.conflicts)
            .background(mode == Mode::Background)
            .initialize()
            .await
            .context("Failed to start sync engine")?;

        info!(database = %db_path.display(), base_url = %config.remote.base_url, "Session opened");

        Ok(Self {
            engine,
            connectivity,
            probe,
            store,
        })
    }

    /// Shuts the engine down and closes the database
    pub async fn close(self) -> Result<()> {
        self.engine
            .shutdown()
            .await
            .context("Failed to persist engine state")?;
        self.store.close().await;
        Ok(())
    }
}
