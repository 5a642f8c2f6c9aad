//! Sync commands - One-shot drain and long-running mode
//!
//! `offsync sync` probes the backend and drains the queue once.
//! `offsync run` keeps the engine running: the HTTP probe feeds connectivity
//! transitions and the coordinator drains on reconnect and on its timer until
//! Ctrl+C.

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use offsync_core::config::Config;

use super::data::drain_and_report;
use crate::output::Output;
use crate::session::{Mode, Session};

#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let session = Session::open(config, Mode::OneShot).await?;

        if !session.engine.is_online() {
            out.warn(&format!("Backend unreachable at {}", session.probe.url()));
        }
        drain_and_report(&session.engine, &out).await?;

        session.close().await
    }
}

#[derive(Debug, Args)]
pub struct RunCommand {}

impl RunCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let session = Session::open(config, Mode::Background).await?;

        let cancel = CancellationToken::new();
        let connectivity = session.connectivity.clone();
        let probe = session
            .probe
            .clone()
            .spawn(move |online| connectivity.set_online(online), cancel.clone());

        out.success(&format!(
            "offsync running (device {}); press Ctrl+C to stop",
            session.engine.device_id()
        ));
        info!(
            interval_secs = config.sync.periodic_interval_secs,
            probe_url = %session.probe.url(),
            "Running until interrupted"
        );

        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C signal")?;

        info!("Interrupt received, shutting down");
        cancel.cancel();
        if let Err(e) = probe.await {
            out.warn(&format!("Probe task ended abnormally: {}", e));
        }

        let status = session.engine.status().await;
        session.close().await?;

        out.json(&status)?;
        out.success(&format!(
            "Stopped with {} pending item(s) and {} conflict(s)",
            status.pending_sync_items, status.pending_conflicts
        ));
        Ok(())
    }
}
