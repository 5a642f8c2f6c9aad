//! `offsync get`, `offsync put` and `offsync delete`
//!
//! Writes are applied locally and queued; `--sync` drains the queue right
//! away when the backend is reachable.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use offsync_core::config::Config;
use offsync_sync::{DrainOutcome, SyncEngine};

use crate::output::Output;
use crate::session::{Mode, Session};

#[derive(Debug, Args)]
pub struct GetCommand {
    /// Key to read
    pub key: String,

    /// Read the local copy only, without contacting the server
    #[arg(long)]
    pub local: bool,
}

impl GetCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let mode = if self.local { Mode::Offline } else { Mode::OneShot };
        let session = Session::open(config, mode).await?;

        let value = session.engine.retrieve(&self.key, !self.local).await?;
        let entry = session.engine.entry(&self.key).await?;

        out.json(&serde_json::json!({
            "key": self.key,
            "data": value,
            "entry": entry,
        }))?;

        match &value {
            Some(data) => {
                if !out.is_json() {
                    println!("{}", serde_json::to_string_pretty(data)?);
                }
                if let Some(entry) = &entry {
                    out.field("Version", &entry.metadata.version.to_string());
                    out.field("Source", &entry.metadata.source.to_string());
                    out.field("Sync status", &format!("{:?}", entry.sync_status));
                }
            }
            None => out.warn(&format!("{} not found", self.key)),
        }

        session.close().await
    }
}

#[derive(Debug, Args)]
pub struct PutCommand {
    /// Key to write
    pub key: String,

    /// JSON payload; anything that is not valid JSON is stored as a string
    pub data: String,

    /// Drain the sync queue after writing
    #[arg(long)]
    pub sync: bool,
}

/// Parses a payload argument, falling back to a JSON string
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl PutCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let mode = if self.sync { Mode::OneShot } else { Mode::Offline };
        let session = Session::open(config, mode).await?;

        let entry = session
            .engine
            .store(&self.key, parse_payload(&self.data))
            .await
            .context("Failed to store entry")?;

        out.json(&entry)?;
        out.success(&format!(
            "Stored {} (version {})",
            entry.key, entry.metadata.version
        ));

        if self.sync {
            drain_and_report(&session.engine, &out).await?;
        }
        session.close().await
    }
}

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Key to delete
    pub key: String,

    /// Drain the sync queue after deleting
    #[arg(long)]
    pub sync: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let mode = if self.sync { Mode::OneShot } else { Mode::Offline };
        let session = Session::open(config, mode).await?;

        let removed = session.engine.remove(&self.key).await?;

        out.json(&serde_json::json!({ "key": self.key, "removed": removed }))?;
        if removed {
            out.success(&format!("Deleted {}", self.key));
        } else {
            out.warn(&format!("{} not found", self.key));
        }

        if self.sync && removed {
            drain_and_report(&session.engine, &out).await?;
        }
        session.close().await
    }
}

/// Runs one drain and prints its outcome
pub async fn drain_and_report(engine: &SyncEngine, out: &Output) -> Result<()> {
    let summary = match engine.synchronize().await.context("Sync failed")? {
        DrainOutcome::Skipped(reason) => {
            out.json(&serde_json::json!({ "skipped": reason.to_string() }))?;
            out.warn(&format!("Sync skipped: {}", reason));
            return Ok(());
        }
        DrainOutcome::Completed(summary) => summary,
    };

    out.json(&summary)?;
    out.success(&format!(
        "Synced {} of {} item(s) in {}ms",
        summary.synced, summary.attempted, summary.duration_ms
    ));
    if summary.retried > 0 {
        out.warn(&format!("{} item(s) will be retried", summary.retried));
    }
    if summary.escalated > 0 {
        out.warn(&format!(
            "{} item(s) exhausted their retries; see 'offsync conflicts'",
            summary.escalated
        ));
    }
    if summary.conflicts > 0 {
        out.line(&format!("{} server conflict(s) handled", summary.conflicts));
    }
    if summary.deferred > 0 {
        out.line(&format!("{} item(s) waiting for retry delay", summary.deferred));
    }
    if summary.interrupted {
        out.warn("Connectivity lost during sync");
    }
    Ok(())
}
