//! `offsync conflicts` lists conflicts awaiting a decision (`--key` shows both
//! payloads for one key); `offsync resolve` settles one with `use_local`,
//! `use_server` or `use_custom`.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use offsync_core::config::Config;
use offsync_core::domain::{ConflictRecord, ManualChoice};

use crate::output::{format_millis, Output};
use crate::session::{Mode, Session};

#[derive(Debug, Args)]
pub struct ConflictsCommand {
    /// Show full details for this key only
    #[arg(long)]
    pub key: Option<String>,
}

impl ConflictsCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let session = Session::open(config, Mode::Offline).await?;

        let mut conflicts = session.engine.pending_conflicts().await;
        if let Some(key) = &self.key {
            conflicts.retain(|c| c.key.to_string() == *key);
        }
        info!(count = conflicts.len(), "Retrieved pending conflicts");

        out.json(&serde_json::json!({
            "count": conflicts.len(),
            "conflicts": conflicts,
        }))?;

        if conflicts.is_empty() {
            out.success("No pending conflicts");
        } else if self.key.is_some() {
            for conflict in &conflicts {
                show_details(conflict, &out);
            }
        } else {
            out.success(&format!(
                "{} pending conflict{}",
                conflicts.len(),
                if conflicts.len() == 1 { "" } else { "s" }
            ));
            out.line("");
            out.line("  Detected                 Type                     Key");
            for conflict in &conflicts {
                out.line(&format!(
                    "  {:<24} {:<24} {}",
                    format_millis(conflict.timestamp),
                    conflict.conflict_type.to_string(),
                    conflict.key
                ));
            }
            out.line("");
            out.line("Resolve with: offsync resolve <key> --choice <use_local|use_server|use_custom>");
        }

        session.close().await
    }
}

fn show_details(conflict: &ConflictRecord, out: &Output) {
    out.success(&format!("Conflict on {}", conflict.key));
    out.field("Type", &conflict.conflict_type.to_string());
    out.field("Detected", &format_millis(conflict.timestamp));
    if let Some(operation) = conflict.operation {
        out.field("Pending operation", &operation.to_string());
    }
    if let Some(error) = &conflict.error {
        out.field("Error", error);
    }
    out.field("Local version", &conflict.local_entry.metadata.version.to_string());
    out.field("Local data", &conflict.local_entry.data.to_string());
    match &conflict.remote_entry {
        Some(remote) => {
            out.field("Server version", &remote.metadata.version.to_string());
            out.field("Server data", &remote.data.to_string());
        }
        None => out.field("Server data", "(not captured)"),
    }
}

#[derive(Debug, Args)]
pub struct ResolveCommand {
    /// Key of the conflicting entry
    pub key: String,

    /// Resolution: use_local, use_server or use_custom
    #[arg(long)]
    pub choice: ManualChoice,

    /// JSON payload for use_custom
    #[arg(long)]
    pub data: Option<String>,
}

impl ResolveCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let data = self
            .data
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .context("--data is not valid JSON")?;

        let mode = if self.choice == ManualChoice::UseServer {
            Mode::OneShot
        } else {
            Mode::Offline
        };
        let session = Session::open(config, mode).await?;

        let result = session
            .engine
            .resolve_manually(&self.key, self.choice, data)
            .await;

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                out.error(&e.to_string());
                session.close().await?;
                anyhow::bail!("failed to resolve conflict for {}", self.key);
            }
        };

        out.json(&serde_json::json!({
            "key": self.key,
            "choice": self.choice,
            "entry": entry,
        }))?;
        out.success(&format!("Resolved {} with {}", self.key, self.choice));
        match &entry {
            Some(entry) => out.field("Data", &entry.data.to_string()),
            None => out.field("Data", "(deleted)"),
        }

        session.close().await
    }
}
