//! `offsync status` - connectivity, queue depth, conflicts and last sync
//!
//! Probes the backend once. `--queue` also lists the queued mutations.

use anyhow::Result;
use clap::Args;
use offsync_core::config::Config;

use crate::output::{format_millis, Output};
use crate::session::{Mode, Session};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// List queued mutations
    #[arg(long)]
    pub queue: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let session = Session::open(config, Mode::OneShot).await?;

        let status = session.engine.status().await;
        let queued = if self.queue {
            session.engine.pending_sync_items().await
        } else {
            Vec::new()
        };

        let mut json = serde_json::to_value(&status)?;
        if self.queue {
            json["queue"] = serde_json::to_value(&queued)?;
        }
        out.json(&json)?;

        out.success(&format!(
            "offsync is {}",
            if status.is_online { "online" } else { "offline" }
        ));
        out.field("Device", &status.device_id);
        out.field("Entries", &status.offline_data_count.to_string());
        out.field("Pending sync items", &status.pending_sync_items.to_string());
        out.field("Pending conflicts", &status.pending_conflicts.to_string());
        out.field("Last sync", &format_millis(status.last_sync_timestamp));

        if !queued.is_empty() {
            out.line("");
            out.line("  Operation  Retries  Key");
            for item in &queued {
                out.line(&format!(
                    "  {:<9}  {:>7}  {}",
                    item.operation.to_string(),
                    item.retry_count,
                    item.key()
                ));
                if let Some(error) = &item.last_error {
                    out.line(&format!("             last error: {}", error));
                }
            }
        }

        if status.pending_conflicts > 0 {
            out.warn("Conflicts need attention; see 'offsync conflicts'");
        }

        session.close().await
    }
}
