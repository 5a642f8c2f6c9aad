//! `offsync logs` - recent conflict resolutions, newest first

use anyhow::Result;
use clap::Args;

use offsync_core::config::Config;

use crate::output::{format_millis, Output};
use crate::session::{Mode, Session};

#[derive(Debug, Args)]
pub struct LogsCommand {
    /// Maximum number of entries to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Only show resolutions for this key
    #[arg(long)]
    pub key: Option<String>,
}

impl LogsCommand {
    pub async fn execute(&self, config: &Config, out: Output) -> Result<()> {
        let session = Session::open(config, Mode::Offline).await?;

        let logs: Vec<_> = session
            .engine
            .resolution_logs()
            .await
            .into_iter()
            .rev()
            .filter(|log| self.key.as_ref().map_or(true, |k| log.key.to_string() == *k))
            .take(self.limit)
            .collect();

        out.json(&serde_json::json!({ "count": logs.len(), "entries": logs }))?;

        if logs.is_empty() {
            out.success("No resolutions recorded");
        } else {
            out.success(&format!("{} resolution(s)", logs.len()));
            for log in &logs {
                let choice = log
                    .choice
                    .map(|c| format!(" ({})", c))
                    .unwrap_or_default();
                out.line(&format!(
                    "{}  {:<12} {}{}  [{}]",
                    format_millis(log.timestamp),
                    log.strategy.to_string(),
                    log.key,
                    choice,
                    log.conflict.conflict_type
                ));
            }
        }

        session.close().await
    }
}
