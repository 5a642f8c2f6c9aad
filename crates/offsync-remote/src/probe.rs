//! Backend reachability probe
//!
//! Periodically issues `GET {base}{probe_path}` and reports reachability
//! transitions through a callback. The probe only observes; it never
//! retries or schedules sync work itself.

use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Polls a health endpoint to decide whether the backend is reachable
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
    interval: Duration,
}

impl HttpProbe {
    /// Creates a probe for `{base_url}{probe_path}`
    ///
    /// Each probe request is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        probe_path: &str,
        interval: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), probe_path),
            interval,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probes once; any 2xx response counts as reachable
    pub async fn check_once(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %self.url, error = %e, "Probe request failed");
                false
            }
        }
    }

    /// Runs the probe until `cancel` fires
    ///
    /// `on_change` is called with the first result and then on every
    /// transition.
    pub fn spawn<F>(self, on_change: F, cancel: CancellationToken) -> JoinHandle<()>
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut last: Option<bool> = None;
            loop {
                let online = tokio::select! {
                    _ = cancel.cancelled() => break,
                    online = self.check_once() => online,
                };

                if last != Some(online) {
                    info!(url = %self.url, online, "Backend reachability changed");
                    on_change(online);
                    last = Some(online);
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            debug!(url = %self.url, "Probe stopped");
        })
    }
}
