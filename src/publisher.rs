//! Periodic status publishing
//!
//! Pushes the per-service status summary to an external dashboard so it
//! gets updates without polling. Best effort: a failed push is logged and
//! the next one happens on schedule.

use anyhow::Result;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::PublishConfig;
use crate::query;
use crate::signals::ShutdownSignal;
use crate::store::RecordStore;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to send status: {0}")]
    Request(#[from] reqwest::Error),
    #[error("status sink answered HTTP {0}")]
    Status(StatusCode),
    #[error("failed to encode status summary: {0}")]
    Encode(#[from] serde_json::Error),
}

/// HTTP client wrapper that PUTs the status summary to the sink
pub struct StatusPublisher {
    client: Client,
    url: String,
    authorization: Option<String>,
    interval: Duration,
    store: Arc<RecordStore>,
}

impl StatusPublisher {
    pub fn new(config: &PublishConfig, store: Arc<RecordStore>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let authorization =
            (!config.key.is_empty()).then(|| format!("{} {}", config.auth_scheme, config.key));

        Ok(Self {
            client,
            url: config.url.clone(),
            authorization,
            interval: config.interval(),
            store,
        })
    }

    /// Spawn the publishing loop
    pub fn spawn(self, shutdown: broadcast::Receiver<ShutdownSignal>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// Publish immediately and then once per interval until shutdown.
    /// Returns at once when no URL is configured.
    pub async fn run(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        if self.url.is_empty() {
            info!("Not publishing status");
            return;
        }

        info!(
            url = %self.url,
            interval_secs = self.interval.as_secs(),
            "Publishing status"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Status publisher shutting down");
                    return;
                }
                _ = async {
                    ticker.tick().await;
                    self.publish_and_log().await;
                } => {}
            }
        }
    }

    async fn publish_and_log(&self) {
        match self.publish_once().await {
            Ok(services) => {
                crate::metrics::record_publish("success");
                debug!(services, "Published status");
            }
            Err(e) => {
                crate::metrics::record_publish("failure");
                error!(error = %e, url = %self.url, "Failed to publish status");
            }
        }
    }

    /// Send the current summary once. Returns the number of services sent.
    pub async fn publish_once(&self) -> Result<usize, PublishError> {
        let (body, services) = {
            let snapshot = self.store.snapshot();
            let summary = query::status_summary(&snapshot);
            (serde_json::to_vec(&summary)?, summary.len())
        };

        let mut request = self
            .client
            .put(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status()));
        }

        Ok(services)
    }
}
