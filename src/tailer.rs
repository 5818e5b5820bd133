//! Access log tailer
//!
//! Drives a [`LogSource`] through the parser into the [`RecordStore`] as an
//! explicit state machine:
//!
//! ```text
//! Connecting ──ok──▶ Streaming ──line──▶ Streaming
//!     │                  │
//!     │ discover/open    │ stalled / end of stream / read error
//!     ▼ failure          ▼
//!  Backoff ◀─────────────┘
//!     │ fixed delay
//!     └──────────▶ Connecting
//! ```
//!
//! Every failure leads to `Backoff`; only shutdown ends the loop. Follow
//! mode redelivers lines after a reconnect, and the store's id check is
//! what keeps those out.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::TailerConfig;
use crate::parser;
use crate::signals::ShutdownSignal;
use crate::source::{LogLine, LogSource, LogStream};
use crate::store::RecordStore;

/// Reasons the tailer leaves `Connecting` or `Streaming` for `Backoff`
#[derive(Debug, Error)]
pub enum TailError {
    #[error("log source discovery failed: {0}")]
    Discovery(String),
    #[error("failed to open log stream for {target}: {reason}")]
    Open { target: String, reason: String },
    #[error("error reading log stream: {0}")]
    Read(#[from] std::io::Error),
    #[error("no log line received within {0:?}")]
    Stalled(Duration),
    #[error("log stream ended")]
    EndOfStream,
}

impl TailError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery",
            Self::Open { .. } => "open",
            Self::Read(_) => "read",
            Self::Stalled(_) => "stalled",
            Self::EndOfStream => "end_of_stream",
        }
    }

    /// Stalls and closed streams are routine during pod churn
    fn is_disconnect(&self) -> bool {
        matches!(self, Self::Stalled(_) | Self::EndOfStream)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TailerSettings {
    /// Longest wait for a single line before the stream counts as stalled
    pub stall_timeout: Duration,
    /// Fixed delay before reconnecting
    pub restart_delay: Duration,
}

impl From<&TailerConfig> for TailerSettings {
    fn from(config: &TailerConfig) -> Self {
        Self {
            stall_timeout: config.stall_timeout(),
            restart_delay: config.restart_delay(),
        }
    }
}

enum TailerState {
    Connecting,
    Streaming { target: String, stream: LogStream },
    Backoff(TailError),
}

impl TailerState {
    fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Streaming { .. } => "streaming",
            Self::Backoff(_) => "backoff",
        }
    }
}

/// Sole writer of the record store
pub struct Tailer {
    source: Arc<dyn LogSource>,
    store: Arc<RecordStore>,
    settings: TailerSettings,
}

impl Tailer {
    pub fn new(source: Arc<dyn LogSource>, store: Arc<RecordStore>, settings: TailerSettings) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Spawn the tailer loop
    pub fn spawn(self, shutdown: broadcast::Receiver<ShutdownSignal>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// Run until a shutdown signal arrives or its sender is dropped.
    ///
    /// Shutdown interrupts whatever the current state is waiting on.
    pub async fn run(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        info!(
            stall_timeout_secs = self.settings.stall_timeout.as_secs_f64(),
            restart_delay_secs = self.settings.restart_delay.as_secs_f64(),
            "Starting access log tailer"
        );

        let mut state = TailerState::Connecting;
        loop {
            let current = state.name();
            state = tokio::select! {
                _ = shutdown.recv() => {
                    info!(state = current, "Access log tailer shutting down");
                    return;
                }
                next = self.step(state) => next,
            };
        }
    }

    async fn step(&self, state: TailerState) -> TailerState {
        match state {
            TailerState::Connecting => match self.connect().await {
                Ok((target, stream)) => {
                    info!(target = %target, "Streaming access log");
                    TailerState::Streaming { target, stream }
                }
                Err(e) => TailerState::Backoff(e),
            },
            TailerState::Streaming { target, mut stream } => {
                match self.read_next(&mut stream).await {
                    Ok(()) => TailerState::Streaming { target, stream },
                    Err(e) => {
                        debug!(target = %target, "Dropping log stream");
                        TailerState::Backoff(e)
                    }
                }
            }
            TailerState::Backoff(reason) => {
                self.backoff(reason).await;
                TailerState::Connecting
            }
        }
    }

    async fn connect(&self) -> Result<(String, LogStream), TailError> {
        let target = self.source.discover().await?;
        debug!(target = %target, "Discovered log target");
        let stream = self.source.open_follow(&target).await?;
        Ok((target, stream))
    }

    async fn read_next(&self, stream: &mut LogStream) -> Result<(), TailError> {
        let line = tokio::time::timeout(self.settings.stall_timeout, stream.next_line())
            .await
            .map_err(|_| TailError::Stalled(self.settings.stall_timeout))??
            .ok_or(TailError::EndOfStream)?;

        match line {
            LogLine::Complete(text) => {
                self.ingest(&text);
            }
            LogLine::Oversized { len } => {
                crate::metrics::record_line("unparseable");
                debug!(len, "Skipping oversized line");
            }
        }
        Ok(())
    }

    async fn backoff(&self, reason: TailError) {
        crate::metrics::record_reconnect(reason.kind());

        let delay_secs = self.settings.restart_delay.as_secs_f64();
        if reason.is_disconnect() {
            warn!(error = %reason, delay_secs, "Log stream disconnected, reconnecting after delay");
        } else {
            error!(error = ?reason, delay_secs, "Log tailing failed, restarting after delay");
        }

        tokio::time::sleep(self.settings.restart_delay).await;
    }

    /// Parse one line and store the record. Returns whether it was added.
    pub fn ingest(&self, line: &str) -> bool {
        match parser::parse(line) {
            Ok(record) => {
                let request_id = record.request_id.clone();
                let inserted = self.store.try_insert(record);
                if inserted {
                    crate::metrics::record_line("parsed");
                    debug!(request_id = %request_id, "Stored request");
                }
                inserted
            }
            Err(e) => {
                crate::metrics::record_line("unparseable");
                debug!(error = %e, line = %line.trim_end(), "Skipping unparseable line");
                false
            }
        }
    }
}
