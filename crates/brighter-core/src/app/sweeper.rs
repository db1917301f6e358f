//! OutboxSweeper - re-sends messages that were deposited but never dispatched.
//!
//! Each pass clears a batch of outstanding messages older than `min_age`
//! and, with a retention set, deletes dispatched messages older than it.
//! One bad message fails on its own; the rest of the batch still goes out.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command_processor::CommandProcessor;
use crate::domain::{BrighterError, duration_ms};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_interval", rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,
    /// Messages younger than this are left to the poster.
    #[serde(default = "default_min_age", rename = "min_age_ms", with = "duration_ms")]
    pub min_age: Duration,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delete dispatched messages older than this. `None` keeps them.
    #[serde(
        default,
        rename = "retention_ms",
        skip_serializing_if = "Option::is_none",
        with = "duration_ms::option"
    )]
    pub retention: Option<Duration>,
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_min_age() -> Duration {
    Duration::from_secs(5)
}

fn default_batch_size() -> usize {
    100
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            min_age: default_min_age(),
            batch_size: default_batch_size(),
            retention: None,
        }
    }
}

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cleared: usize,
    pub failed: usize,
    pub archived: usize,
}

pub struct OutboxSweeper {
    processor: Arc<CommandProcessor>,
    config: SweeperConfig,
}

impl OutboxSweeper {
    pub fn new(processor: Arc<CommandProcessor>, config: SweeperConfig) -> Self {
        Self { processor, config }
    }

    /// One pass.
    pub async fn sweep(&self) -> Result<SweepReport, BrighterError> {
        let ids = self
            .processor
            .outstanding(self.config.min_age, self.config.batch_size)
            .await?;

        let mut report = SweepReport::default();
        if !ids.is_empty() {
            match self.processor.clear_outbox(&ids).await {
                Ok(cleared) => report.cleared = cleared,
                Err(BrighterError::ClearOutbox { cleared, failures }) => {
                    report.cleared = cleared;
                    report.failed = failures.len();
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(retention) = self.config.retention {
            let outbox = self.processor.outbox()?;
            let expired = outbox
                .dispatched_messages(retention, self.config.batch_size)
                .await?;
            let expired: Vec<_> = expired.iter().map(|m| m.id()).collect();
            outbox.delete(&expired).await?;
            report.archived = expired.len();
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown_rx` flips to true.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_ms = self.config.interval.as_millis() as u64, "outbox sweeper started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.sweep().await {
                Ok(report) if report != SweepReport::default() => {
                    info!(
                        cleared = report.cleared,
                        failed = report.failed,
                        archived = report.archived,
                        "outbox sweep"
                    );
                }
                Ok(_) => debug!("outbox sweep found nothing"),
                Err(e) => warn!(error = %e, "outbox sweep failed"),
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        info!("outbox sweeper stopped");
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle { shutdown_tx, join }
    }
}

/// A running sweeper. Dropping it stops the loop without waiting.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}
