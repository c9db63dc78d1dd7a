//! Scan runner - main worker loop

use crate::db::{JobStore, StatusUpdate};
use crate::error::{Result, ScanError};
use crate::truncate::{head_chars, tail_chars};
use crate::worker::{CurrentJob, ScanProcessor, WorkerConfig};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};

/// Longest error string written to a failed scan
pub const MAX_ERROR_CHARS: usize = 2000;

/// Characters of pipeline log appended to a failure message
const ERROR_LOG_TAIL_CHARS: usize = 2000;

/// Polls the queue and drives one scan at a time to a terminal status
pub struct ScanRunner {
    store: Arc<dyn JobStore>,
    processor: ScanProcessor,
    config: WorkerConfig,
    current: CurrentJob,
}

impl ScanRunner {
    /// Create a new scan runner
    pub fn new(store: Arc<dyn JobStore>, processor: ScanProcessor, config: WorkerConfig) -> Self {
        Self {
            store,
            processor,
            config,
            current: CurrentJob::new(),
        }
    }

    /// Handle to the in-flight scan marker, for the termination handler
    pub fn current_job(&self) -> CurrentJob {
        self.current.clone()
    }

    /// Main worker loop
    ///
    /// Never returns on its own; the process ends through the termination handler.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Worker started. Polling every {:?}",
            self.config.poll_interval
        );
        info!(
            "Buckets: {} -> {}",
            self.processor.transfer().input_bucket(),
            self.processor.transfer().result_bucket()
        );
        info!("Pipeline: {}", self.config.pipeline_command);
        match self.config.pipeline_timeout {
            Some(limit) => info!("Pipeline timeout: {:?}", limit),
            None => info!("Pipeline timeout: none"),
        }

        loop {
            match self.process_one_job().await {
                Ok(true) => {
                    // Scan finalized, look for the next one straight away
                }
                Ok(false) => {
                    sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Process a single scan
    ///
    /// Returns:
    /// - Ok(true) if a scan was picked up (whatever its outcome)
    /// - Ok(false) if no scans were waiting
    /// - Err if the queue itself could not be read or claimed
    pub async fn process_one_job(&self) -> Result<bool> {
        let job = match self.store.fetch_next_candidate().await? {
            Some(job) => job,
            None => return Ok(false),
        };
        let job_id = job.id.clone();

        let inputs = match job.inputs() {
            Ok(inputs) => inputs,
            Err(e) => {
                warn!("Scan {} rejected: {}", job_id, e);
                let update = StatusUpdate::Failed {
                    error: e.to_string(),
                };
                self.store.set_status(&job_id, &update).await?;
                return Ok(true);
            }
        };

        // Set before any blocking work so a termination signal can find it
        let _marker = self.current.enter(&job_id);

        info!("Claiming scan: {}", job_id);
        if !self.store.claim(&job_id).await? {
            warn!("Scan {} was claimed elsewhere, skipping", job_id);
            return Ok(true);
        }

        let span = info_span!("scan", id = %job_id);
        let outcome = self
            .processor
            .process(&job_id, &inputs)
            .instrument(span)
            .await;

        let finalized = match outcome.result {
            Ok(stl_path) => {
                let update = StatusUpdate::Complete {
                    stl_path: stl_path.clone(),
                };
                self.store
                    .set_status(&job_id, &update)
                    .await
                    .map(|()| stl_path)
            }
            Err(e) => Err(e),
        };

        match finalized {
            Ok(stl_path) => info!("COMPLETE: {} -> {}", job_id, stl_path),
            Err(e) => {
                self.fail_job(&job_id, &e, outcome.pipeline_log.as_deref())
                    .await
            }
        }

        Ok(true)
    }

    /// Run once and exit (for testing)
    pub async fn run_once(&self) -> Result<bool> {
        info!("Running worker in single-scan mode...");
        self.process_one_job().await
    }

    async fn fail_job(&self, job_id: &str, err: &ScanError, log: Option<&str>) {
        let log = log.filter(|l| !l.is_empty());
        if let Some(log) = log {
            self.processor.save_log(job_id, log).await;
        }

        let message = failure_message(err, log);
        error!("FAILED: {} {}", job_id, message);

        let update = StatusUpdate::Failed { error: message };
        if let Err(e) = self.store.set_status(job_id, &update).await {
            error!("Failed to mark scan {} failed: {}", job_id, e);
        }
    }
}

/// Error text stored on a failed scan
///
/// The error itself, plus the last part of the pipeline log (newlines
/// flattened) when one was captured, cut to [`MAX_ERROR_CHARS`].
pub fn failure_message(err: &ScanError, log: Option<&str>) -> String {
    let mut message = err.to_string();
    if let Some(log) = log.filter(|l| !l.is_empty()) {
        let tail = tail_chars(log, ERROR_LOG_TAIL_CHARS).replace('\n', " | ");
        message = format!("{} | tail: {}", message, tail);
    }
    head_chars(&message, MAX_ERROR_CHARS).to_string()
}
