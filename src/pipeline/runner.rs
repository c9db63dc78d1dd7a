//! Reconstruction pipeline runner

use crate::error::{Result, ScanError};
use crate::pipeline::{exit_code, ExternalCommand, LogBuffer};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Lines buffered between the output readers and the log collector.
/// A full queue stalls the readers, and the pipe then stalls the child.
const LINE_QUEUE_CAPACITY: usize = 1024;

/// How the pipeline process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Exited(i32),
    /// Killed after exceeding the configured wall-clock limit
    TimedOut(Duration),
}

/// Finished pipeline run; the log is kept whatever the outcome
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outcome: RunOutcome,
    pub log: String,
}

impl PipelineRun {
    pub fn success(&self) -> bool {
        self.outcome == RunOutcome::Exited(0)
    }

    /// Turn a non-zero exit or a timeout into an error
    pub fn check(&self) -> Result<()> {
        match self.outcome {
            RunOutcome::Exited(0) => Ok(()),
            RunOutcome::Exited(code) => Err(ScanError::PipelineExit(code)),
            RunOutcome::TimedOut(limit) => Err(ScanError::PipelineTimeout(limit.as_secs())),
        }
    }
}

/// Runs the external pipeline as `<command> <images_dir> <out_dir>`
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    command: ExternalCommand,
    max_log_chars: usize,
    timeout: Option<Duration>,
}

impl PipelineRunner {
    pub fn new(command: ExternalCommand, max_log_chars: usize, timeout: Option<Duration>) -> Self {
        Self {
            command,
            max_log_chars,
            timeout,
        }
    }

    /// Run to completion, echoing every output line as it arrives
    ///
    /// stdout and stderr are merged in arrival order into one bounded log.
    /// Only a failure to start the process is an `Err`; exit status and
    /// timeout are reported through [`PipelineRun`].
    pub async fn run(&self, images_dir: &Path, out_dir: &Path) -> Result<PipelineRun> {
        let mut command = self.command.to_command(&[images_dir, out_dir]);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            "Running pipeline: {} {} {}",
            self.command,
            images_dir.display(),
            out_dir.display()
        );
        let mut child = command.spawn().map_err(|e| ScanError::SpawnError {
            program: self.command.program().to_string(),
            source: e,
        })?;

        let (tx, mut rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut buffer = LogBuffer::new(self.max_log_chars);
        let collect = async {
            while let Some(line) = rx.recv().await {
                info!(target: "pipeline", "{}", line);
                buffer.push(line);
            }
            child.wait().await
        };

        let outcome = match self.timeout {
            None => RunOutcome::Exited(exit_code(collect.await?)),
            Some(limit) => {
                let waited = tokio::time::timeout(limit, collect).await;
                match waited {
                    Ok(status) => RunOutcome::Exited(exit_code(status?)),
                    Err(_elapsed) => {
                        warn!("Pipeline exceeded {:?}, killing it", limit);
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill pipeline: {}", e);
                        }
                        // Whatever was read before the kill still belongs in the log
                        while let Ok(line) = rx.try_recv() {
                            buffer.push(line);
                        }
                        RunOutcome::TimedOut(limit)
                    }
                }
            }
        };

        match outcome {
            RunOutcome::Exited(code) => info!("Pipeline exited with code {}", code),
            RunOutcome::TimedOut(limit) => warn!("Pipeline timed out after {:?}", limit),
        }

        Ok(PipelineRun {
            outcome,
            log: buffer.into_text(),
        })
    }
}

/// Send each line of `reader` down `tx`; invalid UTF-8 is replaced, not rejected
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read pipeline output: {}", e);
                break;
            }
        }
    }
}
