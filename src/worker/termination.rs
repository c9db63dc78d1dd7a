//! Termination handling: cancel the in-flight scan and mark it failed

use crate::db::{JobStore, StatusUpdate};
use crate::worker::CurrentJob;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Error stored on a scan whose worker was killed mid-job
pub const TERMINATION_MESSAGE: &str =
    "Worker terminated (SIGTERM/SIGINT). Likely OOM / memory limit.";

/// Upper bound on the single store write made while the process is going down
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why [`run_until_terminated`] stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminated {
    pub signal: &'static str,
    /// Scan that was current when the signal arrived
    pub job_id: Option<String>,
    /// Whether the failed status was written
    pub marked: bool,
}

/// SIGINT and SIGTERM listeners (Ctrl-C on non-Unix)
///
/// Registering replaces the default disposition, so do it before any work
/// that must not be interrupted without cleanup.
pub struct TerminationSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its name
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        "Ctrl+C"
    }
}

/// Drive `work` until it finishes or `shutdown` resolves
///
/// On shutdown, `work` is dropped before anything else happens: the scan's
/// working directory is removed and its child processes are killed. The scan
/// that was current when the signal arrived is then marked failed with
/// [`TERMINATION_MESSAGE`] in a single bounded attempt.
pub async fn run_until_terminated<W, S>(
    work: W,
    shutdown: S,
    store: &dyn JobStore,
    current: &CurrentJob,
) -> std::result::Result<W::Output, Terminated>
where
    W: Future,
    S: Future<Output = &'static str>,
{
    // The id is read inside the shutdown branch; dropping `work` clears the marker
    let shutdown = async {
        let signal = shutdown.await;
        (signal, current.get())
    };

    let (signal, job_id) = tokio::select! {
        output = work => return Ok(output),
        interrupted = shutdown => interrupted,
    };

    warn!("Received {}, in-flight scan cancelled", signal);
    let marked = match &job_id {
        Some(id) => finalize_job(store, id).await,
        None => false,
    };

    Err(Terminated {
        signal,
        job_id,
        marked,
    })
}

/// Mark `id` failed with [`TERMINATION_MESSAGE`]; exactly one attempt
pub async fn finalize_job(store: &dyn JobStore, id: &str) -> bool {
    let update = StatusUpdate::Failed {
        error: TERMINATION_MESSAGE.to_string(),
    };

    match tokio::time::timeout(FINALIZE_TIMEOUT, store.set_status(id, &update)).await {
        Ok(Ok(())) => {
            info!("Marked scan failed due to termination: {}", id);
            true
        }
        Ok(Err(e)) => {
            error!("Failed to mark scan failed on termination: {}", e);
            false
        }
        Err(_) => {
            error!(
                "Timed out after {:?} marking scan {} failed on termination",
                FINALIZE_TIMEOUT, id
            );
            false
        }
    }
}
