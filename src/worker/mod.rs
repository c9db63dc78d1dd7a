//! Worker module for draining the scan queue
//!
//! This module provides:
//! - ScanRunner: Main worker loop that polls, claims and finalizes scans
//! - ScanProcessor: Drives one claimed scan from bundle download to verified upload
//! - CurrentJob: Process-wide marker of the scan in flight
//! - Termination handling: marks the in-flight scan failed when the process is signalled
//! - WorkerConfig: Configuration for the worker

pub mod config;
pub mod current_job;
pub mod processor;
pub mod runner;
pub mod termination;

pub use config::WorkerConfig;
pub use current_job::{CurrentJob, CurrentJobGuard};
pub use processor::{ProcessOutcome, ScanProcessor};
pub use runner::{failure_message, ScanRunner};
pub use termination::{
    finalize_job, run_until_terminated, Terminated, TerminationSignals, TERMINATION_MESSAGE,
};
