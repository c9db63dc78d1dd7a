//! Models for the `scans` table

use crate::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

/// ScanJob - one row of the scans table
///
/// `log_text` is not selected: the column may be absent in deployed
/// schemas and is only ever written.
#[derive(Debug, Clone, FromRow)]
pub struct ScanJob {
    pub id: String,
    pub status: String,
    pub zip_path: Option<String>,
    pub user_id: Option<String>,
    pub stl_path: Option<String>,
    pub error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields a job must carry before any work is started on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobInputs<'a> {
    pub zip_path: &'a str,
    pub user_id: &'a str,
}

impl ScanJob {
    /// Parsed status, `None` for values outside the known state machine
    pub fn job_status(&self) -> Option<JobStatus> {
        self.status.parse().ok()
    }

    /// Validate required fields; empty strings count as missing
    pub fn inputs(&self) -> Result<JobInputs<'_>> {
        let zip_path = self.zip_path.as_deref().filter(|s| !s.is_empty());
        let user_id = self.user_id.as_deref().filter(|s| !s.is_empty());

        match (zip_path, user_id) {
            (Some(zip_path), Some(user_id)) => Ok(JobInputs { zip_path, user_id }),
            _ => Err(ScanError::InvalidJob(
                "Missing zip_path or user_id".to_string(),
            )),
        }
    }
}

/// Scan status. Moves forward only: uploaded -> processing -> complete | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Uploaded,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploaded" => Ok(JobStatus::Uploaded),
            "processing" => Ok(JobStatus::Processing),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ScanError::InvalidJob(format!("Unknown scan status: {}", other))),
        }
    }
}

/// Terminal field updates applied to a claimed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Result uploaded; clears any stale error
    Complete { stl_path: String },
    Failed { error: String },
}

impl StatusUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            StatusUpdate::Complete { .. } => JobStatus::Complete,
            StatusUpdate::Failed { .. } => JobStatus::Failed,
        }
    }
}
