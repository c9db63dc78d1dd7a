//! Worker configuration

use crate::pipeline::ExternalCommand;
use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll interval when no scans are waiting
    pub poll_interval: Duration,

    /// Bucket holding uploaded photo bundles
    pub bucket_zips: String,

    /// Bucket receiving converted meshes
    pub bucket_results: String,

    /// Characters of pipeline output persisted to `log_text`
    pub max_log_chars: usize,

    pub pipeline_command: ExternalCommand,

    pub converter_command: ExternalCommand,

    /// Wall-clock limit for the pipeline; `None` waits indefinitely
    pub pipeline_timeout: Option<Duration>,

    /// Validity of the signed URL used to fetch a bundle
    pub signed_url_ttl: Duration,

    pub download_timeout: Duration,

    /// Parent of per-scan working directories; system temp when unset
    pub work_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            bucket_zips: "scan-zips".to_string(),
            bucket_results: "scan-results".to_string(),
            max_log_chars: 20_000,
            pipeline_command: ExternalCommand::new("bash", ["pipeline.sh"]),
            converter_command: ExternalCommand::new("python3", ["convert_to_stl.py"]),
            pipeline_timeout: None,
            signed_url_ttl: Duration::from_secs(300),
            download_timeout: Duration::from_secs(300),
            work_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set poll interval
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self
    }

    pub fn bucket_zips(mut self, bucket: &str) -> Self {
        self.config.bucket_zips = bucket.to_string();
        self
    }

    pub fn bucket_results(mut self, bucket: &str) -> Self {
        self.config.bucket_results = bucket.to_string();
        self
    }

    pub fn max_log_chars(mut self, chars: usize) -> Self {
        self.config.max_log_chars = chars;
        self
    }

    pub fn pipeline_command(mut self, command: ExternalCommand) -> Self {
        self.config.pipeline_command = command;
        self
    }

    pub fn converter_command(mut self, command: ExternalCommand) -> Self {
        self.config.converter_command = command;
        self
    }

    /// Set pipeline timeout; `None` disables it
    pub fn pipeline_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pipeline_timeout = timeout;
        self
    }

    pub fn signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.config.signed_url_ttl = ttl;
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout;
        self
    }

    pub fn work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.work_dir = dir;
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
