//! Scan processor: one claimed scan from bundle download to verified upload

use crate::bundle;
use crate::db::{JobInputs, JobStore};
use crate::error::{Result, ScanError};
use crate::pipeline::{MeshConverter, PipelineRunner, MESH_FILE};
use crate::storage::{result_object_path, ArtifactTransfer, RESULT_FILE};
use crate::truncate::tail_chars;
use crate::worker::WorkerConfig;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{info, warn};

/// Result of processing one scan
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Remote result path on success
    pub result: Result<String>,
    /// Captured pipeline output, present once the pipeline has run
    pub pipeline_log: Option<String>,
}

/// Runs the per-scan steps inside a scoped working directory
pub struct ScanProcessor {
    store: Arc<dyn JobStore>,
    transfer: ArtifactTransfer,
    pipeline: PipelineRunner,
    converter: MeshConverter,
    config: WorkerConfig,
}

impl ScanProcessor {
    pub fn new(store: Arc<dyn JobStore>, transfer: ArtifactTransfer, config: WorkerConfig) -> Self {
        let pipeline = PipelineRunner::new(
            config.pipeline_command.clone(),
            config.max_log_chars,
            config.pipeline_timeout,
        );
        let converter = MeshConverter::new(config.converter_command.clone());

        Self {
            store,
            transfer,
            pipeline,
            converter,
            config,
        }
    }

    /// Process a claimed scan
    ///
    /// The working directory is gone by the time this returns, on every path.
    pub async fn process(&self, job_id: &str, inputs: &JobInputs<'_>) -> ProcessOutcome {
        let mut pipeline_log = None;

        let result = match self.create_workspace() {
            Ok(workspace) => {
                let result = self
                    .run_steps(job_id, inputs, workspace.path(), &mut pipeline_log)
                    .await;

                let path = workspace.path().to_path_buf();
                if let Err(e) = workspace.close() {
                    warn!("Failed to remove working directory {}: {}", path.display(), e);
                }
                result
            }
            Err(e) => Err(e),
        };

        ProcessOutcome {
            result,
            pipeline_log,
        }
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scan_");

        let dir = match &self.config.work_dir {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn run_steps(
        &self,
        job_id: &str,
        inputs: &JobInputs<'_>,
        workdir: &Path,
        pipeline_log: &mut Option<String>,
    ) -> Result<String> {
        // Step 1: Download the input bundle
        let zip_file = workdir.join("scan.zip");
        info!("Downloading: {}", inputs.zip_path);
        self.transfer.download_input(inputs.zip_path, &zip_file).await?;

        // Step 2: Unpack
        let extract_dir = workdir.join("extract");
        let jpg_count = bundle::unpack(&zip_file, &extract_dir).await?;
        info!("Extracted JPGs: {}", jpg_count);

        let out_dir = workdir.join("out");
        tokio::fs::create_dir_all(&out_dir).await?;

        // Step 3: Run the reconstruction pipeline
        info!("Running reconstruction pipeline...");
        let run = self.pipeline.run(&extract_dir, &out_dir).await?;
        let checked = run.check();
        *pipeline_log = Some(run.log);
        checked?;

        // Kept even on success for later inspection
        if let Some(log) = pipeline_log.as_deref() {
            self.save_log(job_id, log).await;
        }

        // Step 4: The pipeline must have produced a mesh
        let mesh_file = out_dir.join(MESH_FILE);
        if !file_exists(&mesh_file).await {
            return Err(ScanError::MissingArtifact(MESH_FILE.to_string()));
        }

        // Step 5: Convert to STL
        info!("Converting to STL...");
        let stl_file = out_dir.join(RESULT_FILE);
        self.converter.convert(&mesh_file, &stl_file).await?;
        if !file_exists(&stl_file).await {
            return Err(ScanError::MissingArtifact(RESULT_FILE.to_string()));
        }

        // Step 6: Upload and verify
        let remote_path = result_object_path(inputs.user_id, job_id);
        info!("Uploading STL to: {}", remote_path);
        self.transfer.upload_result(&stl_file, &remote_path).await?;

        Ok(remote_path)
    }

    /// Persist the tail of `log` to `log_text`; failures are logged and swallowed
    pub async fn save_log(&self, job_id: &str, log: &str) {
        let tail = tail_chars(log, self.config.max_log_chars);
        if let Err(e) = self.store.save_log(job_id, tail).await {
            warn!("Could not write log_text for scan {}: {}", job_id, e);
        }
    }

    pub fn transfer(&self) -> &ArtifactTransfer {
        &self.transfer
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
