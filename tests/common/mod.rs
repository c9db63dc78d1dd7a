//! Shared fixtures for integration tests: in-memory queue and blob stores,
//! a tiny HTTP server for signed downloads, zip builders and script stand-ins
//! for the external pipeline and converter.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use scan_worker::db::{JobStatus, JobStore, ScanJob, StatusUpdate};
use scan_worker::error::{Result, ScanError};
use scan_worker::storage::{ArtifactTransfer, BlobStore};
use scan_worker::worker::{ScanProcessor, ScanRunner, WorkerConfig};
use scan_worker::ExternalCommand;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ============================================================================
// Job store
// ============================================================================

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<ScanJob>>,
    logs: Mutex<HashMap<String, String>>,
    claims: Mutex<Vec<String>>,
    /// save_log fails, as when the log_text column is missing
    pub fail_log_writes: AtomicBool,
    /// Another consumer wins every claim race
    pub steal_on_claim: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: ScanJob) {
        self.jobs.lock().unwrap().push(job);
    }

    pub fn get(&self, id: &str) -> Option<ScanJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.get(id).and_then(|j| j.job_status())
    }

    pub fn log_text(&self, id: &str) -> Option<String> {
        self.logs.lock().unwrap().get(id).cloned()
    }

    pub fn claims(&self) -> Vec<String> {
        self.claims.lock().unwrap().clone()
    }
}

/// An `uploaded` scan created `age_secs` ago
pub fn uploaded_job(id: &str, zip_path: Option<&str>, user_id: Option<&str>, age_secs: i64) -> ScanJob {
    ScanJob {
        id: id.to_string(),
        status: JobStatus::Uploaded.as_str().to_string(),
        zip_path: zip_path.map(String::from),
        user_id: user_id.map(String::from),
        stl_path: None,
        error: Some("stale error from a previous attempt".to_string()),
        created_at: Some(Utc::now() - ChronoDuration::seconds(age_secs)),
    }
}

/// The forward-only moves the SQL guards in `PgJobStore` allow
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Uploaded, Processing)
            | (Processing, Complete)
            | (Complete, Complete)
            | (Uploaded, Failed)
            | (Processing, Failed)
            | (Failed, Failed)
    )
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch_next_candidate(&self) -> Result<Option<ScanJob>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| j.job_status() == Some(JobStatus::Uploaded))
            .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            .cloned())
    }

    async fn claim(&self, id: &str) -> Result<bool> {
        self.claims.lock().unwrap().push(id.to_string());
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        if job.job_status() != Some(JobStatus::Uploaded) {
            return Ok(false);
        }

        job.status = JobStatus::Processing.as_str().to_string();
        if self.steal_on_claim.load(Ordering::SeqCst) {
            // Someone else moved it first
            return Ok(false);
        }
        job.error = None;
        Ok(true)
    }

    async fn set_status(&self, id: &str, update: &StatusUpdate) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(());
        };
        let allowed = job
            .job_status()
            .map(|s| can_transition(s, update.status()))
            .unwrap_or(false);
        if !allowed {
            return Ok(());
        }

        job.status = update.status().as_str().to_string();
        match update {
            StatusUpdate::Complete { stl_path } => {
                job.stl_path = Some(stl_path.clone());
                job.error = None;
            }
            StatusUpdate::Failed { error } => job.error = Some(error.clone()),
        }
        Ok(())
    }

    async fn save_log(&self, id: &str, log_text: &str) -> Result<()> {
        if self.fail_log_writes.load(Ordering::SeqCst) {
            return Err(ScanError::StorageError(
                "column \"log_text\" of relation \"scans\" does not exist".to_string(),
            ));
        }
        self.logs
            .lock()
            .unwrap()
            .insert(id.to_string(), log_text.to_string());
        Ok(())
    }
}

// ============================================================================
// Blob store + signed-URL server
// ============================================================================

type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

pub struct MemoryBlobStore {
    objects: Objects,
    content_types: Mutex<HashMap<String, String>>,
    base_url: String,
    /// Uploads report success but store nothing
    pub drop_uploads: AtomicBool,
}

impl MemoryBlobStore {
    /// Start the download server on an ephemeral local port
    pub async fn start() -> Arc<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let objects: Objects = Arc::default();
        tokio::spawn(serve(listener, Arc::clone(&objects)));

        Arc::new(Self {
            objects,
            content_types: Mutex::default(),
            base_url,
            drop_uploads: AtomicBool::new(false),
        })
    }

    pub fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, path), bytes);
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, path))
            .cloned()
    }

    pub fn content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.content_types
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, path))
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_signed_url(&self, bucket: &str, path: &str, _expires_in: Duration) -> Result<String> {
        Ok(format!("{}/{}/{}?token=test", self.base_url, bucket, path))
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        if self.drop_uploads.load(Ordering::SeqCst) {
            return Ok(());
        }
        let key = format!("{}/{}", bucket, path);
        self.objects.lock().unwrap().insert(key.clone(), bytes);
        self.content_types
            .lock()
            .unwrap()
            .insert(key, content_type.to_string());
        Ok(())
    }

    async fn list(&self, bucket: &str, folder: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/{}/", bucket, folder);
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .map(String::from)
            .collect())
    }
}

/// Minimal HTTP/1.1 responder: `GET /{bucket}/{path}` returns the stored bytes or 404
async fn serve(listener: TcpListener, objects: Objects) {
    while let Ok((mut socket, _)) = listener.accept().await {
        let objects = Arc::clone(&objects);
        tokio::spawn(async move {
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }

            let request = String::from_utf8_lossy(&request);
            let target = request.split_whitespace().nth(1).unwrap_or("/");
            let key = target
                .trim_start_matches('/')
                .split('?')
                .next()
                .unwrap_or_default()
                .to_string();

            let body = objects.lock().unwrap().get(&key).cloned();
            let (status, body) = match body {
                Some(bytes) => ("200 OK", bytes),
                None => ("404 Not Found", b"not found".to_vec()),
            };
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Zip archive bytes containing `entries`
pub fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// A bundle with `n` JPEG photos
pub fn photo_zip(n: usize) -> Vec<u8> {
    let names: Vec<String> = (0..n).map(|i| format!("IMG_{:04}.jpg", i)).collect();
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"\xff\xd8\xff"[..])).collect();
    make_zip(&entries)
}

/// Write `body` as a shell script and return a command that runs it
pub fn script(dir: &Path, name: &str, body: &str) -> ExternalCommand {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    ExternalCommand::new("sh", [path.to_string_lossy().into_owned()])
}

pub const PIPELINE_OK: &str = r#"
echo "reconstructing $(ls "$1" | wc -l) images"
echo "ply" > "$2/mesh.ply"
"#;

pub const CONVERTER_OK: &str = r#"
echo "solid result" > "$2"
"#;

/// Everything a worker needs, backed by in-memory stores
pub struct TestWorld {
    pub store: Arc<MemoryJobStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub scripts: TempDir,
    pub work_root: TempDir,
}

impl TestWorld {
    pub async fn new() -> Self {
        Self {
            store: Arc::new(MemoryJobStore::new()),
            blobs: MemoryBlobStore::start().await,
            scripts: tempfile::tempdir().unwrap(),
            work_root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn script(&self, name: &str, body: &str) -> ExternalCommand {
        script(self.scripts.path(), name, body)
    }

    pub fn config(&self, pipeline: &str, converter: &str) -> WorkerConfig {
        WorkerConfig::builder()
            .poll_interval(Duration::from_millis(10))
            .pipeline_command(self.script("pipeline.sh", pipeline))
            .converter_command(self.script("convert.sh", converter))
            .work_dir(Some(self.work_root.path().to_path_buf()))
            .build()
    }

    pub fn runner(&self, config: WorkerConfig) -> ScanRunner {
        let store: Arc<dyn JobStore> = self.store.clone();
        let transfer = ArtifactTransfer::new(
            self.blobs.clone(),
            &config.bucket_zips,
            &config.bucket_results,
            config.signed_url_ttl,
            config.download_timeout,
        )
        .unwrap();
        let processor = ScanProcessor::new(Arc::clone(&store), transfer, config.clone());
        ScanRunner::new(store, processor, config)
    }

    /// Per-scan working directories still present under the work root
    pub fn leftover_workdirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_root.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

/// Poll until `path` holds a pid written by a script
pub async fn wait_for_pid(path: &Path) -> u32 {
    for _ in 0..500 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no pid written to {}", path.display());
}

/// Whether `pid` has exited within a few seconds (reaped or zombie); reads /proc
pub async fn process_gone(pid: u32) -> bool {
    for _ in 0..250 {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => return true,
            Ok(stat) => {
                // State follows the parenthesised command name
                let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                if state.starts_with('Z') || state.starts_with('X') {
                    return true;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Pipeline that records its pid and then hangs
pub fn hanging_pipeline(pidfile: &Path) -> String {
    format!("echo $$ > '{}'\nexec sleep 30\n", pidfile.display())
}
