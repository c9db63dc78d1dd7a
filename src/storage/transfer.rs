//! Job-level artifact transfer: input bundle download and verified result upload

use crate::error::{Result, ScanError};
use crate::storage::{split_object_path, BlobStore, STL_CONTENT_TYPE};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Moves bundles in and results out of blob storage
#[derive(Clone)]
pub struct ArtifactTransfer {
    blobs: Arc<dyn BlobStore>,
    http: Client,
    input_bucket: String,
    result_bucket: String,
    signed_url_ttl: Duration,
}

impl ArtifactTransfer {
    /// Create a transfer over `blobs`; downloads give up after `download_timeout`
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        input_bucket: &str,
        result_bucket: &str,
        signed_url_ttl: Duration,
        download_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| ScanError::TransferError {
                context: "Failed to build HTTP client".to_string(),
                source: e,
            })?;

        Ok(Self {
            blobs,
            http,
            input_bucket: input_bucket.to_string(),
            result_bucket: result_bucket.to_string(),
            signed_url_ttl,
        })
    }

    /// Download the private object at `remote_path` to `dest`
    ///
    /// The body is written chunk by chunk as it arrives. Any transport error
    /// or non-success status fails the whole download; there is no resume.
    pub async fn download_input(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        let url = self
            .blobs
            .create_signed_url(&self.input_bucket, remote_path, self.signed_url_ttl)
            .await?;
        debug!("Signed URL issued for {}/{}", self.input_bucket, remote_path);

        let context = format!("Download of {}", remote_path);
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ScanError::TransferError {
                context: context.clone(),
                source: e.without_url(),
            })?;

        if !response.status().is_success() {
            return Err(ScanError::HttpStatusError {
                context,
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ScanError::TransferError {
                context: context.clone(),
                source: e.without_url(),
            })?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Downloaded {} ({} bytes)", remote_path, written);
        Ok(written)
    }

    /// Upload `local_file` to `remote_path` in the result bucket and confirm it is listed
    pub async fn upload_result(&self, local_file: &Path, remote_path: &str) -> Result<()> {
        let bytes = tokio::fs::read(local_file).await?;
        let size = bytes.len();

        self.blobs
            .upload(&self.result_bucket, remote_path, bytes, STL_CONTENT_TYPE)
            .await?;
        debug!("Uploaded {} bytes to {}/{}", size, self.result_bucket, remote_path);

        // A successful upload response is not trusted on its own
        let (folder, file_name) = split_object_path(remote_path);
        let names = self.blobs.list(&self.result_bucket, folder).await?;
        if !names.iter().any(|name| name == file_name) {
            return Err(ScanError::UploadVerification {
                file: file_name.to_string(),
                bucket: self.result_bucket.clone(),
            });
        }

        info!("Verified {}/{}", self.result_bucket, remote_path);
        Ok(())
    }

    pub fn input_bucket(&self) -> &str {
        &self.input_bucket
    }

    pub fn result_bucket(&self) -> &str {
        &self.result_bucket
    }
}
