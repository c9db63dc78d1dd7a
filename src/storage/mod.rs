//! Blob storage for input bundles and finished meshes
//!
//! - BlobStore: signed URLs, upserting uploads and folder listing
//! - SupabaseStorage: BlobStore over the Supabase Storage REST API
//! - ArtifactTransfer: job-level download/upload with read-your-write verification

pub mod supabase;
pub mod transfer;

pub use supabase::SupabaseStorage;
pub use transfer::ArtifactTransfer;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// File name of the converted mesh, locally and in the result bucket
pub const RESULT_FILE: &str = "result.stl";

/// Content type for uploaded results
pub const STL_CONTENT_TYPE: &str = "model/stl";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Absolute URL that grants read access to a private object for `expires_in`
    async fn create_signed_url(&self, bucket: &str, path: &str, expires_in: Duration)
        -> Result<String>;

    /// Upload `bytes`, overwriting whatever is stored at `path`
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<()>;

    /// Names of the objects directly inside `folder`
    async fn list(&self, bucket: &str, folder: &str) -> Result<Vec<String>>;
}

/// Remote location of a scan's result: `users/{user}/{scan}/result.stl`, lower-cased
pub fn result_object_path(user_id: &str, job_id: &str) -> String {
    format!(
        "users/{}/{}/{}",
        user_id.to_lowercase(),
        job_id.to_lowercase(),
        RESULT_FILE
    )
}

/// Split an object path into its parent folder and file name
pub(crate) fn split_object_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((folder, name)) => (folder, name),
        None => ("", path),
    }
}
