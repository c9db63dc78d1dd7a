//! Input bundle unpacking

use crate::error::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Extract `zip_file` into `dest` on the blocking pool and return the number of JPEG images
///
/// Entries whose names would resolve outside `dest` are rejected.
pub async fn unpack(zip_file: &Path, dest: &Path) -> Result<usize> {
    let zip_file = zip_file.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<usize> {
        std::fs::create_dir_all(&dest)?;
        let mut archive = ZipArchive::new(File::open(&zip_file)?)?;
        archive.extract(&dest)?;
        Ok(count_images(&dest))
    })
    .await?
}

/// Count `.jpg`/`.jpeg` files (any case) under `dir`, recursively
pub fn count_images(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_jpeg(entry.path()))
        .count()
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}
