//! Scan Worker - drains the `scans` queue and turns photo bundles into STL meshes
//!
//! For each uploaded scan the worker claims it, downloads and unpacks the
//! photo bundle, runs the external reconstruction pipeline, converts the
//! resulting mesh to STL, uploads it and records the terminal status.
//!
//! The queue and blob storage sit behind the [`JobStore`] and [`BlobStore`]
//! traits so the worker loop can run against in-memory stores in tests.

pub mod bundle;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod truncate;
pub mod worker;

pub use db::{JobStatus, JobStore, PgJobStore, ScanJob, StatusUpdate};
pub use error::{Result, ScanError};
pub use pipeline::{ExternalCommand, LogBuffer, MeshConverter, PipelineRunner};
pub use storage::{result_object_path, ArtifactTransfer, BlobStore, SupabaseStorage};
pub use worker::{ScanProcessor, ScanRunner, WorkerConfig};
