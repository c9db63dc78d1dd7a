//! External reconstruction and conversion steps
//!
//! This module provides:
//! - ExternalCommand: a configured command line that gets positional paths appended
//! - LogBuffer: bounded tail of captured output lines
//! - PipelineRunner: runs the reconstruction pipeline, streaming and capturing its output
//! - MeshConverter: runs the mesh-to-STL conversion step

pub mod command;
pub mod converter;
pub mod log_buffer;
pub mod runner;

pub use command::ExternalCommand;
pub use converter::MeshConverter;
pub use log_buffer::LogBuffer;
pub use runner::{PipelineRun, PipelineRunner, RunOutcome};

/// Mesh the pipeline must leave in its output directory
pub const MESH_FILE: &str = "mesh.ply";

/// Numeric exit code; processes killed by a signal report the negated signal number
pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}
