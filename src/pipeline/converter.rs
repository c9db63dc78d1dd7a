//! Mesh format conversion step

use crate::error::{Result, ScanError};
use crate::pipeline::{exit_code, ExternalCommand};
use std::path::Path;
use std::process::Stdio;
use tracing::{info, warn};

/// Runs the converter as `<command> <mesh_file> <out_file>`
#[derive(Debug, Clone)]
pub struct MeshConverter {
    command: ExternalCommand,
}

impl MeshConverter {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }

    /// Convert `mesh_file` into `out_file`
    ///
    /// A zero exit only means the tool did not complain; callers still
    /// check that `out_file` exists.
    pub async fn convert(&self, mesh_file: &Path, out_file: &Path) -> Result<()> {
        info!("Converting {} -> {}", mesh_file.display(), out_file.display());

        let output = self
            .command
            .to_command(&[mesh_file, out_file])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScanError::SpawnError {
                program: self.command.program().to_string(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines().chain(stderr.lines()) {
            info!(target: "converter", "{}", line);
        }

        if !output.status.success() {
            let code = exit_code(output.status);
            warn!("Converter exited with code {}", code);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| format!(": {}", l.trim()))
                .unwrap_or_default();
            return Err(ScanError::ConversionExit { code, detail });
        }

        Ok(())
    }
}
