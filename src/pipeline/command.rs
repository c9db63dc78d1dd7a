//! Configured external command lines

use crate::error::{Result, ScanError};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::process::Command;

/// Program plus leading arguments, e.g. `bash pipeline.sh`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build a process invocation with `paths` appended as positional arguments
    pub fn to_command(&self, paths: &[&Path]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).args(paths);
        command
    }
}

impl FromStr for ExternalCommand {
    type Err = ScanError;

    /// Split on whitespace; no shell quoting is interpreted
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ScanError::InvalidCommand("command line is empty".to_string()))?;

        Ok(Self::new(program, parts))
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
