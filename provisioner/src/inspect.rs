//! Read-only library renderings.
//!
//! Listings run inside the library directory and their stdout is captured
//! into a bounded [`CaptureBuffer`] while the command is still producing it.

use crate::capture::{CaptureBuffer, DEFAULT_CAPTURE_LIMIT};
use crate::error::{InspectError, WorkloadError};
use crate::workload::{ExecCommand, Workload};
use camino::Utf8Path;
use log::debug;
use std::fmt;
use std::str::FromStr;

/// Output format of a library listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryInfoFormat {
    /// Recursive tree rendering (`tree`).
    Tree,
    /// One name per line, top level only (`ls -1`).
    Ls1,
}

impl LibraryInfoFormat {
    /// Every supported format.
    pub const ALL: [Self; 2] = [Self::Tree, Self::Ls1];

    /// Returns the parameter spelling of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Ls1 => "ls-1",
        }
    }

    /// Builds the listing command for `target_dir`.
    #[must_use]
    pub fn command(self, target_dir: &Utf8Path) -> ExecCommand {
        let command = match self {
            Self::Tree => ExecCommand::new("tree"),
            Self::Ls1 => ExecCommand::new("ls").arg("-1"),
        };
        command.working_dir(target_dir)
    }
}

impl fmt::Display for LibraryInfoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryInfoFormat {
    type Err = InspectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == value)
            .ok_or_else(|| InspectError::UnsupportedFormat {
                value: value.to_owned(),
            })
    }
}

/// Renders the contents of a library directory.
pub struct Inspector<'a> {
    workload: &'a dyn Workload,
    capture_limit: usize,
}

impl<'a> Inspector<'a> {
    /// Creates an inspector with the default 4 MiB capture limit.
    #[must_use]
    pub const fn new(workload: &'a dyn Workload) -> Self {
        Self {
            workload,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Overrides the capture limit.
    #[must_use]
    pub const fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Lists `target_dir` in the requested `format`.
    ///
    /// Returns the captured stdout with lines joined by `\n`.
    ///
    /// # Errors
    ///
    /// - [`InspectError::UnsupportedFormat`] if `format` is not `tree` or
    ///   `ls-1`; nothing is executed in that case.
    /// - [`InspectError::LibraryTooLarge`] if the output exceeds the capture
    ///   limit.
    /// - [`InspectError::CommandFailed`] if the listing exits nonzero.
    /// - [`InspectError::Workload`] for any other workload failure.
    pub fn inspect(&self, target_dir: &Utf8Path, format: &str) -> Result<String, InspectError> {
        let format: LibraryInfoFormat = format.parse()?;
        let command = format.command(target_dir);
        debug!("inspecting {target_dir}: {command}");

        let mut buffer = CaptureBuffer::with_limit(self.capture_limit);
        let result = self.workload.exec(&command, &mut buffer);
        if buffer.overflowed() {
            debug!("{command} produced more than {} bytes", buffer.limit());
            return Err(InspectError::LibraryTooLarge {
                limit: buffer.limit(),
            });
        }

        let output = match result {
            Ok(output) => output,
            Err(WorkloadError::OutputRejected { source, .. })
                if source.kind() == std::io::ErrorKind::OutOfMemory =>
            {
                return Err(InspectError::LibraryTooLarge {
                    limit: buffer.limit(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !output.success() {
            return Err(InspectError::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_owned(),
            });
        }
        Ok(buffer.joined_lines())
    }
}
