//! Extraction and layout normalization.
//!
//! The archive is pushed into the library directory and unpacked by an
//! external extraction tool, which always creates a directory named after
//! the archive stem. That directory is flattened into the library root,
//! followed by one more flatten of a `Calibre Library` wrapper folder when
//! the archive nested its payload in one. Every step runs to completion
//! before the next is issued and the first failure aborts the run.

use crate::error::PipelineError;
use crate::workload::{ExecCommand, FileKind, Workload};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::collections::HashMap;

/// Name the archive is pushed under inside the library directory.
pub const ARCHIVE_FILE_NAME: &str = "library.zip";

/// Conventional wrapper folder some library archives nest their payload in.
pub const WRAPPER_DIR_NAME: &str = "Calibre Library";

/// The external, format-agnostic extraction command.
///
/// The archive file name is appended as the final argument and the command
/// runs with the library directory as its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionTool {
    program: String,
    args: Vec<String>,
}

impl ExtractionTool {
    /// Creates a tool invocation of `program` with fixed leading `args`.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `dtrx`, run non-interactively and overwriting existing output.
    #[must_use]
    pub fn dtrx() -> Self {
        Self::new("dtrx", ["--noninteractive", "--overwrite"])
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Builds the command that extracts `archive_name` inside `working_dir`.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibre_library_provisioner::pipeline::ExtractionTool;
    ///
    /// let command = ExtractionTool::dtrx().command_for("library.zip", "/books");
    /// assert_eq!(command.to_string(), "dtrx --noninteractive --overwrite library.zip");
    /// ```
    #[must_use]
    pub fn command_for(
        &self,
        archive_name: &str,
        working_dir: impl Into<Utf8PathBuf>,
    ) -> ExecCommand {
        ExecCommand::new(self.program.as_str())
            .args(self.args.iter().map(String::as_str))
            .arg(archive_name)
            .working_dir(working_dir)
    }
}

impl Default for ExtractionTool {
    fn default() -> Self {
        Self::dtrx()
    }
}

/// Unpacks library archives into a canonical flat layout.
pub struct LibraryPipeline<'a> {
    workload: &'a dyn Workload,
    tool: ExtractionTool,
}

impl<'a> LibraryPipeline<'a> {
    /// Creates a pipeline that uses `dtrx` on the given workload.
    #[must_use]
    pub fn new(workload: &'a dyn Workload) -> Self {
        Self {
            workload,
            tool: ExtractionTool::default(),
        }
    }

    /// Replaces the extraction tool.
    #[must_use]
    pub fn with_extraction_tool(mut self, tool: ExtractionTool) -> Self {
        self.tool = tool;
        self
    }

    /// Unpacks `archive` into `target_dir` and normalizes the layout.
    ///
    /// After success, the direct children of `target_dir` are the library's
    /// top-level entries; neither the extraction root, the wrapper folder,
    /// nor the pushed archive remain. The archive is removed before
    /// flattening, so an entry sharing its name is kept.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Extraction`] if the extraction tool exits nonzero.
    /// - [`PipelineError::DirectoryCollision`] if flattening would move a
    ///   directory onto an existing entry.
    /// - [`PipelineError::NameClash`] if the archive's top level holds an
    ///   entry named like the extraction directory.
    /// - [`PipelineError::Normalization`] if a directory could not be
    ///   drained or removed.
    /// - [`PipelineError::Workload`] for any other workload failure.
    pub fn extract_and_normalize(
        &self,
        archive: &[u8],
        target_dir: &Utf8Path,
    ) -> Result<(), PipelineError> {
        let archive_path = target_dir.join(ARCHIVE_FILE_NAME);
        debug!("pushing {} bytes to {archive_path}", archive.len());
        self.workload.push(&archive_path, archive)?;

        let command = self.tool.command_for(ARCHIVE_FILE_NAME, target_dir);
        debug!("extracting: {command}");
        let output = self.workload.run(&command)?;
        if !output.success() {
            return Err(PipelineError::Extraction {
                tool: self.tool.program().to_owned(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_owned(),
            });
        }

        let extraction_root = target_dir.join(extraction_root_name(ARCHIVE_FILE_NAME));
        if !self.workload.exists(&extraction_root)? {
            return Err(PipelineError::Normalization {
                path: extraction_root,
                reason: format!(
                    "{} did not create the extraction directory",
                    self.tool.program()
                ),
            });
        }
        debug!("removing {archive_path}");
        self.workload.remove_path(&archive_path, false)?;

        debug!("flattening {extraction_root} into {target_dir}");
        self.flatten(&extraction_root)?;

        let wrapper = target_dir.join(WRAPPER_DIR_NAME);
        if self.workload.exists(&wrapper)? {
            debug!("flattening {wrapper} into {target_dir}");
            self.flatten(&wrapper)?;
        }

        debug!("library extracted into {target_dir}");
        Ok(())
    }

    /// Moves every entry of `dir` into its parent and removes `dir`.
    ///
    /// An empty `dir` is not an error. Files may replace same-named files in
    /// the parent; any other name clash is rejected before anything moves.
    /// Returns the number of entries moved.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NameClash`] when `dir` holds an entry named
    /// like itself, [`PipelineError::DirectoryCollision`] on any other
    /// rejected clash and [`PipelineError::Normalization`] if the move fails
    /// or `dir` is not empty afterwards.
    pub fn flatten(&self, dir: &Utf8Path) -> Result<usize, PipelineError> {
        let (Some(parent), Some(dir_name)) = (dir.parent(), dir.file_name()) else {
            return Err(PipelineError::Normalization {
                path: dir.to_owned(),
                reason: "directory has no parent".to_owned(),
            });
        };

        let entries = self.workload.list_files(dir)?;
        if entries.iter().any(|entry| entry.name == dir_name) {
            return Err(PipelineError::NameClash {
                dir: dir.to_owned(),
            });
        }
        if entries.is_empty() {
            debug!("{dir} is empty; nothing to move");
        } else {
            let existing: HashMap<String, FileKind> = self
                .workload
                .list_files(parent)?
                .into_iter()
                .filter(|info| info.name != dir_name)
                .map(|info| (info.name, info.kind))
                .collect();
            for entry in &entries {
                let clashes = existing.get(&entry.name).is_some_and(|kind| {
                    *kind == FileKind::Directory || entry.kind == FileKind::Directory
                });
                if clashes {
                    return Err(PipelineError::DirectoryCollision {
                        name: entry.name.clone(),
                        target: parent.to_owned(),
                    });
                }
            }

            let command = ExecCommand::new("mv")
                .args(["--force", "--target-directory=..", "--"])
                .args(entries.iter().map(|entry| entry.name.as_str()))
                .working_dir(dir);
            let output = self.workload.run(&command)?;
            if !output.success() {
                return Err(PipelineError::Normalization {
                    path: dir.to_owned(),
                    reason: format!(
                        "mv exited with code {}: {}",
                        output.exit_code,
                        output.stderr.trim()
                    ),
                });
            }
        }

        self.workload
            .remove_path(dir, false)
            .map_err(|e| PipelineError::Normalization {
                path: dir.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(entries.len())
    }
}

/// The directory the extraction tool creates for `archive_name`.
fn extraction_root_name(archive_name: &str) -> &str {
    Utf8Path::new(archive_name)
        .file_stem()
        .unwrap_or(archive_name)
}
