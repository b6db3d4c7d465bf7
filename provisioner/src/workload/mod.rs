//! The narrow capability interface to the workload container.
//!
//! Provisioning and inspection only ever execute a command, push a file,
//! remove a path, test for existence and list a directory. Every call is
//! synchronous and completes before it returns, so callers can rely on the
//! side effects of one step when issuing the next.
//!
//! # Sub-modules
//!
//! - [`local`] - A workload backed by a host directory and host processes.

pub mod local;

use crate::error::WorkloadError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::io::Write;

pub use local::LocalWorkload;

/// Remote filesystem and process operations on a workload container.
pub trait Workload {
    /// Runs a command to completion, streaming its stdout into `stdout` as
    /// it is produced.
    ///
    /// A nonzero exit status is reported through [`ExecOutput`], not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError`] if the command cannot be started, times out,
    /// or `stdout` refuses a write.
    fn exec(&self, command: &ExecCommand, stdout: &mut dyn Write)
    -> Result<ExecOutput, WorkloadError>;

    /// Writes `contents` to `path`, creating missing parent directories and
    /// replacing an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError`] if the file cannot be written.
    fn push(&self, path: &Utf8Path, contents: &[u8]) -> Result<(), WorkloadError>;

    /// Removes a file or directory.
    ///
    /// Without `recursive`, removing a directory that still has entries
    /// fails with [`WorkloadError::DirectoryNotEmpty`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError::NotFound`] if nothing exists at `path`.
    fn remove_path(&self, path: &Utf8Path, recursive: bool) -> Result<(), WorkloadError>;

    /// Returns whether anything exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError`] if existence cannot be determined.
    fn exists(&self, path: &Utf8Path) -> Result<bool, WorkloadError>;

    /// Lists the immediate children of a directory, sorted by name.
    ///
    /// Hidden entries are included; `.` and `..` never are.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError::NotFound`] or
    /// [`WorkloadError::NotADirectory`] when `path` is not a directory.
    fn list_files(&self, path: &Utf8Path) -> Result<Vec<FileInfo>, WorkloadError>;

    /// Runs a command and discards its stdout.
    ///
    /// # Errors
    ///
    /// See [`Workload::exec`].
    fn run(&self, command: &ExecCommand) -> Result<ExecOutput, WorkloadError> {
        self.exec(command, &mut std::io::sink())
    }
}

/// A command line with an optional working directory inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<Utf8PathBuf>,
}

impl ExecCommand {
    /// Starts a command line for `program`.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibre_library_provisioner::workload::ExecCommand;
    ///
    /// let command = ExecCommand::new("ls").arg("-1").working_dir("/books");
    /// assert_eq!(command.to_string(), "ls -1");
    /// assert_eq!(command.current_dir().map(|d| d.as_str()), Some("/books"));
    /// ```
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the container directory the command runs in.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments after the program name.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory, if one was set.
    #[must_use]
    pub fn current_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }
}

impl fmt::Display for ExecCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Completion status of an executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl ExecOutput {
    /// Returns `true` for a zero exit code.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link (not followed).
    Symlink,
    /// Anything else (sockets, devices, ...).
    Other,
}

/// An immediate child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Full container path of the entry.
    pub path: Utf8PathBuf,
    /// Entry name.
    pub name: String,
    /// Entry kind.
    pub kind: FileKind,
}
