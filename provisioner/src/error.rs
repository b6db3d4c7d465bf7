//! Error types for library provisioning and inspection.
//!
//! Variants are grouped by the stage that raises them. Configuration errors
//! need operator correction, pipeline errors abort the current run and are
//! recovered by re-running provisioning with the `clean` policy, and
//! inspection errors are reported back to the action caller.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures raised by a [`crate::workload::Workload`] implementation.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// A filesystem operation failed.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed (push, remove, list, ...).
        operation: &'static str,
        /// The container path the operation targeted.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A command could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that was requested.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A command exceeded the caller-imposed deadline and was killed.
    #[error("{program} timed out after {seconds} seconds")]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Configured timeout in whole seconds.
        seconds: u64,
    },

    /// The stdout sink refused further output.
    #[error("output of {program} was rejected by the capture sink")]
    OutputRejected {
        /// Program whose output was rejected.
        program: String,
        /// The error raised by the sink.
        #[source]
        source: std::io::Error,
    },

    /// A container path escapes the workload root.
    #[error("path {path} is outside the workload root")]
    OutsideRoot {
        /// The offending container path.
        path: Utf8PathBuf,
    },

    /// The path does not exist.
    #[error("no such file or directory: {path}")]
    NotFound {
        /// The missing container path.
        path: Utf8PathBuf,
    },

    /// A directory was expected.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The container path that is not a directory.
        path: Utf8PathBuf,
    },

    /// A non-recursive removal targeted a directory with entries.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The container path that still has entries.
        path: Utf8PathBuf,
    },
}

/// Configuration problems that block provisioning until an operator acts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configured policy is not one of the known values.
    #[error("invalid library-write: '{value}'")]
    InvalidPolicy {
        /// The rejected configuration value.
        value: String,
    },

    /// The bundled default archive is missing from the deployment.
    #[error("default library archive missing at {path}: {reason}")]
    MissingDefaultArchive {
        /// Where the archive was expected.
        path: Utf8PathBuf,
        /// Description of the read failure.
        reason: String,
    },

    /// The user-supplied archive resource could not be fetched.
    #[error("resource {name} unavailable: {reason}")]
    ResourceUnavailable {
        /// Resource name that was requested.
        name: String,
        /// Description of the fetch failure.
        reason: String,
    },
}

/// Failures raised by the extraction and normalization pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The extraction tool returned a nonzero exit status.
    #[error("extraction with {tool} failed with exit code {exit_code}: {stderr}")]
    Extraction {
        /// The extraction program.
        tool: String,
        /// Exit status reported by the workload.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A flatten or removal step failed where success was guaranteed.
    #[error("normalization of {path} failed: {reason}")]
    Normalization {
        /// The directory being normalized.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Flattening would move a directory onto an existing entry (or a file
    /// onto an existing directory).
    #[error("cannot move {name} into {target}: an entry with that name already exists")]
    DirectoryCollision {
        /// Name of the colliding entry.
        name: String,
        /// Directory the entry was being moved into.
        target: Utf8PathBuf,
    },

    /// An entry shares its name with the directory being flattened, so it
    /// cannot be moved into the parent.
    #[error("cannot flatten {dir}: it contains an entry with its own name")]
    NameClash {
        /// The directory being flattened.
        dir: Utf8PathBuf,
    },

    /// A workload operation failed.
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

/// Failures of the top-level provisioning operation.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Provisioning is blocked by configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The extraction pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Listing or cleaning the target directory failed.
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

impl ProvisionError {
    /// Returns `true` when the failure needs operator correction rather than
    /// a re-run.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibre_library_provisioner::error::{ConfigurationError, ProvisionError};
    ///
    /// let err = ProvisionError::from(ConfigurationError::InvalidPolicy {
    ///     value: "bad-value".to_owned(),
    /// });
    /// assert!(err.is_configuration());
    /// ```
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Failures of the library inspection operation.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The requested output format is not supported.
    #[error("unsupported library-info format '{value}'")]
    UnsupportedFormat {
        /// The rejected format value.
        value: String,
    },

    /// The rendering exceeded the capture capacity.
    #[error("library listing exceeds the {limit} byte capture limit")]
    LibraryTooLarge {
        /// Capture capacity in bytes.
        limit: usize,
    },

    /// The listing command exited unsuccessfully.
    #[error("{command} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        /// The listing command line.
        command: String,
        /// Exit status reported by the workload.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A workload operation failed.
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

/// Result alias for provisioning.
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_policy_message_quotes_value() {
        let err = ConfigurationError::InvalidPolicy {
            value: "bad-value".to_owned(),
        };
        assert_eq!(err.to_string(), "invalid library-write: 'bad-value'");
    }

    #[test]
    fn extraction_error_includes_exit_code_and_stderr() {
        let err = PipelineError::Extraction {
            tool: "dtrx".to_owned(),
            exit_code: 2,
            stderr: "corrupt archive".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dtrx"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("corrupt archive"));
    }

    #[test]
    fn provision_error_is_transparent_over_pipeline_error() {
        let err = ProvisionError::from(PipelineError::DirectoryCollision {
            name: "Author".to_owned(),
            target: Utf8PathBuf::from("/books"),
        });
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("Author"));
    }

    #[test]
    fn workload_io_error_preserves_source() {
        let err = WorkloadError::Io {
            operation: "push",
            path: Utf8PathBuf::from("/books/library.zip"),
            source: std::io::Error::other("disk full"),
        };
        assert!(err.to_string().contains("/books/library.zip"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
