//! Error types for the charm.
//!
//! [`CharmError`] covers hook handlers and the command-line driver. Action
//! handlers report failures to the operator as an [`ActionFailure`] carrying
//! only the human-readable message.

use calibre_library_provisioner::error::{ProvisionError, WorkloadError};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while handling hooks or driving the charm.
#[derive(Debug, Error)]
pub enum CharmError {
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has unknown keys.
    #[error("invalid configuration {path}: {source}")]
    ConfigParse {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// The parser error.
        #[source]
        source: toml::de::Error,
    },

    /// The persisted service plan could not be loaded.
    #[error("failed to read service plan {path}: {source}")]
    PlanRead {
        /// Path of the plan file.
        path: Utf8PathBuf,
        /// The underlying I/O or decoding error.
        #[source]
        source: std::io::Error,
    },

    /// A layer label is already in use and combining was not requested.
    #[error("layer {label} already exists")]
    LayerExists {
        /// The conflicting label.
        label: String,
    },

    /// The service plan could not be persisted.
    #[error("failed to write service plan {path}: {source}")]
    PlanWrite {
        /// Path of the plan file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded as JSON.
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Installing workload packages failed.
    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    DependencyInstall {
        /// The package manager command line.
        command: String,
        /// Exit status reported by the workload.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A workload operation failed.
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// Provisioning the library failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

/// Result alias for charm operations.
pub type Result<T> = std::result::Result<T, CharmError>;

/// An action that did not complete.
///
/// The message is shown to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionFailure {
    /// Human-readable reason.
    pub message: String,
}

impl ActionFailure {
    /// Creates a failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
