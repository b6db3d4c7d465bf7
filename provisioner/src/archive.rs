//! Archive source selection.
//!
//! A provisioning cycle uses the operator's `calibre-library` resource when
//! it carries any bytes and falls back to the `library.zip` bundled with the
//! charm otherwise. Both are read fresh on every cycle.

use crate::error::ConfigurationError;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Serialize;

/// Name of the operator-supplied library resource.
pub const LIBRARY_RESOURCE: &str = "calibre-library";

/// File name of the default archive bundled with the charm.
pub const DEFAULT_ARCHIVE_NAME: &str = "library.zip";

/// Fetches named resources attached to the deployment.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceProvider {
    /// Returns the raw bytes of the named resource.
    ///
    /// An empty payload means the operator attached no override.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while reading the resource.
    fn fetch(&self, name: &str) -> std::io::Result<Vec<u8>>;
}

/// Reads resources from a directory, one file per resource name.
#[derive(Debug, Clone)]
pub struct DirResourceProvider {
    dir: Utf8PathBuf,
}

impl DirResourceProvider {
    /// Creates a provider rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResourceProvider for DirResourceProvider {
    fn fetch(&self, name: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.dir.join(name))
    }
}

/// Location of the archive bundled with the charm.
#[derive(Debug, Clone)]
pub struct DefaultArchive {
    path: Utf8PathBuf,
}

impl DefaultArchive {
    /// Uses the archive at an explicit path.
    #[must_use]
    pub fn at(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `library.zip` inside the charm directory.
    #[must_use]
    pub fn in_charm_dir(charm_dir: &Utf8Path) -> Self {
        Self::at(charm_dir.join(DEFAULT_ARCHIVE_NAME))
    }

    /// Returns the archive path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads the bundled archive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingDefaultArchive`] when the file
    /// cannot be read or is empty; the deployment artefact is broken in
    /// either case.
    pub fn load(&self) -> Result<Vec<u8>, ConfigurationError> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            ConfigurationError::MissingDefaultArchive {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;
        if bytes.is_empty() {
            return Err(ConfigurationError::MissingDefaultArchive {
                path: self.path.clone(),
                reason: "file is empty".to_owned(),
            });
        }
        Ok(bytes)
    }
}

/// Where the archive for a provisioning cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveProvenance {
    /// Attached by the operator as the `calibre-library` resource.
    UserSupplied,
    /// Bundled with the charm.
    Default,
}

/// The archive payload selected for one provisioning cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    provenance: ArchiveProvenance,
    bytes: Vec<u8>,
}

impl ArchiveSource {
    /// Selects the user-supplied archive when non-empty, otherwise the
    /// bundled default.
    ///
    /// The default is only read when it is needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ResourceUnavailable`] if the resource
    /// cannot be fetched and [`ConfigurationError::MissingDefaultArchive`] if
    /// the fallback is missing.
    pub fn resolve(
        resources: &dyn ResourceProvider,
        default: &DefaultArchive,
    ) -> Result<Self, ConfigurationError> {
        let user = resources.fetch(LIBRARY_RESOURCE).map_err(|e| {
            ConfigurationError::ResourceUnavailable {
                name: LIBRARY_RESOURCE.to_owned(),
                reason: e.to_string(),
            }
        })?;

        if !user.is_empty() {
            debug!("using user-supplied {LIBRARY_RESOURCE} ({} bytes)", user.len());
            return Ok(Self {
                provenance: ArchiveProvenance::UserSupplied,
                bytes: user,
            });
        }

        let bytes = default.load()?;
        debug!("using default archive {} ({} bytes)", default.path(), bytes.len());
        Ok(Self {
            provenance: ArchiveProvenance::Default,
            bytes,
        })
    }

    /// Returns where the payload came from.
    #[must_use]
    pub const fn provenance(&self) -> ArchiveProvenance {
        self.provenance
    }

    /// Returns the archive bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
