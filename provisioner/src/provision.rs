//! Top-level provisioning decisions.
//!
//! [`Provisioner::provision`] validates the configured policy, inspects the
//! target directory and either leaves it alone or clears it before handing
//! the selected archive to the [`LibraryPipeline`]. Repeated runs under
//! `skip` are no-ops once the directory has content; repeated runs under
//! `clean` always end with exactly the freshly extracted library.

use crate::archive::{ArchiveProvenance, ArchiveSource, DefaultArchive, ResourceProvider};
use crate::error::{Result, WorkloadError};
use crate::pipeline::{ExtractionTool, LibraryPipeline};
use crate::policy::ProvisioningPolicy;
use crate::workload::{FileInfo, Workload};
use camino::Utf8Path;
use log::{debug, info};
use serde::Serialize;

/// What a successful provisioning run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ProvisionOutcome {
    /// The directory already had content and the policy said to keep it.
    Skipped {
        /// The policy in effect.
        policy: ProvisioningPolicy,
    },
    /// A library archive was extracted into the directory.
    Provisioned {
        /// The policy in effect.
        policy: ProvisioningPolicy,
        /// Number of pre-existing entries removed first.
        cleaned: usize,
        /// Where the archive came from.
        source: ArchiveProvenance,
    },
}

/// Populates a library directory according to a provisioning policy.
pub struct Provisioner<'a> {
    workload: &'a dyn Workload,
    resources: &'a dyn ResourceProvider,
    default_archive: DefaultArchive,
    tool: ExtractionTool,
}

impl<'a> Provisioner<'a> {
    /// Creates a provisioner that extracts with `dtrx`.
    #[must_use]
    pub fn new(
        workload: &'a dyn Workload,
        resources: &'a dyn ResourceProvider,
        default_archive: DefaultArchive,
    ) -> Self {
        Self {
            workload,
            resources,
            default_archive,
            tool: ExtractionTool::default(),
        }
    }

    /// Replaces the extraction tool handed to the pipeline.
    #[must_use]
    pub fn with_extraction_tool(mut self, tool: ExtractionTool) -> Self {
        self.tool = tool;
        self
    }

    /// Provisions `target_dir` under the policy named by `policy`.
    ///
    /// The policy string is validated before anything else, so a rejected
    /// value leaves the workload untouched. A missing `target_dir` counts as
    /// empty.
    ///
    /// # Errors
    ///
    /// - [`crate::error::ProvisionError::Configuration`] for an unknown
    ///   policy, an unreadable resource or a missing default archive.
    /// - [`crate::error::ProvisionError::Workload`] if the directory cannot
    ///   be listed or cleaned.
    /// - [`crate::error::ProvisionError::Pipeline`] if extraction or
    ///   normalization fails.
    pub fn provision(&self, policy: &str, target_dir: &Utf8Path) -> Result<ProvisionOutcome> {
        let policy: ProvisioningPolicy = policy.parse()?;
        let entries = self.existing_entries(target_dir)?;

        let mut cleaned = 0;
        if !entries.is_empty() {
            match policy {
                ProvisioningPolicy::Skip => {
                    info!(
                        "{target_dir} already has {} entries; skipping provisioning",
                        entries.len()
                    );
                    return Ok(ProvisionOutcome::Skipped { policy });
                }
                ProvisioningPolicy::Clean => {
                    for entry in &entries {
                        debug!("removing {}", entry.path);
                        self.workload.remove_path(&entry.path, true)?;
                    }
                    cleaned = entries.len();
                    info!("removed {cleaned} existing entries from {target_dir}");
                }
            }
        }

        let source = ArchiveSource::resolve(self.resources, &self.default_archive)?;
        LibraryPipeline::new(self.workload)
            .with_extraction_tool(self.tool.clone())
            .extract_and_normalize(source.bytes(), target_dir)?;

        info!(
            "provisioned {target_dir} from the {} archive",
            provenance_label(source.provenance())
        );
        Ok(ProvisionOutcome::Provisioned {
            policy,
            cleaned,
            source: source.provenance(),
        })
    }

    fn existing_entries(&self, target_dir: &Utf8Path) -> Result<Vec<FileInfo>> {
        match self.workload.list_files(target_dir) {
            Ok(entries) => Ok(entries),
            Err(WorkloadError::NotFound { .. }) => {
                debug!("{target_dir} does not exist yet; treating it as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

const fn provenance_label(provenance: ArchiveProvenance) -> &'static str {
    match provenance {
        ArchiveProvenance::UserSupplied => "user-supplied",
        ArchiveProvenance::Default => "default",
    }
}

#[cfg(test)]
mod tests;
