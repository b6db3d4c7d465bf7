//! Event and action handlers for the calibre-web charm.
//!
//! [`CalibreWebCharm`] holds no state of its own beyond its collaborators
//! and configuration; each handler can be invoked by any scheduler, in any
//! order, as often as the orchestrator delivers the event.

use crate::action::{
    Action, ActionResult, ActionResults, invalid_format_message, too_large_message,
};
use crate::config::{CharmConfig, LIBRARY_WRITE_CONFIG};
use crate::error::{ActionFailure, CharmError, Result};
use crate::layer::{SERVICE_NAME, SERVICE_PORT, ServiceSupervisor, calibre_web_layer};
use crate::status::UnitStatus;
use calibre_library_provisioner::LIBRARY_DIR;
use calibre_library_provisioner::archive::{DefaultArchive, ResourceProvider};
use calibre_library_provisioner::capture::DEFAULT_CAPTURE_LIMIT;
use calibre_library_provisioner::error::InspectError;
use calibre_library_provisioner::inspect::{Inspector, LibraryInfoFormat};
use calibre_library_provisioner::pipeline::ExtractionTool;
use calibre_library_provisioner::provision::{ProvisionOutcome, Provisioner};
use calibre_library_provisioner::workload::{ExecCommand, Workload};
use camino::Utf8PathBuf;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;

/// Lifecycle events the charm reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Hook {
    /// One-time setup.
    Install,
    /// The workload container is ready for commands.
    PebbleReady,
    /// The library storage was attached.
    StorageAttached,
    /// Configuration changed.
    ConfigChanged,
    /// The orchestrator asks for the current status.
    CollectStatus,
}

impl Hook {
    /// Returns the hook name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::PebbleReady => "pebble-ready",
            Self::StorageAttached => "storage-attached",
            Self::ConfigChanged => "config-changed",
            Self::CollectStatus => "collect-status",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of dispatching a hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HookReport {
    /// The hook that ran.
    pub hook: Hook,
    /// Ports the unit declared open.
    pub opened_ports: Vec<u16>,
    /// Unit status after the hook.
    pub status: UnitStatus,
}

/// The calibre-web operator.
pub struct CalibreWebCharm<'a> {
    workload: &'a dyn Workload,
    supervisor: &'a dyn ServiceSupervisor,
    resources: &'a dyn ResourceProvider,
    default_archive: DefaultArchive,
    config: CharmConfig,
    library_dir: Utf8PathBuf,
    install_dependencies: bool,
    extraction_tool: ExtractionTool,
    capture_limit: usize,
}

impl<'a> CalibreWebCharm<'a> {
    /// Creates the charm with its collaborators.
    #[must_use]
    pub fn new(
        workload: &'a dyn Workload,
        supervisor: &'a dyn ServiceSupervisor,
        resources: &'a dyn ResourceProvider,
        default_archive: DefaultArchive,
        config: CharmConfig,
    ) -> Self {
        Self {
            workload,
            supervisor,
            resources,
            default_archive,
            config,
            library_dir: Utf8PathBuf::from(LIBRARY_DIR),
            install_dependencies: true,
            extraction_tool: ExtractionTool::default(),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Skips installing `dtrx` and `tree` on pebble-ready.
    #[must_use]
    pub const fn without_dependency_install(mut self) -> Self {
        self.install_dependencies = false;
        self
    }

    /// Replaces the extraction tool used when provisioning.
    #[must_use]
    pub fn with_extraction_tool(mut self, tool: ExtractionTool) -> Self {
        self.extraction_tool = tool;
        self
    }

    /// Overrides the `library-info` capture limit.
    #[must_use]
    pub const fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    /// Declares the service port open.
    #[must_use]
    pub fn on_install(&self) -> Vec<u16> {
        info!("opening port {SERVICE_PORT}");
        vec![SERVICE_PORT]
    }

    /// Starts the workload service, installs its tools and provisions the
    /// library.
    ///
    /// Returns `None` when provisioning was not attempted because the
    /// configured policy is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`CharmError`] if the layer cannot be applied, a package
    /// install fails or provisioning fails.
    pub fn on_pebble_ready(&self) -> Result<Option<ProvisionOutcome>> {
        self.supervisor
            .add_layer(SERVICE_NAME, &calibre_web_layer(), true)?;
        self.supervisor.replan()?;
        if self.install_dependencies {
            debug!("installing workload dependencies");
            self.install_workload_dependencies()?;
        }
        self.push_library()
    }

    /// Logs the attachment; the library is written on pebble-ready.
    pub fn on_storage_attached(&self) {
        debug!(
            "storage attached at {}; provisioning waits for pebble-ready",
            self.library_dir
        );
    }

    /// Does nothing: invalid values surface through [`Self::collect_status`]
    /// and operators rewrite the library with the `library-write` action.
    pub fn on_config_changed(&self) {
        debug!("{LIBRARY_WRITE_CONFIG} is '{}'", self.config.library_write);
    }

    /// Computes the unit status from the configuration.
    #[must_use]
    pub fn collect_status(&self) -> UnitStatus {
        match self.config.library_write_behaviour() {
            Ok(_) => UnitStatus::Active,
            Err(e) => UnitStatus::Blocked(e.to_string()),
        }
    }

    /// Provisions the library under the configured policy.
    ///
    /// # Errors
    ///
    /// Fails with the blocked-status message when the policy is invalid and
    /// with the provisioning error message when provisioning fails.
    pub fn on_library_write(&self) -> ActionResult {
        let policy = self
            .config
            .library_write_behaviour()
            .map_err(|e| ActionFailure::new(e.to_string()))?;
        self.push_library()
            .map_err(|e| ActionFailure::new(e.to_string()))?;
        Ok(ActionResults::from([(
            LIBRARY_WRITE_CONFIG.to_owned(),
            policy.as_str().to_owned(),
        )]))
    }

    /// Renders the library in the requested `format` (`tree` or `ls-1`).
    ///
    /// A listing too large to capture is reported as a short notice under
    /// the format's key rather than as a failure.
    ///
    /// # Errors
    ///
    /// Fails for an unsupported format and when the listing command fails.
    pub fn on_library_info(&self, format: &str) -> ActionResult {
        let Ok(parsed) = format.parse::<LibraryInfoFormat>() else {
            let message = invalid_format_message(format);
            error!("{message}");
            return Err(ActionFailure::new(message));
        };

        let inspected = Inspector::new(self.workload)
            .with_capture_limit(self.capture_limit)
            .inspect(&self.library_dir, parsed.as_str());
        let text = match inspected {
            Ok(text) => text,
            Err(InspectError::LibraryTooLarge { limit }) => {
                warn!("{parsed} listing exceeds {limit} bytes");
                too_large_message(parsed).to_owned()
            }
            Err(e) => return Err(ActionFailure::new(e.to_string())),
        };
        Ok(ActionResults::from([(parsed.as_str().to_owned(), text)]))
    }

    /// Runs a hook handler and reports the resulting status.
    ///
    /// Handler failures become a blocked status carrying the error message.
    #[must_use]
    pub fn dispatch_hook(&self, hook: Hook) -> HookReport {
        debug!("dispatching {hook}");
        let (opened_ports, outcome) = match hook {
            Hook::Install => (self.on_install(), Ok(())),
            Hook::PebbleReady => (Vec::new(), self.on_pebble_ready().map(|_| ())),
            Hook::StorageAttached => {
                self.on_storage_attached();
                (Vec::new(), Ok(()))
            }
            Hook::ConfigChanged => {
                self.on_config_changed();
                (Vec::new(), Ok(()))
            }
            Hook::CollectStatus => (Vec::new(), Ok(())),
        };
        let status = match outcome {
            Ok(()) => self.collect_status(),
            Err(e) => {
                error!("{hook} failed: {e}");
                UnitStatus::Blocked(e.to_string())
            }
        };
        HookReport {
            hook,
            opened_ports,
            status,
        }
    }

    /// Runs an operator action.
    ///
    /// # Errors
    ///
    /// Returns the action's [`ActionFailure`].
    pub fn run_action(&self, action: &Action) -> ActionResult {
        debug!("running action {}", action.name());
        match action {
            Action::LibraryWrite => self.on_library_write(),
            Action::LibraryInfo { format } => self.on_library_info(format),
        }
    }

    fn install_workload_dependencies(&self) -> Result<()> {
        let commands = [
            ExecCommand::new("apt").arg("update"),
            ExecCommand::new("apt").args(["install", "dtrx", "tree", "-y"]),
        ];
        for command in &commands {
            let output = self.workload.run(command)?;
            if !output.success() {
                return Err(CharmError::DependencyInstall {
                    command: command.to_string(),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn push_library(&self) -> Result<Option<ProvisionOutcome>> {
        if let Err(e) = self.config.library_write_behaviour() {
            warn!("not provisioning: {e}");
            return Ok(None);
        }
        let provisioner =
            Provisioner::new(self.workload, self.resources, self.default_archive.clone())
                .with_extraction_tool(self.extraction_tool.clone());
        let outcome = provisioner.provision(&self.config.library_write, &self.library_dir)?;
        debug!("provisioning outcome: {outcome:?}");
        Ok(Some(outcome))
    }
}

#[cfg(test)]
#[path = "charm_tests.rs"]
mod tests;
