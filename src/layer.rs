//! The workload service layer and the supervisor that runs it.
//!
//! The charm describes the calibre-web process declaratively as a [`Layer`]
//! and hands it to a [`ServiceSupervisor`], which owns starting and
//! restarting the process.

use crate::error::{CharmError, Result};
use camino::Utf8PathBuf;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Name of the workload service (and of its layer).
pub const SERVICE_NAME: &str = "calibre-web";

/// The port calibre-web listens on.
pub const SERVICE_PORT: u16 = 8083;

const CONFIG_INIT_SCRIPT: &str = "/etc/s6-overlay/s6-rc.d/init-calibre-web-config/run";
const APP_DIR: &str = "/app/calibre-web";

/// A declarative set of services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// One-line summary.
    pub summary: String,
    /// Longer description.
    pub description: String,
    /// Services keyed by name.
    pub services: BTreeMap<String, Service>,
}

/// How a service definition combines with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    /// Replace the existing definition entirely.
    Replace,
    /// Merge into the existing definition.
    Merge,
}

/// Whether a service starts with the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    /// Started automatically.
    Enabled,
    /// Started only on request.
    Disabled,
}

/// One supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Service {
    /// Combination rule.
    pub r#override: Override,
    /// One-line summary.
    pub summary: String,
    /// Command line.
    pub command: String,
    /// Startup behaviour.
    pub startup: Startup,
    /// Working directory of the process.
    pub working_dir: String,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
}

/// Builds the calibre-web layer.
///
/// The container's s6 init script for the calibre-web configuration is run
/// through `bash` before the application starts.
///
/// # Examples
///
/// ```
/// use calibre_web_charm::layer::{SERVICE_NAME, calibre_web_layer};
///
/// let layer = calibre_web_layer();
/// let service = &layer.services[SERVICE_NAME];
/// assert_eq!(service.working_dir, "/app/calibre-web");
/// assert_eq!(service.environment["CALIBRE_DBPATH"], "/config");
/// ```
#[must_use]
pub fn calibre_web_layer() -> Layer {
    let command = format!("bash -c 'bash {CONFIG_INIT_SCRIPT} && python3 {APP_DIR}/cps.py'");
    let environment = [
        ("PUID", "1000"),
        ("PGID", "1000"),
        ("TZ", "Etc/UTC"),
        ("CALIBRE_DBPATH", "/config"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value.to_owned()))
    .collect();

    let service = Service {
        r#override: Override::Replace,
        summary: SERVICE_NAME.to_owned(),
        command,
        startup: Startup::Enabled,
        working_dir: APP_DIR.to_owned(),
        environment,
    };
    Layer {
        summary: format!("{SERVICE_NAME} layer"),
        description: format!("pebble config layer for {SERVICE_NAME}"),
        services: BTreeMap::from([(SERVICE_NAME.to_owned(), service)]),
    }
}

/// Accepts service layers and applies them to the running workload.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceSupervisor {
    /// Adds a layer under `label`.
    ///
    /// With `combine`, a layer already registered under the same label is
    /// updated in place; otherwise an existing label is an error.
    ///
    /// # Errors
    ///
    /// Returns [`CharmError`] if the layer cannot be recorded.
    fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()>;

    /// Brings running services in line with the combined plan.
    ///
    /// # Errors
    ///
    /// Returns [`CharmError`] if the plan cannot be applied.
    fn replan(&self) -> Result<()>;
}

/// The persisted supervisor plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    /// Layers by label.
    pub layers: BTreeMap<String, Layer>,
    /// Number of replans requested since the plan was created.
    pub replans: u32,
}

impl Plan {
    /// Adds or combines a layer.
    ///
    /// # Errors
    ///
    /// Returns [`CharmError::LayerExists`] when `label` is taken and
    /// `combine` is false.
    pub fn add_layer(&mut self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        match self.layers.get_mut(label) {
            None => {
                self.layers.insert(label.to_owned(), layer.clone());
            }
            Some(_) if !combine => {
                return Err(CharmError::LayerExists {
                    label: label.to_owned(),
                });
            }
            Some(existing) => {
                existing.summary.clone_from(&layer.summary);
                existing.description.clone_from(&layer.description);
                for (name, service) in &layer.services {
                    combine_service(&mut existing.services, name, service);
                }
            }
        }
        Ok(())
    }
}

fn combine_service(services: &mut BTreeMap<String, Service>, name: &str, incoming: &Service) {
    match (services.get_mut(name), incoming.r#override) {
        (Some(current), Override::Merge) => {
            current.summary.clone_from(&incoming.summary);
            current.command.clone_from(&incoming.command);
            current.startup = incoming.startup;
            current.working_dir.clone_from(&incoming.working_dir);
            current.environment.extend(
                incoming
                    .environment
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
        }
        _ => {
            services.insert(name.to_owned(), incoming.clone());
        }
    }
}

/// A supervisor that records its plan as a JSON file.
///
/// The file is rewritten after every change, so a separate process (or a
/// later hook invocation) sees the same plan.
#[derive(Debug)]
pub struct PlanFileSupervisor {
    path: Utf8PathBuf,
    plan: RefCell<Plan>,
}

impl PlanFileSupervisor {
    /// Opens the plan at `path`, starting empty when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CharmError::PlanRead`] if the file exists but cannot be
    /// read or decoded.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self> {
        let path = path.into();
        let plan = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| CharmError::PlanRead {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Plan::default(),
            Err(source) => return Err(CharmError::PlanRead { path, source }),
        };
        Ok(Self {
            path,
            plan: RefCell::new(plan),
        })
    }

    /// Returns a copy of the current plan.
    #[must_use]
    pub fn plan(&self) -> Plan {
        self.plan.borrow().clone()
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&*self.plan.borrow())?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CharmError::PlanWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, bytes).map_err(|source| CharmError::PlanWrite {
            path: self.path.clone(),
            source,
        })
    }
}

impl ServiceSupervisor for PlanFileSupervisor {
    fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        debug!("adding layer {label} (combine: {combine})");
        self.plan.borrow_mut().add_layer(label, layer, combine)?;
        self.persist()
    }

    fn replan(&self) -> Result<()> {
        debug!("replanning {}", self.path);
        {
            let mut plan = self.plan.borrow_mut();
            plan.replans = plan.replans.saturating_add(1);
        }
        self.persist()
    }
}
