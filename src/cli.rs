//! CLI argument definitions for the calibre-web charm driver.
//!
//! The driver runs one hook or action per invocation against a workload
//! rooted in a host directory, which lets the charm be exercised without an
//! orchestrator.

use crate::action::Action;
use crate::charm::Hook;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use std::time::Duration;

/// Drive the calibre-web charm handlers.
#[derive(Parser, Debug)]
#[command(name = "calibre-web-charm")]
#[command(version, about)]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Start the workload and provision the library:\n",
    "    $ calibre-web-charm --root /srv/calibre-web hook pebble-ready\n\n",
    "  Replace the library with the attached resource:\n",
    "    $ calibre-web-charm --config charm.toml action library-write\n\n",
    "  Show the library layout:\n",
    "    $ calibre-web-charm action library-info --format ls-1",
))]
pub struct Cli {
    /// Host directory standing in for the workload container's root.
    #[arg(long, value_name = "DIR", default_value = "/")]
    pub root: Utf8PathBuf,

    /// Charm directory holding the bundled `library.zip`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub charm_dir: Utf8PathBuf,

    /// Directory of attached resources, one file per resource name
    /// [default: <CHARM_DIR>/resources].
    #[arg(long, value_name = "DIR")]
    pub resources: Option<Utf8PathBuf>,

    /// Charm configuration file; defaults apply when it does not exist.
    #[arg(long, value_name = "FILE", default_value = "config.toml")]
    pub config: Utf8PathBuf,

    /// Where the service supervisor plan is recorded
    /// [default: <ROOT>/var/lib/pebble/plan.json].
    #[arg(long, value_name = "FILE")]
    pub plan: Option<Utf8PathBuf>,

    /// Skip installing `dtrx` and `tree` in the workload on pebble-ready.
    #[arg(long)]
    pub skip_deps: bool,

    /// Kill workload commands running longer than this many seconds.
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// What to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Dispatch a lifecycle hook and print the resulting status.
    Hook {
        /// The hook to dispatch.
        #[arg(value_enum)]
        hook: Hook,
    },

    /// Run an operator action and print its results.
    #[command(subcommand)]
    Action(ActionCommand),

    /// Print the workload service layer.
    Layer,
}

/// Operator actions.
#[derive(Subcommand, Debug, Clone)]
pub enum ActionCommand {
    /// Write the library under the configured `library-write` policy.
    LibraryWrite,

    /// Render the library contents.
    LibraryInfo {
        /// Output format: `tree` or `ls-1`.
        #[arg(long, value_name = "FORMAT")]
        format: String,
    },
}

impl ActionCommand {
    /// Converts the parsed subcommand into an [`Action`].
    #[must_use]
    pub fn to_action(&self) -> Action {
        match self {
            Self::LibraryWrite => Action::LibraryWrite,
            Self::LibraryInfo { format } => Action::LibraryInfo {
                format: format.clone(),
            },
        }
    }
}

impl Cli {
    /// Returns the resource directory, defaulting under the charm directory.
    #[must_use]
    pub fn resources_dir(&self) -> Utf8PathBuf {
        self.resources
            .clone()
            .unwrap_or_else(|| self.charm_dir.join("resources"))
    }

    /// Returns the plan file path, defaulting under the workload root.
    #[must_use]
    pub fn plan_path(&self) -> Utf8PathBuf {
        self.plan
            .clone()
            .unwrap_or_else(|| default_plan_path(&self.root))
    }

    /// Returns the per-command timeout, if one was requested.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

fn default_plan_path(root: &Utf8Path) -> Utf8PathBuf {
    root.join("var/lib/pebble/plan.json")
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
