//! calibre-web charm entrypoint.
//!
//! Runs one hook or action against a host directory standing in for the
//! workload container and prints the result as JSON on stdout. Logs go to
//! stderr.

use calibre_library_provisioner::archive::{DefaultArchive, DirResourceProvider};
use calibre_library_provisioner::workload::LocalWorkload;
use calibre_web_charm::charm::CalibreWebCharm;
use calibre_web_charm::cli::{Cli, Command};
use calibre_web_charm::config::CharmConfig;
use calibre_web_charm::error::{CharmError, Result};
use calibre_web_charm::layer::{PlanFileSupervisor, calibre_web_layer};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match run(&cli, &mut stdout) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the requested command, returning whether it succeeded.
fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<bool> {
    if matches!(cli.command, Command::Layer) {
        write_json(stdout, &calibre_web_layer())?;
        return Ok(true);
    }

    let mut workload = LocalWorkload::new(cli.root.clone());
    if let Some(timeout) = cli.command_timeout() {
        workload = workload.with_timeout(timeout);
    }
    let resources = DirResourceProvider::new(cli.resources_dir());
    let default_archive = DefaultArchive::in_charm_dir(&cli.charm_dir);
    let config = CharmConfig::load(&cli.config)?;
    let supervisor = PlanFileSupervisor::open(cli.plan_path())?;

    let mut charm = CalibreWebCharm::new(
        &workload,
        &supervisor,
        &resources,
        default_archive,
        config,
    );
    if cli.skip_deps {
        charm = charm.without_dependency_install();
    }

    match &cli.command {
        Command::Hook { hook } => {
            let report = charm.dispatch_hook(*hook);
            write_json(stdout, &report)?;
            Ok(true)
        }
        Command::Action(action) => match charm.run_action(&action.to_action()) {
            Ok(results) => {
                write_json(stdout, &results)?;
                Ok(true)
            }
            Err(failure) => {
                write_json(stdout, &serde_json::json!({ "error": failure.message }))?;
                Ok(false)
            }
        },
        Command::Layer => Ok(true),
    }
}

fn write_json(out: &mut dyn Write, value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    writeln!(out, "{text}").map_err(CharmError::Output)
}
