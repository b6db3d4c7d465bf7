//! Operator for a containerised calibre-web workload.
//!
//! The charm starts the calibre-web service, keeps its book library
//! provisioned and answers two operator actions. Library handling lives in
//! the `calibre-library-provisioner` crate; this crate wires it to lifecycle
//! hooks, configuration and status.
//!
//! # Modules
//!
//! - [`action`] - Operator actions and their results
//! - [`charm`] - Hook and action handlers
//! - [`cli`] - Command-line driver arguments
//! - [`config`] - The `library-write` option
//! - [`error`] - Charm error types
//! - [`layer`] - The service layer and supervisor
//! - [`status`] - Unit status

pub mod action;
pub mod charm;
pub mod cli;
pub mod config;
pub mod error;
pub mod layer;
pub mod status;

pub use charm::{CalibreWebCharm, Hook, HookReport};
pub use config::CharmConfig;
pub use status::UnitStatus;
