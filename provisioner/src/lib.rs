//! Calibre library provisioner.
//!
//! This crate populates and inspects the library directory of a calibre-web
//! workload container. It is used by the `calibre-web-charm` handlers and can
//! be driven directly against any [`workload::Workload`] implementation, which
//! keeps the pipeline testable without a live container.
//!
//! # Modules
//!
//! - [`archive`] - Archive source selection and resource providers
//! - [`capture`] - Bounded capture of streamed command output
//! - [`error`] - Semantic error types for provisioning and inspection
//! - [`inspect`] - Read-only library renderings (`tree`, `ls -1`)
//! - [`pipeline`] - Extraction and layout normalization
//! - [`policy`] - The skip/clean provisioning policy
//! - [`provision`] - Top-level provisioning decisions
//! - [`workload`] - The narrow remote filesystem capability interface

pub mod archive;
pub mod capture;
pub mod error;
pub mod inspect;
pub mod pipeline;
pub mod policy;
pub mod provision;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod workload;

/// Canonical library location inside the workload container.
pub const LIBRARY_DIR: &str = "/books";
