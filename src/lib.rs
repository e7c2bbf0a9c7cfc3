//! repocache - per-caller repository working copies with sandboxed analysis
//!
//! Clones a repository on first request into
//! `{base_dir}/{caller namespace}/{owner-repo-sha}`, reuses it for later
//! requests, runs the analysis tool inside it without a shell, and evicts
//! working copies that sit idle longer than the configured TTL.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod output;
pub mod sandbox;
pub mod service;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{RepoCacheError, RepoCacheResult};
pub use service::{AnalysisReport, AnalysisService};
