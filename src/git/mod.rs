//! Version-control client
//!
//! Working copies are materialized by shelling out to the system `git`.
//! The [`Cloner`] trait is the seam the orchestrator depends on.

mod cloner;

pub use cloner::{Cloner, GitCloner};
