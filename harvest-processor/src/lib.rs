//! harvest-processor library interface
//!
//! Exposes the harvest pipeline for the binary and for integration tests.

pub mod config;
pub mod corrections;
pub mod default_data;
pub mod error;
pub mod harvest;
pub mod pipeline;
pub mod project_list;
pub mod services;
pub mod sources;

pub use crate::config::HarvestConfig;
pub use crate::error::{HarvestError, HarvestResult};
pub use crate::pipeline::{HarvestRun, RunSummary};
