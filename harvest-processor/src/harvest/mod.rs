//! Incremental harvesting: cursors, the run guard, and the orchestrator

pub mod cursor;
pub mod orchestrator;
pub mod run_guard;

pub use orchestrator::{HarvestOrchestrator, HarvestReport, TuplePhase};
pub use run_guard::{RunGuard, ACTIVE_PIDS_KEY};
