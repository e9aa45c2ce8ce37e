//! # Harvest Common Library
//!
//! Shared code for the contribution harvester:
//! - Keyed store (SQLite) for scalars, records, people, and companies
//! - Record, person, release, and repository models
//! - Configuration loading
//! - Error type and timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod time;

pub use db::KeyedStore;
pub use error::{Error, Result};
