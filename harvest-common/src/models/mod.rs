//! Data model shared by the store and the processor

pub mod person;
pub mod record;
pub mod release;
pub mod repo;

pub use person::{Company, Membership, Person, INDEPENDENT};
pub use record::{record_key, RawRecord, Record, RecordKind};
pub use release::{Release, ReleaseBoundaries, ReleaseIndex, UNRELEASED};
pub use repo::{CiRuleConfig, ModuleGroup, Repo, RepoRelease, DEFAULT_BRANCH};
