//! Record-processing services
//!
//! - `identity_directory`: email → canonical person lookup
//! - `company_matcher`: email domain → company
//! - `attribution`: person and company resolution for an author
//! - `merge_policy`: per-kind merge of incoming and stored records
//! - `driverlog`: CI rules and derived `ci_vote` records
//! - `record_processor`: raw → canonical stream and release post-processing

pub mod attribution;
pub mod company_matcher;
pub mod driverlog;
pub mod identity_directory;
pub mod merge_policy;
pub mod record_processor;

pub use attribution::{Attribution, AttributionResolver};
pub use company_matcher::DomainIndex;
pub use driverlog::{CiRuleSet, DriverLog};
pub use identity_directory::{
    DirectoryError, DirectoryProfile, IdentityDirectory, LaunchpadDirectory, NullDirectory,
};
pub use merge_policy::{merge_commits, merge_fn_for, replace_record};
pub use record_processor::RecordProcessor;
