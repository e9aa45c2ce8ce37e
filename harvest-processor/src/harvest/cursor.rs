//! Cursor keys
//!
//! Cursors live in the scalar namespace under
//! `<source-prefix>:<quote_plus(target)>:<branch>`; list sources use `-` as
//! the branch. Bug harvesting keeps its "modified since" timestamp per module.

use crate::sources::SourceKind;

/// Placeholder branch for targets without branches
pub const NO_BRANCH: &str = "-";

/// Form-encode a target id (`/` → `%2F`, space → `+`)
pub fn quote_plus(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn cursor_key(kind: SourceKind, target: &str, branch: Option<&str>) -> String {
    format!(
        "{}:{}:{}",
        kind.cursor_prefix(),
        quote_plus(target),
        branch.unwrap_or(NO_BRANCH)
    )
}

pub fn bug_cursor_key(module: &str) -> String {
    format!("{}:{}:modified_since", SourceKind::Bugs.cursor_prefix(), quote_plus(module))
}
