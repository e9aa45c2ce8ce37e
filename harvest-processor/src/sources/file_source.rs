//! JSON-lines source connector
//!
//! Reads exports laid out as:
//! - `<root>/<kind>/<module>/<branch>.jsonl` for commits and reviews
//! - `<root>/<kind>/<module>.jsonl` for bugs and blueprints
//! - `<root>/<kind>/<list>.jsonl` for mail and member lists
//! - `<root>/tags/<module>.json` mapping commit id → release name
//!
//! Each line is one raw record. The cursor is the number of lines already
//! harvested, so appending to a file makes only the new lines visible.

use async_trait::async_trait;
use futures::stream;
use harvest_common::models::{RawRecord, ReleaseIndex, Repo};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{SourceBatch, SourceConnector, SourceError, SourceKind, SourceTarget};

pub struct FileSource {
    root: PathBuf,
    kind: SourceKind,
}

impl FileSource {
    pub fn new(root: &Path, kind: SourceKind) -> Self {
        Self {
            root: root.to_path_buf(),
            kind,
        }
    }

    /// Export file backing `target`
    pub fn path_for(&self, target: &SourceTarget) -> PathBuf {
        let dir = self.root.join(self.kind.as_str());
        match (&target.module, &target.branch) {
            (Some(module), Some(branch)) => dir
                .join(file_stem(module))
                .join(format!("{}.jsonl", file_stem(branch))),
            (Some(module), None) => dir.join(format!("{}.jsonl", file_stem(module))),
            (None, _) => dir.join(format!("{}.jsonl", file_stem(&target.uri))),
        }
    }
}

/// Filesystem-safe name: anything but alphanumerics, `-`, `.` becomes `_`
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

async fn read_optional(path: &Path) -> Result<Option<String>, SourceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SourceError::Unavailable(format!("{}: {}", path.display(), e))),
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<RawRecord, SourceError> {
    serde_json::from_str(line).map_err(|e| SourceError::Malformed(format!("line {}: {}", line_no + 1, e)))
}

#[async_trait]
impl SourceConnector for FileSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, target: &SourceTarget, cursor: Option<&str>) -> Result<SourceBatch, SourceError> {
        let path = self.path_for(target);

        let Some(content) = read_optional(&path).await? else {
            debug!(path = %path.display(), "No export for target");
            return Ok(SourceBatch::empty(cursor.map(str::to_string)));
        };

        let seen = match cursor.map(str::parse::<usize>) {
            None => 0,
            Some(Ok(seen)) => seen,
            Some(Err(_)) => {
                warn!(
                    path = %path.display(),
                    cursor = cursor.unwrap_or_default(),
                    "Unreadable cursor, re-reading the whole export"
                );
                0
            }
        };

        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let total = lines.len();
        if seen > total {
            warn!(path = %path.display(), seen, total, "Export shrank since last run");
        }

        if let Some(window) = target.member_window {
            debug!(
                days_to_update = window.days_to_update,
                look_ahead = window.look_ahead,
                "Member window ignored by file export"
            );
        }

        let pending = lines
            .into_iter()
            .enumerate()
            .skip(seen)
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| parse_line(line_no, &line));

        debug!(
            path = %path.display(),
            from_line = seen,
            to_line = total,
            "Fetched export"
        );

        Ok(SourceBatch {
            records: Box::pin(stream::iter(pending)),
            cursor: Some(total.to_string()),
        })
    }

    async fn release_index(&self, repo: &Repo) -> Result<ReleaseIndex, SourceError> {
        let path = self
            .root
            .join("tags")
            .join(format!("{}.json", file_stem(&repo.module)));

        match read_optional(&path).await? {
            None => Ok(ReleaseIndex::new()),
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| SourceError::Malformed(format!("{}: {}", path.display(), e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn repo() -> Repo {
        Repo {
            uri: "https://git.openstack.org/openstack/nova.git".to_string(),
            module: "nova".to_string(),
            organization: Some("openstack".to_string()),
            default_branch: None,
            releases: Vec::new(),
            ci: Vec::new(),
        }
    }

    async fn drain(batch: SourceBatch) -> Vec<Result<RawRecord, SourceError>> {
        batch.records.collect().await
    }

    #[test]
    fn test_path_layout() {
        let source = FileSource::new(Path::new("/data"), SourceKind::Commits);
        let path = source.path_for(&SourceTarget::repo_branch(&repo(), "stable/havana"));
        assert_eq!(path, PathBuf::from("/data/commits/nova/stable_havana.jsonl"));

        let mail = FileSource::new(Path::new("/data"), SourceKind::Mail);
        let path = mail.path_for(&SourceTarget::list("openstack-dev"));
        assert_eq!(path, PathBuf::from("/data/mail/openstack-dev.jsonl"));
    }

    #[tokio::test]
    async fn test_missing_export_is_empty_and_keeps_cursor() {
        let temp_dir = TempDir::new().unwrap();
        let source = FileSource::new(temp_dir.path(), SourceKind::Bugs);

        let batch = source.fetch(&SourceTarget::repo(&repo()), Some("7")).await.unwrap();

        assert_eq!(batch.cursor.as_deref(), Some("7"));
        assert!(drain(batch).await.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_skips_harvested_lines() {
        let temp_dir = TempDir::new().unwrap();
        let source = FileSource::new(temp_dir.path(), SourceKind::Bugs);
        let target = SourceTarget::repo(&repo());
        let path = source.path_for(&target);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "{\"id\": \"1\", \"date\": 1}\n\n{\"id\": \"2\", \"date\": 2}\n{\"id\": \"3\", \"date\": 3}\n",
        )
        .unwrap();

        let first = source.fetch(&target, None).await.unwrap();
        assert_eq!(first.cursor.as_deref(), Some("4"));
        assert_eq!(drain(first).await.len(), 3);

        let second = source.fetch(&target, Some("2")).await.unwrap();
        let ids: Vec<String> = drain(second)
            .await
            .into_iter()
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_malformed_line_surfaces_as_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = FileSource::new(temp_dir.path(), SourceKind::Mail);
        let target = SourceTarget::list("openstack-dev");
        let path = source.path_for(&target);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{\"id\": \"m1\"}\nnot json\n").unwrap();

        let records = drain(source.fetch(&target, None).await.unwrap()).await;

        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(SourceError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_release_index_from_tags() {
        let temp_dir = TempDir::new().unwrap();
        let source = FileSource::new(temp_dir.path(), SourceKind::Commits);
        std::fs::create_dir_all(temp_dir.path().join("tags")).unwrap();
        std::fs::write(
            temp_dir.path().join("tags").join("nova.json"),
            r#"{"5b2a6f": "havana", "77c1e0": "icehouse"}"#,
        )
        .unwrap();

        let index = source.release_index(&repo()).await.unwrap();

        assert_eq!(index.get("5b2a6f").map(String::as_str), Some("havana"));
        assert_eq!(index.len(), 2);
    }
}
