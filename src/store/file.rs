//! File-backed artifact store.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! └── chunks/
//!     ├── auth_tokens/
//!     │   ├── artifact.yaml     # status, created_after, subsystems
//!     │   └── PLAN.md           # plan content (summarized, never parsed)
//!     └── billing_sync/
//!         └── external.yaml     # repo, track, pinned, created_after
//! ```
//!
//! The directory name is the artifact id.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::domain::{Artifact, ArtifactKind, ArtifactStatus, RemoteLocator, Source};

use super::{ArtifactStore, ContentSource, ContentSummary, ExternalRef, StoreEntry, StoreError};

const RECORD_FILE: &str = "artifact.yaml";
const EXTERNAL_FILE: &str = "external.yaml";
const PLAN_FILE: &str = "PLAN.md";

/// Raw `artifact.yaml` schema
#[derive(Debug, Deserialize)]
struct RecordFile {
    status: String,
    #[serde(default)]
    created_after: Vec<String>,
    #[serde(default)]
    subsystems: Vec<String>,
}

/// Raw `external.yaml` schema
#[derive(Debug, Deserialize)]
struct ExternalFile {
    repo: String,
    #[serde(default)]
    track: Option<String>,
    #[serde(default)]
    pinned: Option<String>,
    #[serde(default)]
    created_after: Vec<String>,
}

/// Artifact store rooted at a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    name: String,
    root: PathBuf,
}

impl FileStore {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.plural())
    }

    fn unavailable(&self, reason: impl ToString) -> StoreError {
        StoreError::Unavailable {
            store: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn malformed(&self, kind: ArtifactKind, id: &str, reason: impl ToString) -> StoreError {
        StoreError::Malformed {
            store: self.name.clone(),
            kind,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Load the entry stored in one artifact directory
    async fn load_entry(
        &self,
        kind: ArtifactKind,
        id: &str,
        dir: &Path,
    ) -> Result<Option<StoreEntry>, StoreError> {
        let record_path = dir.join(RECORD_FILE);
        if fs::try_exists(&record_path).await.map_err(|e| self.unavailable(e))? {
            let raw = fs::read_to_string(&record_path)
                .await
                .map_err(|e| self.unavailable(e))?;
            let record: RecordFile =
                serde_yaml::from_str(&raw).map_err(|e| self.malformed(kind, id, e))?;

            let artifact = Artifact {
                id: id.to_string(),
                kind,
                status: ArtifactStatus::parse(kind, &record.status)
                    .map_err(|e| self.malformed(kind, id, e))?,
                created_after: record.created_after,
                subsystems: record.subsystems,
                source: Source::Local,
            };
            return Ok(Some(StoreEntry::Local(artifact)));
        }

        let external_path = dir.join(EXTERNAL_FILE);
        if fs::try_exists(&external_path).await.map_err(|e| self.unavailable(e))? {
            let raw = fs::read_to_string(&external_path)
                .await
                .map_err(|e| self.unavailable(e))?;
            let file: ExternalFile =
                serde_yaml::from_str(&raw).map_err(|e| self.malformed(kind, id, e))?;

            let external = ExternalRef {
                id: id.to_string(),
                kind,
                locator: RemoteLocator {
                    repo: file.repo,
                    track: file.track,
                    pinned: file.pinned,
                },
                created_after: file.created_after,
            };
            return Ok(Some(StoreEntry::External(external)));
        }

        Ok(None)
    }
}

#[async_trait]
impl ArtifactStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(store = %self.name))]
    async fn list(&self, kind: ArtifactKind) -> Result<Vec<StoreEntry>, StoreError> {
        if !fs::try_exists(&self.root).await.map_err(|e| self.unavailable(e))? {
            return Err(self.unavailable(format!(
                "root directory does not exist: {}",
                self.root.display()
            )));
        }

        let kind_dir = self.kind_dir(kind);
        let mut entries = Vec::new();

        if !fs::try_exists(&kind_dir).await.map_err(|e| self.unavailable(e))? {
            return Ok(entries);
        }

        let mut dir = fs::read_dir(&kind_dir)
            .await
            .map_err(|e| self.unavailable(e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| self.unavailable(e))? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_plain_id(&id) {
                continue;
            }
            match self.load_entry(kind, &id, &entry.path()).await {
                Ok(Some(loaded)) => entries.push(loaded),
                Ok(None) => {}
                Err(StoreError::Malformed { reason, .. }) => {
                    warn!(%id, %reason, "Skipping malformed record");
                    entries.push(StoreEntry::Malformed { id, reason });
                }
                Err(e) => return Err(e),
            }
        }

        // Directory iteration order is platform dependent
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        debug!(count = entries.len(), "Listed artifacts");

        Ok(entries)
    }

    async fn get(&self, kind: ArtifactKind, id: &str) -> Result<Option<StoreEntry>, StoreError> {
        if !is_plain_id(id) {
            return Ok(None);
        }
        let dir = self.kind_dir(kind).join(id);
        if !fs::try_exists(&dir).await.map_err(|e| self.unavailable(e))? {
            return Ok(None);
        }
        self.load_entry(kind, id, &dir).await
    }
}

#[async_trait]
impl ContentSource for FileStore {
    async fn summarize(&self, artifact: &Artifact) -> Result<ContentSummary, StoreError> {
        if !is_plain_id(&artifact.id) {
            return Ok(ContentSummary::with_plan(false));
        }
        let plan_path = self.kind_dir(artifact.kind).join(&artifact.id).join(PLAN_FILE);

        if !fs::try_exists(&plan_path).await.map_err(|e| self.unavailable(e))? {
            return Ok(ContentSummary::with_plan(false));
        }

        let content = fs::read_to_string(&plan_path)
            .await
            .map_err(|e| self.unavailable(e))?;

        Ok(ContentSummary::with_plan(has_substantive_lines(&content)))
    }
}

/// An id must name exactly one directory under the kind directory, so
/// `./a` or `../chunks/a` can never alias `a`.
pub fn is_plain_id(id: &str) -> bool {
    if id.is_empty() || id.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == id
    )
}

/// True if the text has a line that is not blank, not a heading and not
/// inside an HTML comment (template guidance lives in comments).
pub fn has_substantive_lines(content: &str) -> bool {
    let mut in_comment = false;

    for line in content.lines() {
        let mut rest = line.trim();

        loop {
            if in_comment {
                match rest.find("-->") {
                    Some(end) => {
                        in_comment = false;
                        rest = rest[end + 3..].trim();
                    }
                    None => {
                        rest = "";
                        break;
                    }
                }
            } else {
                match rest.find("<!--") {
                    Some(start) if rest[..start].trim().is_empty() => {
                        in_comment = true;
                        rest = rest[start + 4..].trim();
                    }
                    _ => break,
                }
            }
        }

        if rest.is_empty() || rest.starts_with('#') {
            continue;
        }
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkStatus;
    use tempfile::TempDir;

    async fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_reads_local_and_external_entries() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "chunks/b_feature/artifact.yaml",
            "status: ACTIVE\ncreated_after: [a_base]\nsubsystems: [auth]\n",
        )
        .await;
        write(temp.path(), "chunks/a_base/artifact.yaml", "status: HISTORICAL\n").await;
        write(
            temp.path(),
            "chunks/c_remote/external.yaml",
            "repo: acme/payments\ntrack: main\ncreated_after: [b_feature]\n",
        )
        .await;

        let store = FileStore::new("home", temp.path());
        let entries = store.list(ArtifactKind::Chunk).await.unwrap();

        let ids: Vec<&str> = entries.iter().map(StoreEntry::id).collect();
        assert_eq!(ids, vec!["a_base", "b_feature", "c_remote"]);

        match &entries[1] {
            StoreEntry::Local(a) => {
                assert_eq!(a.status, ChunkStatus::Active.into());
                assert_eq!(a.created_after, vec!["a_base".to_string()]);
                assert_eq!(a.subsystems, vec!["auth".to_string()]);
            }
            other => panic!("expected local entry, got {:?}", other),
        }
        match &entries[2] {
            StoreEntry::External(r) => {
                assert_eq!(r.locator.repo, "acme/payments");
                assert_eq!(r.locator.track.as_deref(), Some("main"));
            }
            other => panic!("expected external entry, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_kind_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new("home", temp.path());
        assert!(store.list(ArtifactKind::Narrative).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let store = FileStore::new("home", "/definitely/not/here");
        let err = store.list(ArtifactKind::Chunk).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_status_is_reported() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "chunks/x/artifact.yaml", "status: SOLVED\n").await;

        let store = FileStore::new("home", temp.path());
        let err = store.get(ArtifactKind::Chunk, "x").await.unwrap_err();
        match err {
            StoreError::Malformed { kind, id, reason, .. } => {
                assert_eq!(kind, ArtifactKind::Chunk);
                assert_eq!(id, "x");
                assert!(reason.contains("SOLVED"));
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_keeps_going_past_malformed_record() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "chunks/a/artifact.yaml", "status: FUTURE
").await;
        write(temp.path(), "chunks/b/artifact.yaml", "status: ACTIV
").await;
        write(temp.path(), "chunks/c/artifact.yaml", "status: [not, a, string]
").await;

        let store = FileStore::new("home", temp.path());
        let entries = store.list(ArtifactKind::Chunk).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0], StoreEntry::Local(_)));
        match &entries[1] {
            StoreEntry::Malformed { id, reason } => {
                assert_eq!(id, "b");
                assert!(reason.contains("ACTIV"));
            }
            other => panic!("expected malformed entry, got {:?}", other),
        }
        assert!(matches!(entries[2], StoreEntry::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_get_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "chunks/a/artifact.yaml", "status: FUTURE
").await;
        write(temp.path(), "narratives/n/artifact.yaml", "status: DRAFTING
").await;

        let store = FileStore::new("home", temp.path());
        assert!(store.get(ArtifactKind::Chunk, "a").await.unwrap().is_some());

        for id in ["", ".", "..", "./a", "a/", "../chunks/a", "../narratives/n", "a\\b"] {
            assert!(
                store.get(ArtifactKind::Chunk, id).await.unwrap().is_none(),
                "{:?} should not resolve",
                id
            );
        }
    }

    #[test]
    fn test_plain_ids() {
        assert!(is_plain_id("auth_tokens"));
        assert!(is_plain_id("v1.2-migration"));
        assert!(!is_plain_id(""));
        assert!(!is_plain_id("."));
        assert!(!is_plain_id(".."));
        assert!(!is_plain_id("./a"));
        assert!(!is_plain_id("a/b"));
        assert!(!is_plain_id("a\\b"));
        assert!(!is_plain_id("/a"));
    }

    #[tokio::test]
    async fn test_summarize_plan_file() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "chunks/x/artifact.yaml", "status: ACTIVE\n").await;
        let store = FileStore::new("home", temp.path());
        let artifact = Artifact::new("x", ArtifactKind::Chunk, ChunkStatus::Active.into());

        assert!(!store.summarize(&artifact).await.unwrap().has_substantive_plan);

        write(
            temp.path(),
            "chunks/x/PLAN.md",
            "# Plan\n\n<!--\nDescribe the steps here.\n-->\n",
        )
        .await;
        assert!(!store.summarize(&artifact).await.unwrap().has_substantive_plan);

        write(temp.path(), "chunks/x/PLAN.md", "# Plan\n\n1. Add token table\n").await;
        assert!(store.summarize(&artifact).await.unwrap().has_substantive_plan);
    }

    #[test]
    fn test_substantive_lines() {
        assert!(!has_substantive_lines(""));
        assert!(!has_substantive_lines("# Title\n## Steps\n\n"));
        assert!(!has_substantive_lines("<!-- only guidance -->"));
        assert!(has_substantive_lines("<!-- note --> do the thing"));
        assert!(has_substantive_lines("## Steps\n- migrate schema"));
    }
}
