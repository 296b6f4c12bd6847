//! JSON-lines history store.
//!
//! One deliberation per line, appended on save. Saving an id that is
//! already stored rewrites the file with the entry replaced, so each id
//! occupies exactly one line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{sort_recent_first, DeliberationSummary, HistoryError, HistoryResult, HistoryStore};
use crate::report::Deliberation;

/// Append-only file store, created on first save.
pub struct FileHistoryStore {
    path: PathBuf,
    /// Serialises writes so lines never interleave
    write_lock: Mutex<()>,
}

impl FileHistoryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored deliberation in first-saved order. A later line for an
    /// id replaces the earlier entry in place.
    async fn read_all(&self) -> HistoryResult<Vec<Deliberation>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<Deliberation> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Deliberation>(line) {
                Ok(deliberation) => match index.get(&deliberation.id) {
                    Some(&slot) => entries[slot] = deliberation,
                    None => {
                        index.insert(deliberation.id.clone(), entries.len());
                        entries.push(deliberation);
                    }
                },
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping unreadable history line"
                    );
                }
            }
        }
        Ok(entries)
    }

    async fn append(&self, deliberation: &Deliberation) -> HistoryResult<()> {
        let mut line = serde_json::to_string(deliberation)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Write `entries` to a sibling file and move it over the store.
    async fn rewrite(&self, entries: &[Deliberation]) -> HistoryResult<()> {
        let mut content = String::new();
        for entry in entries {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }
        let staging = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn save(&self, deliberation: &Deliberation) -> HistoryResult<String> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut entries = self.read_all().await?;
        match entries.iter_mut().find(|d| d.id == deliberation.id) {
            Some(existing) => {
                *existing = deliberation.clone();
                self.rewrite(&entries).await?;
                debug!(id = %deliberation.id, path = %self.path.display(), "Deliberation replaced");
            }
            None => {
                self.append(deliberation).await?;
                debug!(id = %deliberation.id, path = %self.path.display(), "Deliberation appended");
            }
        }
        Ok(deliberation.id.clone())
    }

    async fn list(&self, limit: usize) -> HistoryResult<Vec<DeliberationSummary>> {
        let mut summaries: Vec<_> = self
            .read_all()
            .await?
            .iter()
            .map(DeliberationSummary::from_deliberation)
            .collect();
        sort_recent_first(&mut summaries, limit);
        Ok(summaries)
    }

    async fn get(&self, id: &str) -> HistoryResult<Deliberation> {
        self.read_all()
            .await?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::fixtures;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history.jsonl"));
        assert!(store.list(10).await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_creates_parent_dirs_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.jsonl");
        let store = FileHistoryStore::new(&path);

        store.save(&fixtures::deliberation("first", 3, 2)).await.unwrap();
        store.save(&fixtures::deliberation("second", 1, 1)).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let listed = store.list(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "second");
    }

    #[tokio::test]
    async fn test_round_trip_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history.jsonl"));
        let saved = fixtures::deliberation("exact", 0, 3);
        store.save(&saved).await.unwrap();

        let loaded = store.get("exact").await.unwrap();
        assert_eq!(
            loaded.overall_disagreement.to_bits(),
            saved.overall_disagreement.to_bits()
        );
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_resave_replaces_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = FileHistoryStore::new(&path);

        store.save(&fixtures::deliberation("a", 5, 1)).await.unwrap();
        store.save(&fixtures::deliberation("b", 4, 1)).await.unwrap();
        let mut revised = fixtures::deliberation("a", 5, 3);
        revised.overall_risk = 0.7;
        store.save(&revised).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!path.with_extension("jsonl.tmp").exists());
        assert_eq!(store.get("a").await.unwrap(), revised);
        assert_eq!(store.list(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_survives_reopen_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        FileHistoryStore::new(&path)
            .save(&fixtures::deliberation("kept", 0, 2))
            .await
            .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| std::io::Write::write_all(&mut f, b"{not json\n"))
            .unwrap();

        let reopened = FileHistoryStore::new(&path);
        let fetched = reopened.get("kept").await.unwrap();
        assert_eq!(fetched.factors.len(), 2);
        assert!(matches!(
            reopened.get("gone").await,
            Err(HistoryError::NotFound(_))
        ));
    }
}
