//! In-memory history store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{sort_recent_first, DeliberationSummary, HistoryError, HistoryResult, HistoryStore};
use crate::report::Deliberation;

/// Keeps every saved deliberation for the life of the process.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<Vec<Deliberation>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn save(&self, deliberation: &Deliberation) -> HistoryResult<String> {
        let mut entries = self.entries.write().await;
        entries.retain(|d| d.id != deliberation.id);
        entries.push(deliberation.clone());
        debug!(id = %deliberation.id, stored = entries.len(), "Deliberation saved");
        Ok(deliberation.id.clone())
    }

    async fn list(&self, limit: usize) -> HistoryResult<Vec<DeliberationSummary>> {
        let mut summaries: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .map(DeliberationSummary::from_deliberation)
            .collect();
        sort_recent_first(&mut summaries, limit);
        Ok(summaries)
    }

    async fn get(&self, id: &str) -> HistoryResult<Deliberation> {
        self.entries
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::fixtures;

    #[tokio::test]
    async fn test_save_list_get() {
        let store = InMemoryHistoryStore::new();
        store.save(&fixtures::deliberation("old", 5, 1)).await.unwrap();
        let id = store.save(&fixtures::deliberation("new", 0, 3)).await.unwrap();
        assert_eq!(id, "new");

        let listed = store.list(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "new");
        assert_eq!(listed[0].factor_count, 3);

        let fetched = store.get("old").await.unwrap();
        assert_eq!(fetched.factors.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = InMemoryHistoryStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_resave_replaces_entry() {
        let store = InMemoryHistoryStore::new();
        store.save(&fixtures::deliberation("a", 0, 1)).await.unwrap();
        store.save(&fixtures::deliberation("a", 0, 4)).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await.unwrap().factors.len(), 4);
    }
}
