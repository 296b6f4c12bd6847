//! History adapter
//!
//! Persists completed deliberations and answers list / get-by-id queries.
//! Listing returns compact summaries, most recent first; `get` returns the
//! full aggregate.
//!
//! - [`memory`]: process-local store
//! - [`file`]: append-only JSON-lines file

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::{Decision, Deliberation};

pub use file::FileHistoryStore;
pub use memory::InMemoryHistoryStore;

/// Characters of the problem statement kept in a summary.
pub const PREVIEW_CHARS: usize = 200;

/// Upper bound on summary key points.
pub const MAX_KEY_POINTS: usize = 10;

/// Error type for history operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("History serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Deliberation not found: {0}")]
    NotFound(String),
}

/// Result type for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Compact listing entry for a stored deliberation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliberationSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub problem_preview: String,
    pub factor_count: usize,
    pub decision: Decision,
    pub key_points: Vec<String>,
}

impl DeliberationSummary {
    pub fn from_deliberation(deliberation: &Deliberation) -> Self {
        let recommendation = &deliberation.recommendation;
        let key_points = deliberation
            .factors
            .iter()
            .map(|f| format!("Factor: {}", f.name))
            .chain(std::iter::once(format!("Verdict: {}", recommendation.decision)))
            .chain(recommendation.recommendations.iter().cloned())
            .take(MAX_KEY_POINTS)
            .collect();

        Self {
            id: deliberation.id.clone(),
            created_at: deliberation.created_at,
            problem_preview: deliberation
                .problem_statement
                .chars()
                .take(PREVIEW_CHARS)
                .collect(),
            factor_count: deliberation.factors.len(),
            decision: recommendation.decision,
            key_points,
        }
    }
}

/// Storage for completed deliberations.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist a deliberation and return the id it can be fetched by.
    async fn save(&self, deliberation: &Deliberation) -> HistoryResult<String>;

    /// Up to `limit` summaries, most recent first.
    async fn list(&self, limit: usize) -> HistoryResult<Vec<DeliberationSummary>>;

    /// The full deliberation, or `HistoryError::NotFound`.
    async fn get(&self, id: &str) -> HistoryResult<Deliberation>;
}

/// Shared reference to a history store
pub type SharedHistoryStore = Arc<dyn HistoryStore>;

/// Most recent first, ties broken by id so listing is stable.
pub(crate) fn sort_recent_first(summaries: &mut Vec<DeliberationSummary>, limit: usize) {
    summaries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    summaries.truncate(limit);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_key_points_order_and_cap() {
        let deliberation = fixtures::deliberation("a", 0, 12);
        let summary = DeliberationSummary::from_deliberation(&deliberation);

        assert_eq!(summary.factor_count, 12);
        assert_eq!(summary.key_points.len(), MAX_KEY_POINTS);
        assert_eq!(summary.key_points[0], "Factor: Factor 1");
        assert!(summary.key_points.iter().all(|p| p.starts_with("Factor: ")));

        let short = DeliberationSummary::from_deliberation(&fixtures::deliberation("b", 0, 2));
        assert_eq!(
            short.key_points,
            vec!["Factor: Factor 1", "Factor: Factor 2", "Verdict: PROCEED", "Ship it"]
        );
    }

    #[test]
    fn test_preview_is_truncated_by_chars() {
        let mut deliberation = fixtures::deliberation("a", 0, 1);
        deliberation.problem_statement = "é".repeat(PREVIEW_CHARS + 50);
        let summary = DeliberationSummary::from_deliberation(&deliberation);
        assert_eq!(summary.problem_preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_sort_recent_first_truncates() {
        let mut summaries: Vec<_> = [("old", 30), ("new", 1), ("mid", 10)]
            .iter()
            .map(|(id, ago)| DeliberationSummary::from_deliberation(&fixtures::deliberation(id, *ago, 1)))
            .collect();
        sort_recent_first(&mut summaries, 2);
        let ids: Vec<_> = summaries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }
}
