//! History adapter tests against real deliberations: file store round
//! trip, listing order and summary projection.

mod support;

use std::sync::Arc;

use deliberation::{
    Decision, DeliberationOrchestrator, FileHistoryStore, HistoryError, HistoryStore,
    SharedHistoryStore,
};
use support::{launch_script, test_config, ScriptedEngine, PROBLEM};
use tempfile::TempDir;

#[tokio::test]
async fn test_file_store_round_trip_and_listing() {
    let dir = TempDir::new().unwrap();
    let store: SharedHistoryStore = Arc::new(FileHistoryStore::new(dir.path().join("history.jsonl")));
    let orchestrator = DeliberationOrchestrator::new(ScriptedEngine::new(launch_script), test_config())
        .with_history(store.clone());

    let first = orchestrator.deliberate(PROBLEM).await.unwrap();
    let second = orchestrator
        .deliberate("Should we open a second warehouse? Customer demand doubled last quarter.")
        .await
        .unwrap();

    let fetched = store.get(&first.deliberation.id).await.unwrap();
    assert_eq!(fetched, first.deliberation);

    let listed = store.list(10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.deliberation.id);
    assert_eq!(listed[1].id, first.deliberation.id);

    let summary = &listed[1];
    assert_eq!(summary.factor_count, 4);
    assert_eq!(summary.decision, Decision::ConditionalProceed);
    assert!(PROBLEM.starts_with(&summary.problem_preview));
    assert_eq!(summary.key_points[0], "Factor: Customer demand");
    assert!(summary.key_points.contains(&"Verdict: CONDITIONAL_PROCEED".to_string()));
    assert!(summary.key_points.contains(&"Hire two sales staff".to_string()));

    assert_eq!(store.list(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unwritable_store_warns_but_returns_deliberation() {
    let dir = TempDir::new().unwrap();
    // A directory where the history file should be makes every append fail
    let path = dir.path().join("history.jsonl");
    std::fs::create_dir(&path).unwrap();

    let orchestrator = DeliberationOrchestrator::new(ScriptedEngine::new(launch_script), test_config())
        .with_history(Arc::new(FileHistoryStore::new(&path)));

    let outcome = orchestrator.deliberate(PROBLEM).await.unwrap();
    assert!(outcome.history_id.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("not saved"));
    assert_eq!(outcome.deliberation.factors.len(), 4);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = FileHistoryStore::new(dir.path().join("history.jsonl"));
    assert!(matches!(
        store.get("missing").await,
        Err(HistoryError::NotFound(_))
    ));
}
