//! Integration tests for the durable chain store against real SQLite.

use mpm_db::{open_db_at, DbKind};
use mpm_taskchain::{ChainError, ChainStatus, ChainStore, GateResult, PhaseStatus, SubTaskSpec};
use tempfile::TempDir;

async fn store_in(dir: &TempDir) -> ChainStore {
    let pool = open_db_at(&dir.path().join("mcp_memory.db"), DbKind::Memory)
        .await
        .unwrap();
    ChainStore::new(pool)
}

#[tokio::test]
async fn develop_happy_path_logs_ordered_events() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir).await;

    store.init("T1", "demo", "develop", None, "").await.unwrap();
    store.complete_execute("T1", "analyze", "3 subs").await.unwrap();
    store
        .complete_gate("T1", "plan_gate", GateResult::Pass, "ok")
        .await
        .unwrap();
    store
        .spawn_sub_tasks(
            "T1",
            "implement",
            vec![
                SubTaskSpec {
                    name: "A".to_string(),
                    verify: String::new(),
                },
                SubTaskSpec {
                    name: "B".to_string(),
                    verify: String::new(),
                },
            ],
        )
        .await
        .unwrap();
    store
        .complete_sub_task("T1", "implement", "sub_001", GateResult::Pass, "A done")
        .await
        .unwrap();
    store
        .complete_sub_task("T1", "implement", "sub_002", GateResult::Pass, "B done")
        .await
        .unwrap();
    store
        .complete_gate("T1", "verify_gate", GateResult::Pass, "tests green")
        .await
        .unwrap();
    let (chain, _) = store
        .complete_execute("T1", "finalize", "archived")
        .await
        .unwrap();

    assert!(chain.is_finished());
    assert_eq!(chain.status, ChainStatus::Finished);
    assert!(chain.phases.iter().all(|p| p.status == PhaseStatus::Passed));

    let kinds: Vec<String> = store
        .events("T1")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            "init",
            "start",
            "complete",
            "start",
            "complete",
            "start",
            "spawn",
            "start_sub",
            "complete_sub",
            "start_sub",
            "complete_sub",
            "start",
            "complete",
            "start",
            "complete",
            "finish",
        ]
    );
}

#[tokio::test]
async fn gate_retry_then_pass() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir).await;

    store.init("T1", "", "develop", None, "").await.unwrap();
    store.complete_execute("T1", "analyze", "v1").await.unwrap();

    let (_, outcome) = store
        .complete_gate("T1", "plan_gate", GateResult::Fail, "thin plan")
        .await
        .unwrap();
    assert_eq!(outcome.next, "analyze");
    assert_eq!(outcome.retry_count, 1);
    assert_eq!(outcome.max_retries, 2);
    assert!(!outcome.exhausted);

    store
        .complete_execute("T1", "analyze", "retry")
        .await
        .unwrap();
    let (chain, outcome) = store
        .complete_gate("T1", "plan_gate", GateResult::Pass, "ok")
        .await
        .unwrap();
    assert_eq!(outcome.next, "implement");
    assert!(!chain.phases.iter().any(|p| p.status == PhaseStatus::Failed));
}

#[tokio::test]
async fn gate_exhaustion_fails_chain_and_rejects_later_ops() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir).await;

    store.init("T1", "", "develop", None, "").await.unwrap();
    store.complete_execute("T1", "analyze", "v1").await.unwrap();
    store
        .complete_gate("T1", "plan_gate", GateResult::Fail, "one")
        .await
        .unwrap();
    store.complete_execute("T1", "analyze", "v2").await.unwrap();
    let (chain, outcome) = store
        .complete_gate("T1", "plan_gate", GateResult::Fail, "two")
        .await
        .unwrap();

    assert!(outcome.exhausted);
    assert_eq!(chain.status, ChainStatus::Failed);
    assert_eq!(
        chain
            .phases
            .iter()
            .find(|p| p.id == "plan_gate")
            .unwrap()
            .status,
        PhaseStatus::Failed
    );

    let err = store
        .complete_execute("T1", "implement", "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::ChainNotRunning(_)));

    // The failure survives a cache drop: it was persisted.
    store.clear_cache().await;
    let reloaded = store.load("T1").await.unwrap().unwrap();
    assert_eq!(reloaded.status, ChainStatus::Failed);
}

#[tokio::test]
async fn cross_session_resume_and_reinit_guard() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir).await;

    store.init("T2", "", "develop", None, "").await.unwrap();
    store.complete_execute("T2", "analyze", "done").await.unwrap();

    // Simulate a restart: the in-memory map is gone.
    store.clear_cache().await;

    let chain = store.resume("T2").await.unwrap();
    assert_eq!(chain.reinit_count, 0);
    let analyze = chain.phases.iter().find(|p| p.id == "analyze").unwrap();
    assert_eq!(analyze.status, PhaseStatus::Passed);
    // plan_gate was auto-activated by the completion before the restart.
    let gate = chain.phases.iter().find(|p| p.id == "plan_gate").unwrap();
    assert_eq!(gate.status, PhaseStatus::Active);

    // First re-init is allowed and bumps the persisted counter.
    let chain = store.init("T2", "", "develop", None, "").await.unwrap();
    assert_eq!(chain.reinit_count, 1);

    // Second re-init is refused, even after a restart.
    store.clear_cache().await;
    let err = store.init("T2", "", "develop", None, "").await.unwrap_err();
    assert!(matches!(err, ChainError::ReinitRefused(_)));
    let untouched = store.load("T2").await.unwrap().unwrap();
    assert_eq!(untouched.reinit_count, 1);
}

#[tokio::test]
async fn snapshot_round_trip_preserves_phases() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir).await;

    store.init("T3", "", "debug", None, "panic in parser").await.unwrap();
    store
        .complete_execute("T3", "reproduce", "repro steps")
        .await
        .unwrap();

    let before = store.load("T3").await.unwrap().unwrap();
    store.clear_cache().await;
    let after = store.resume("T3").await.unwrap();
    assert_eq!(before.phases, after.phases);
    assert_eq!(before.current_phase, after.current_phase);
}
