//! End-to-end memory tests with real files and real databases.

use mpm_db::{open_db_at, DbKind};
use mpm_memory::{MemoryStore, NewMemo};
use mpm_project::{resolve_project_root, ProjectLayout};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn layout_for(dir: &TempDir) -> ProjectLayout {
    let proj = dir.path().join("proj");
    std::fs::create_dir_all(&proj).unwrap();
    let root = resolve_project_root(Some(&proj.to_string_lossy())).unwrap();
    let layout = ProjectLayout::new(root);
    layout.ensure().unwrap();
    layout
}

async fn open_store(layout: &ProjectLayout) -> MemoryStore {
    let pool = open_db_at(&layout.memory_db(), DbKind::Memory).await.unwrap();
    MemoryStore::new(pool, layout.clone())
}

fn memo(category: &str, entity: &str, act: &str, content: &str) -> NewMemo {
    NewMemo {
        category: category.to_string(),
        entity: entity.to_string(),
        act: act.to_string(),
        path: String::new(),
        content: content.to_string(),
    }
}

/// Wait for a fire-and-forget sidecar write to land on disk.
async fn wait_for(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("sidecar never appeared: {}", path.display());
}

#[tokio::test]
async fn memo_write_then_search_finds_it() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);
    let store = open_store(&layout).await;

    let added = store
        .add_memos(vec![memo(
            "fix",
            "GetSession",
            "add idempotency check",
            "prevent dup",
        )])
        .await
        .unwrap();
    assert_eq!(added.ids.len(), 1);
    assert!(!added.session_id.is_empty());

    // Keywords drawn from content, entity and act all hit.
    for keywords in ["dup", "GetSession", "idempotency"] {
        let found = store.search_memos(keywords, None, 20).await.unwrap();
        assert_eq!(found.len(), 1, "keyword {:?} should match", keywords);
        assert_eq!(found[0].content, "prevent dup");
    }

    // Category narrows.
    let none = store.search_memos("dup", Some("decision"), 20).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn search_tokenizes_on_whitespace_and_commas() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);
    let store = open_store(&layout).await;

    store
        .add_memos(vec![
            memo("fix", "alpha", "", "first thing"),
            memo("fix", "beta", "", "second thing"),
        ])
        .await
        .unwrap();

    // OR semantics: either token is enough.
    let found = store.search_memos("alpha,beta", None, 20).await.unwrap();
    assert_eq!(found.len(), 2);

    let found = store.search_memos("alpha nomatch", None, 20).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn archive_replay_recovers_deleted_database() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);

    {
        let store = open_store(&layout).await;
        store
            .add_memos(vec![memo(
                "fix",
                "GetSession",
                "add idempotency check",
                "prevent dup",
            )])
            .await
            .unwrap();
        store
            .add_memos(vec![memo(
                "decision",
                "timeout",
                "raise to 30s",
                "ECS cold start",
            )])
            .await
            .unwrap();

        wait_for(&layout.memo_archive()).await;
        // Two batches -> two background appends; give the second a beat.
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.pool().close().await;
    }

    // Disaster: the database is gone, the archive survives.
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(
            layout
                .memory_db()
                .with_file_name(format!("mcp_memory.db{}", suffix)),
        );
    }

    let store = open_store(&layout).await;
    let recovered = store.recover_if_empty().await.unwrap();
    assert_eq!(recovered, 2);

    let found = store.search_memos("timeout", None, 20).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "ECS cold start");
    assert_eq!(found[0].entity, "timeout");
}

#[tokio::test]
async fn devlog_parse_is_the_fallback_recovery_path() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);

    // No archive; only a hand-written mirror survives.
    std::fs::write(
        layout.dev_log(),
        "# Dev Log\n\n\
         - [2026-07-30 10:00:00] [decision] timeout | raise to 30s | ECS cold start\n\
         - [2026-07-29 09:00:00] [fix] GetSession | add idempotency check | prevent dup\n",
    )
    .unwrap();

    let store = open_store(&layout).await;
    let recovered = store.recover_if_empty().await.unwrap();
    assert_eq!(recovered, 2);

    let found = store.search_memos("idempotency", None, 20).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].category, "fix");

    // Newest first: the decision memo has the later timestamp.
    let recent = store.recent_memos(10).await.unwrap();
    assert_eq!(recent[0].entity, "timeout");
}

#[tokio::test]
async fn recovery_is_a_noop_when_memos_exist() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);
    let store = open_store(&layout).await;

    store
        .add_memos(vec![memo("fix", "x", "", "live row")])
        .await
        .unwrap();
    assert_eq!(store.recover_if_empty().await.unwrap(), 0);
}

#[tokio::test]
async fn devlog_mirror_rewrites_newest_first() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);
    let store = open_store(&layout).await;

    store
        .add_memos(vec![memo("fix", "one", "", "first")])
        .await
        .unwrap();
    wait_for(&layout.dev_log()).await;
    store
        .add_memos(vec![memo("fix", "two", "", "second")])
        .await
        .unwrap();

    // Wait until the second sync lands.
    for _ in 0..100 {
        let body = std::fs::read_to_string(layout.dev_log()).unwrap_or_default();
        if body.contains("second") {
            let first_pos = body.find("first").unwrap();
            let second_pos = body.find("second").unwrap();
            assert!(second_pos < first_pos, "mirror must be newest first");
            assert!(body.starts_with("# Dev Log"));
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("dev-log.md never caught up");
}

#[tokio::test]
async fn hooks_lifecycle() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);
    let store = open_store(&layout).await;

    let hook = store
        .create_hook("verify migration", "high", "db", "T1", Some(24))
        .await
        .unwrap();
    assert!(hook.hook_id.starts_with("hook_"));
    assert!(hook.expires_at.is_some());

    let open = store.list_hooks("open").await.unwrap();
    assert_eq!(open.len(), 1);

    let released = store
        .release_hook(&hook.hook_id, "migration verified")
        .await
        .unwrap();
    assert_eq!(released.status, "closed");
    assert_eq!(released.result_summary, "migration verified");

    assert!(store.list_hooks("open").await.unwrap().is_empty());
    assert_eq!(store.list_hooks("closed").await.unwrap().len(), 1);

    let err = store.list_hooks("done").await.unwrap_err();
    assert!(err.to_string().contains("status"));
}

#[tokio::test]
async fn facts_and_system_state() {
    let dir = TempDir::new().unwrap();
    let layout = layout_for(&dir);
    let store = open_store(&layout).await;

    store
        .add_fact("convention", "all timestamps are UTC milliseconds")
        .await
        .unwrap();
    let facts = store.search_facts("timestamps", 10).await.unwrap();
    assert_eq!(facts.len(), 1);

    store.set_state("active_persona", "reviewer", "persona").await.unwrap();
    store.set_state("active_persona", "architect", "persona").await.unwrap();
    assert_eq!(
        store.get_state("active_persona").await.unwrap().as_deref(),
        Some("architect")
    );
    assert_eq!(store.get_state("missing").await.unwrap(), None);
}
