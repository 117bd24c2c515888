//! End-to-end indexer tests over real fixture repositories.

use mpm_db::{open_db_at, DbKind};
use mpm_indexer::engine::IndexOptions;
use mpm_indexer::map::{project_map, MapDetail};
use mpm_indexer::service::{ensure_fresh, run_index};
use mpm_indexer::{analyze, query_symbols, symbol_at, Direction};
use mpm_project::{resolve_project_root, ProjectLayout};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    layout: ProjectLayout,
    pool: mpm_db::DbPool,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let proj = dir.path().join("repo");
    std::fs::create_dir_all(proj.join("auth")).unwrap();
    std::fs::create_dir_all(proj.join("api")).unwrap();

    std::fs::write(
        proj.join("auth/a.go"),
        r#"package auth

func Login(name string) string {
    session := makeSession(name)
    audit(session)
    return session
}

func makeSession(name string) string {
    return name
}

func audit(session string) {
}
"#,
    )
    .unwrap();

    std::fs::write(
        proj.join("api/b.py"),
        r#"class Login:
    def perform(self, name):
        return check(name)

def check(name):
    return name
"#,
    )
    .unwrap();

    let root = resolve_project_root(Some(&proj.to_string_lossy())).unwrap();
    let layout = ProjectLayout::new(root);
    layout.ensure().unwrap();
    let pool = open_db_at(&layout.symbols_db(), DbKind::Symbols)
        .await
        .unwrap();

    Fixture {
        _dir: dir,
        layout,
        pool,
    }
}

#[tokio::test]
async fn index_then_scoped_typed_search() {
    let fx = fixture().await;
    let summary = run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.parsed, 2);

    // Unfiltered: both the Go function and the Python class match.
    let hits = query_symbols(&fx.pool, "Login", None, None, 20).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.match_type == "exact"));

    // Scope + type narrows to the Go function with its line range.
    let hits = query_symbols(&fx.pool, "Login", Some("auth"), Some("function"), 20)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.symbol.file_path, "auth/a.go");
    assert_eq!(hit.symbol.node_type, "function");
    assert_eq!(hit.symbol.line_start, 3);
    assert!(hit.symbol.line_end >= 6);
}

#[tokio::test]
async fn canonical_ids_stable_across_noop_reindex() {
    let fx = fixture().await;
    run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();
    let before = query_symbols(&fx.pool, "Login", Some("auth"), None, 5)
        .await
        .unwrap();

    let summary = run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();
    assert_eq!(summary.parsed, 0);
    assert_eq!(summary.skipped_unchanged, 2);

    let after = query_symbols(&fx.pool, "Login", Some("auth"), None, 5)
        .await
        .unwrap();
    assert_eq!(
        before[0].symbol.canonical_id,
        after[0].symbol.canonical_id
    );
    assert_eq!(
        before[0].symbol.canonical_id,
        "function:auth/a.go::Login"
    );
}

#[tokio::test]
async fn impact_finds_callees_and_callers() {
    let fx = fixture().await;
    run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();

    let report = analyze(&fx.pool, "function:auth/a.go::Login", Direction::Forward, 3)
        .await
        .unwrap();
    let callees: Vec<&str> = report
        .direct_callees
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert!(callees.contains(&"makeSession"));
    assert!(callees.contains(&"audit"));

    let report = analyze(&fx.pool, "makeSession", Direction::Backward, 3)
        .await
        .unwrap();
    assert_eq!(report.direct_callers.len(), 1);
    assert_eq!(report.direct_callers[0].name, "Login");

    // fan_out(Login) = 2, fan_in = 0 -> DICE 4.0
    let report = analyze(&fx.pool, "Login", Direction::Both, 3).await.unwrap();
    assert_eq!(report.complexity_score, 4.0);
    assert_eq!(report.complexity_level, "Simple");
}

#[tokio::test]
async fn symbol_at_line_returns_tightest_enclosure() {
    let fx = fixture().await;
    run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();

    let symbol = symbol_at(&fx.pool, "api/b.py", 3).await.unwrap().unwrap();
    assert_eq!(symbol.qualified_name, "Login.perform");
    assert_eq!(symbol.node_type, "method");

    assert!(symbol_at(&fx.pool, "api/b.py", 999).await.unwrap().is_none());
}

#[tokio::test]
async fn changed_file_is_reparsed_and_deleted_file_pruned() {
    let fx = fixture().await;
    run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();

    // Rewrite one file with a new function and delete the other.
    let go_path = fx.layout.root().path().join("auth/a.go");
    std::fs::write(
        &go_path,
        "package auth\n\nfunc Logout(name string) {\n}\n",
    )
    .unwrap();
    // Ensure the mtime moves even on coarse filesystems.
    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
    let _ = filetime_set(&go_path, later);
    std::fs::remove_file(fx.layout.root().path().join("api/b.py")).unwrap();

    let summary = run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);

    let hits = query_symbols(&fx.pool, "Logout", None, None, 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(query_symbols(&fx.pool, "perform", None, None, 5)
        .await
        .unwrap()
        .is_empty());
}

fn filetime_set(path: &std::path::Path, to: std::time::SystemTime) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.set_modified(to)
}

#[tokio::test]
async fn empty_repository_indexes_to_zero_and_search_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let proj = dir.path().join("empty");
    std::fs::create_dir_all(&proj).unwrap();
    let root = resolve_project_root(Some(&proj.to_string_lossy())).unwrap();
    let layout = ProjectLayout::new(root);
    layout.ensure().unwrap();
    let pool = open_db_at(&layout.symbols_db(), DbKind::Symbols)
        .await
        .unwrap();

    let summary = run_index(&pool, &layout, IndexOptions::default(), "index")
        .await
        .unwrap();
    assert_eq!(summary.total_files, 0);

    let hits = query_symbols(&pool, "anything", None, None, 5).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn ensure_fresh_is_idempotent_within_window() {
    let fx = fixture().await;
    let first = ensure_fresh(&fx.pool, &fx.layout).await.unwrap();
    assert!(first, "first call must run the indexer");

    let second = ensure_fresh(&fx.pool, &fx.layout).await.unwrap();
    assert!(!second, "second call within the window must be a no-op");
}

#[tokio::test]
async fn map_carries_statistics_and_complexity() {
    let fx = fixture().await;
    run_index(&fx.pool, &fx.layout, IndexOptions::default(), "index")
        .await
        .unwrap();

    let report = project_map(&fx.pool, None, MapDetail::Standard).await.unwrap();
    assert_eq!(report.statistics["total_files"], 2);
    assert!(report.statistics["total_symbols"].as_u64().unwrap() >= 5);
    // Login calls two functions: DICE 2*2 + 0 = 4.
    assert_eq!(report.complexity_map.get("Login").unwrap().as_f64(), Some(4.0));

    let scoped = project_map(&fx.pool, Some("api"), MapDetail::Overview)
        .await
        .unwrap();
    let dirs = scoped.structure["directories"].as_object().unwrap();
    assert!(dirs.contains_key("api"));
    assert!(!dirs.contains_key("auth"));
}
