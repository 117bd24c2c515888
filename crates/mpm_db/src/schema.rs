//! Self-healing schema for the two project databases.
//!
//! Every open runs `CREATE TABLE IF NOT EXISTS` for all known tables,
//! creates indexes, then applies `ALTER TABLE ADD COLUMN` migrations that
//! tolerate "duplicate column name" errors, so older databases upgrade in
//! place.
//!
//! All timestamps are INTEGER milliseconds since the Unix epoch.

use crate::{DbError, DbKind, DbPool};
use tracing::{debug, warn};

/// Indexer database: files, symbols, call edges.
const SYMBOLS_SCHEMA_SQL: &str = r#"
-- Files: one row per indexed file, keyed by project-relative path
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    size_bytes INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    index_level TEXT NOT NULL DEFAULT 'full',
    indexed_at INTEGER NOT NULL
);

-- Symbols: declarations extracted from the AST
CREATE TABLE IF NOT EXISTS symbols (
    symbol_id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_id TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    scope_path TEXT NOT NULL DEFAULT '',
    node_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    signature TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_symbols_canonical ON symbols(canonical_id);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_qualified ON symbols(qualified_name);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path);

-- Call edges: caller symbol -> callee (resolved canonical id or raw name)
CREATE TABLE IF NOT EXISTS calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_id INTEGER NOT NULL REFERENCES symbols(symbol_id) ON DELETE CASCADE,
    callee_id TEXT,
    callee_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_calls_caller ON calls(caller_id);
CREATE INDEX IF NOT EXISTS idx_calls_callee ON calls(callee_id);
CREATE INDEX IF NOT EXISTS idx_calls_callee_name ON calls(callee_name);
CREATE INDEX IF NOT EXISTS idx_calls_file ON calls(file_path);
"#;

/// Memory database: memos, facts, hooks, task chains, system state.
const MEMORY_SCHEMA_SQL: &str = r#"
-- Memos: append-only development notes, mirrored into dev-log.md
CREATE TABLE IF NOT EXISTS memos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL DEFAULT '',
    entity TEXT NOT NULL DEFAULT '',
    act TEXT NOT NULL DEFAULT '',
    path TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    session_id TEXT NOT NULL DEFAULT '',
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memos_timestamp ON memos(timestamp);
CREATE INDEX IF NOT EXISTS idx_memos_category ON memos(category);

-- Known facts: LLM-visible standing rules
CREATE TABLE IF NOT EXISTS known_facts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL DEFAULT '',
    summarize TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Hooks: pending checkpoints with priority and optional expiry
CREATE TABLE IF NOT EXISTS pending_hooks (
    hook_id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium',
    tag TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'open',
    related_task_id TEXT NOT NULL DEFAULT '',
    expires_at INTEGER,
    result_summary TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_hooks_status ON pending_hooks(status);

-- Task chains: snapshot row per chain, phases serialized as JSON
CREATE TABLE IF NOT EXISTS task_chains (
    task_id TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT '',
    protocol TEXT NOT NULL DEFAULT 'linear',
    status TEXT NOT NULL DEFAULT 'running',
    phases_json TEXT NOT NULL,
    current_phase TEXT NOT NULL DEFAULT '',
    reinit_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Task chain events: append-only audit log, source of truth
CREATE TABLE IF NOT EXISTS task_chain_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    phase_id TEXT NOT NULL DEFAULT '',
    sub_id TEXT NOT NULL DEFAULT '',
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chain_events_task ON task_chain_events(task_id);

-- System state: flat KV for small runtime settings (active persona, ...)
CREATE TABLE IF NOT EXISTS system_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT '',
    updated_at INTEGER NOT NULL
);
"#;

/// Forward-compatible column additions. Each statement runs on every open;
/// "duplicate column name" is expected and ignored.
const SYMBOLS_MIGRATIONS: &[&str] = &[
    "ALTER TABLE files ADD COLUMN index_level TEXT NOT NULL DEFAULT 'full'",
    "ALTER TABLE symbols ADD COLUMN signature TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE symbols ADD COLUMN scope_path TEXT NOT NULL DEFAULT ''",
];

const MEMORY_MIGRATIONS: &[&str] = &[
    "ALTER TABLE memos ADD COLUMN path TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE memos ADD COLUMN session_id TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE pending_hooks ADD COLUMN summary TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE pending_hooks ADD COLUMN related_task_id TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE task_chains ADD COLUMN reinit_count INTEGER NOT NULL DEFAULT 0",
];

/// Create all tables and indexes for `kind`, then run tolerant migrations.
pub async fn ensure_schema(pool: &DbPool, kind: DbKind) -> Result<(), DbError> {
    let (schema, migrations) = match kind {
        DbKind::Symbols => (SYMBOLS_SCHEMA_SQL, SYMBOLS_MIGRATIONS),
        DbKind::Memory => (MEMORY_SCHEMA_SQL, MEMORY_MIGRATIONS),
    };

    sqlx::raw_sql(schema)
        .execute(pool)
        .await
        .map_err(|e| DbError::Schema(format!("schema creation failed: {}", e)))?;

    for stmt in migrations {
        if let Err(e) = sqlx::query(stmt).execute(pool).await {
            let msg = e.to_string();
            if msg.contains("duplicate column name") {
                debug!(stmt, "Migration column already present");
            } else {
                warn!(stmt, error = %msg, "Migration statement failed");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_db_at;

    #[tokio::test]
    async fn schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_db_at(&dir.path().join("m.db"), DbKind::Memory)
            .await
            .unwrap();

        // Second and third runs must be no-ops, including migrations.
        ensure_schema(&pool, DbKind::Memory).await.unwrap();
        ensure_schema(&pool, DbKind::Memory).await.unwrap();

        sqlx::query("INSERT INTO memos (content, timestamp) VALUES ('x', 0)")
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn symbols_schema_enforces_caller_fk() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_db_at(&dir.path().join("s.db"), DbKind::Symbols)
            .await
            .unwrap();

        let res = sqlx::query(
            "INSERT INTO calls (caller_id, callee_name, file_path, line) VALUES (999, 'f', 'a.rs', 1)",
        )
        .execute(&pool)
        .await;
        assert!(res.is_err(), "dangling caller_id must be rejected");
    }
}
