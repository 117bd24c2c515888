//! Pool creation and the process-wide handle cache.
//!
//! Handles are cached per `(project, kind)` via the absolute db path, so
//! concurrent tool calls against the same project share one pool. SQLite's
//! own locking plus WAL and the 30s busy timeout serialize writers.

use crate::schema::ensure_schema;
use crate::DbError;
use once_cell::sync::Lazy;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Pool type used throughout the workspace.
pub type DbPool = SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECTIONS: u32 = 5;

static POOL_CACHE: Lazy<Mutex<HashMap<PathBuf, DbPool>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Which of the two per-project databases to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    /// `symbols.db` - files, symbols, call edges
    Symbols,
    /// `mcp_memory.db` - memos, facts, hooks, task chains, system state
    Memory,
}

/// File name for a database kind under `.mcp-data/`.
pub fn db_file_name(kind: DbKind) -> &'static str {
    match kind {
        DbKind::Symbols => "symbols.db",
        DbKind::Memory => "mcp_memory.db",
    }
}

/// Current wall clock in integer milliseconds, the timestamp unit used by
/// every table.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Open (or fetch from cache) the database at `db_path`.
///
/// On first open this enforces the connection pragmas
/// (`foreign_keys=ON`, `journal_mode=WAL`, `synchronous=NORMAL`,
/// `busy_timeout=30s`) and runs the self-healing schema step for `kind`.
pub async fn open_db_at(db_path: &Path, kind: DbKind) -> Result<DbPool, DbError> {
    let key = normalize_key(db_path)?;

    let mut cache = POOL_CACHE.lock().await;
    if let Some(pool) = cache.get(&key) {
        if pool.is_closed() {
            cache.remove(&key);
        } else {
            return Ok(pool.clone());
        }
    }

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DbError::InvalidPath(format!("{}: {}", parent.display(), e)))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    ensure_schema(&pool, kind).await?;

    info!(path = %db_path.display(), ?kind, "Opened project database");
    cache.insert(key, pool.clone());
    Ok(pool)
}

fn normalize_key(db_path: &Path) -> Result<PathBuf, DbError> {
    if db_path.as_os_str().is_empty() {
        return Err(DbError::InvalidPath("empty path".to_string()));
    }
    // Canonicalize when the file already exists; otherwise absolutize so two
    // spellings of the same path share one pool.
    match db_path.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) => std::path::absolute(db_path)
            .map_err(|e| DbError::InvalidPath(format!("{}: {}", db_path.display(), e))),
    }
}
