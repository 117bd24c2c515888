//! Embedded SQLite store for MPM project databases.
//!
//! Every project gets two databases under `.mcp-data/`: `symbols.db` for
//! the AST indexer and `mcp_memory.db` for memos, facts, hooks and task
//! chains. Pools are cached process-wide keyed by absolute db path, and
//! every open runs the self-healing schema step.

mod pool;
mod schema;

pub use pool::{db_file_name, now_ms, open_db_at, DbKind, DbPool};
pub use schema::ensure_schema;

use thiserror::Error;

/// Database layer errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid database path: {0}")]
    InvalidPath(String),

    #[error("Schema error: {0}")]
    Schema(String),
}
