//! Per-project memory: memos, known facts, hooks and small runtime state.
//!
//! Memos are append-only. The database is canonical at runtime, but two
//! best-effort sidecars exist for disaster recovery: the JSONL archive
//! (`dev-log-archive/memo_archive.jsonl`, one memo per line) and the
//! human-readable `dev-log.md` mirror of the latest 100 memos. On a cold
//! start with an empty memos table, the archive is replayed; failing
//! that, the dev-log is parsed back.

mod archive;
mod devlog;
mod facts;
mod hooks;
mod memos;
mod types;

pub use memos::AddedMemos;
pub use types::{Hook, KnownFact, Memo, NewMemo};

use mpm_db::DbPool;
use mpm_project::ProjectLayout;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Hook not found: {0}")]
    HookNotFound(String),

    #[error("I/O error at {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

/// Handle over one project's memory database and its sidecar files.
#[derive(Clone)]
pub struct MemoryStore {
    pool: DbPool,
    layout: ProjectLayout,
}

impl MemoryStore {
    pub fn new(pool: DbPool, layout: ProjectLayout) -> Self {
        Self { pool, layout }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Cold-start recovery: when the memos table is empty, replay the
    /// JSONL archive; if the archive is absent or empty, parse the
    /// dev-log mirror. Original timestamps are preserved where present.
    pub async fn recover_if_empty(&self) -> Result<usize, MemoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memos")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(0);
        }

        let recovered = archive::replay(&self.pool, &self.layout).await?;
        if recovered > 0 {
            info!(recovered, "Recovered memos from JSONL archive");
            return Ok(recovered);
        }

        let recovered = devlog::replay(&self.pool, &self.layout).await?;
        if recovered > 0 {
            info!(recovered, "Recovered memos from dev-log.md");
        }
        Ok(recovered)
    }
}
