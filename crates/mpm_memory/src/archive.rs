//! Append-only JSONL sidecar: one memo per line, including its row id.
//!
//! The archive is the primary recovery source when the memory database
//! is lost; replay reproduces the table contents (row ids reassigned).

use crate::{Memo, MemoryError};
use mpm_db::{now_ms, DbPool};
use mpm_project::ProjectLayout;
use std::io::Write;
use tracing::warn;

pub(crate) async fn append(layout: &ProjectLayout, memos: &[Memo]) -> Result<(), MemoryError> {
    let path = layout.memo_archive();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MemoryError::Io(parent.display().to_string(), e))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| MemoryError::Io(path.display().to_string(), e))?;

    for memo in memos {
        let line = serde_json::to_string(memo)
            .map_err(|e| MemoryError::Io(path.display().to_string(), e.into()))?;
        writeln!(file, "{}", line).map_err(|e| MemoryError::Io(path.display().to_string(), e))?;
    }
    Ok(())
}

/// Replay the archive into an empty memos table. Returns rows inserted.
pub(crate) async fn replay(pool: &DbPool, layout: &ProjectLayout) -> Result<usize, MemoryError> {
    let path = layout.memo_archive();
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Ok(0);
    };

    let mut restored = 0usize;
    let mut tx = pool.begin().await?;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let memo: Memo = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Skipping corrupt archive line");
                continue;
            }
        };
        let timestamp = if memo.timestamp > 0 {
            memo.timestamp
        } else {
            now_ms()
        };
        sqlx::query(
            "INSERT INTO memos (category, entity, act, path, content, session_id, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&memo.category)
        .bind(&memo.entity)
        .bind(&memo.act)
        .bind(&memo.path)
        .bind(&memo.content)
        .bind(&memo.session_id)
        .bind(timestamp)
        .execute(&mut *tx)
        .await?;
        restored += 1;
    }
    tx.commit().await?;
    Ok(restored)
}
