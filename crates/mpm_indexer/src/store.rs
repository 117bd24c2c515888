//! Symbol store operations over `symbols.db`.
//!
//! Per-file replacement is atomic within the enclosing batch
//! transaction: all symbols for a path are deleted (cascading their call
//! edges) and rewritten. The call-resolution post-pass runs after
//! ingestion and fills `callee_id` best-effort.

use crate::types::{FileParse, IndexLevel};
use crate::IndexError;
use mpm_db::{now_ms, DbPool};
use sqlx::{Row, SqliteConnection};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct IndexStore {
    pool: DbPool,
}

impl IndexStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Stored `(size, mtime, level)` for a file, if indexed before.
    pub async fn file_meta(
        &self,
        path: &str,
    ) -> Result<Option<(i64, i64, IndexLevel)>, IndexError> {
        let row = sqlx::query("SELECT size_bytes, mtime, index_level FROM files WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| {
            (
                r.get("size_bytes"),
                r.get("mtime"),
                IndexLevel::parse(r.get::<String, _>("index_level").as_str()),
            )
        }))
    }

    pub async fn file_count(&self) -> Result<i64, IndexError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All stored file paths, optionally restricted to a scope prefix.
    pub async fn file_paths(&self, scope: Option<&str>) -> Result<Vec<String>, IndexError> {
        let rows = match scope {
            Some(scope) => {
                sqlx::query("SELECT path FROM files WHERE path = ? OR path LIKE ? ORDER BY path")
                    .bind(scope)
                    .bind(format!("{}/%", scope.trim_end_matches('/')))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT path FROM files ORDER BY path")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(|r| r.get("path")).collect())
    }

    /// Upsert the file row inside the batch transaction.
    pub async fn upsert_file(
        conn: &mut SqliteConnection,
        path: &str,
        size: i64,
        mtime: i64,
        level: IndexLevel,
    ) -> Result<(), IndexError> {
        sqlx::query(
            "INSERT INTO files (path, size_bytes, mtime, index_level, indexed_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(path) DO UPDATE SET \
               size_bytes = excluded.size_bytes, \
               mtime = excluded.mtime, \
               index_level = excluded.index_level, \
               indexed_at = excluded.indexed_at",
        )
        .bind(path)
        .bind(size)
        .bind(mtime)
        .bind(level.as_str())
        .bind(now_ms())
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Replace every symbol and call edge for `path` with a fresh parse.
    /// Returns `(symbols, edges)` written.
    pub async fn replace_file_symbols(
        conn: &mut SqliteConnection,
        path: &str,
        parse: &FileParse,
    ) -> Result<(usize, usize), IndexError> {
        sqlx::query("DELETE FROM symbols WHERE file_path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        // Edges from other files pointing here stay; their callee_id is
        // re-resolved in the post-pass.

        let mut row_ids = Vec::with_capacity(parse.symbols.len());
        for symbol in &parse.symbols {
            let row: (i64,) = sqlx::query_as(
                "INSERT INTO symbols \
                 (canonical_id, name, qualified_name, scope_path, node_type, file_path, line_start, line_end, signature) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING symbol_id",
            )
            .bind(&symbol.canonical_id)
            .bind(&symbol.name)
            .bind(&symbol.qualified_name)
            .bind(&symbol.scope_path)
            .bind(symbol.node_type)
            .bind(path)
            .bind(symbol.line_start)
            .bind(symbol.line_end)
            .bind(&symbol.signature)
            .fetch_one(&mut *conn)
            .await?;
            row_ids.push(row.0);
        }

        let mut edges = 0usize;
        for call in &parse.calls {
            let Some(&caller_id) = row_ids.get(call.caller) else {
                continue;
            };
            sqlx::query(
                "INSERT INTO calls (caller_id, callee_id, callee_name, file_path, line) \
                 VALUES (?, NULL, ?, ?, ?)",
            )
            .bind(caller_id)
            .bind(&call.callee_name)
            .bind(path)
            .bind(call.line)
            .execute(&mut *conn)
            .await?;
            edges += 1;
        }

        Ok((row_ids.len(), edges))
    }

    /// Remove file rows (and cascaded symbols/edges) for paths that no
    /// longer exist on disk. Full scans only.
    pub async fn prune_missing(&self, seen: &HashSet<String>) -> Result<usize, IndexError> {
        let stored = self.file_paths(None).await?;
        let mut removed = 0usize;
        for path in stored {
            if seen.contains(&path) {
                continue;
            }
            sqlx::query("DELETE FROM symbols WHERE file_path = ?")
                .bind(&path)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM calls WHERE file_path = ?")
                .bind(&path)
                .execute(&self.pool)
                .await?;
            sqlx::query("DELETE FROM files WHERE path = ?")
                .bind(&path)
                .execute(&self.pool)
                .await?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "Pruned deleted files from index");
        }
        Ok(removed)
    }

    /// Best-effort callee resolution: same file, else same top-level
    /// directory, else globally unique name. Ambiguous and external calls
    /// keep a NULL `callee_id` with the raw name.
    pub async fn resolve_calls(&self) -> Result<usize, IndexError> {
        // Drop canonical ids that no longer exist (file moved or deleted).
        sqlx::query(
            "UPDATE calls SET callee_id = NULL \
             WHERE callee_id IS NOT NULL \
               AND callee_id NOT IN (SELECT canonical_id FROM symbols)",
        )
        .execute(&self.pool)
        .await?;

        let symbol_rows =
            sqlx::query("SELECT canonical_id, name, file_path FROM symbols")
                .fetch_all(&self.pool)
                .await?;
        let mut by_name: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in symbol_rows {
            by_name
                .entry(row.get("name"))
                .or_default()
                .push((row.get("canonical_id"), row.get("file_path")));
        }

        let unresolved =
            sqlx::query("SELECT id, callee_name, file_path FROM calls WHERE callee_id IS NULL")
                .fetch_all(&self.pool)
                .await?;

        let mut resolved = 0usize;
        let mut tx = self.pool.begin().await?;
        for row in unresolved {
            let call_id: i64 = row.get("id");
            let callee_name: String = row.get("callee_name");
            let file_path: String = row.get("file_path");

            let Some(candidates) = by_name.get(&callee_name) else {
                continue;
            };
            let target = pick_candidate(candidates, &file_path);
            if let Some(canonical) = target {
                sqlx::query("UPDATE calls SET callee_id = ? WHERE id = ?")
                    .bind(canonical)
                    .bind(call_id)
                    .execute(&mut *tx)
                    .await?;
                resolved += 1;
            }
        }
        tx.commit().await?;
        Ok(resolved)
    }

    /// Bound WAL growth between batches.
    pub async fn wal_checkpoint(&self) -> Result<(), IndexError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Same-module heuristic: prefer a declaration in the calling file, then
/// one sharing the top-level directory, then a globally unique name.
fn pick_candidate<'a>(
    candidates: &'a [(String, String)],
    caller_file: &str,
) -> Option<&'a String> {
    if let Some((canonical, _)) = candidates.iter().find(|(_, file)| file == caller_file) {
        return Some(canonical);
    }

    let caller_top = top_dir(caller_file);
    let in_dir: Vec<&(String, String)> = candidates
        .iter()
        .filter(|(_, file)| top_dir(file) == caller_top)
        .collect();
    if in_dir.len() == 1 {
        return Some(&in_dir[0].0);
    }

    if candidates.len() == 1 {
        return Some(&candidates[0].0);
    }
    None
}

fn top_dir(path: &str) -> &str {
    path.split('/').next().unwrap_or("")
}
