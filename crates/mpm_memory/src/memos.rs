//! Memo ingestion and wide-in strict-out recall.

use crate::{archive, devlog, Memo, MemoryError, MemoryStore, NewMemo};
use mpm_db::now_ms;
use sqlx::QueryBuilder;
use tracing::error;

/// Result of a memo batch insert.
#[derive(Debug, Clone)]
pub struct AddedMemos {
    pub session_id: String,
    pub ids: Vec<i64>,
}

impl MemoryStore {
    /// Insert a batch of memos in one transaction, then kick off the
    /// dev-log rewrite and the archive append in the background. Sidecar
    /// failures are logged, never surfaced to the caller.
    pub async fn add_memos(&self, items: Vec<NewMemo>) -> Result<AddedMemos, MemoryError> {
        let session_id = session_id();
        let now = now_ms();

        let mut inserted = Vec::with_capacity(items.len());
        let mut tx = self.pool().begin().await?;
        for item in items {
            let row: (i64,) = sqlx::query_as(
                "INSERT INTO memos (category, entity, act, path, content, session_id, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&item.category)
            .bind(&item.entity)
            .bind(&item.act)
            .bind(&item.path)
            .bind(&item.content)
            .bind(&session_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(Memo {
                id: row.0,
                category: item.category,
                entity: item.entity,
                act: item.act,
                path: item.path,
                content: item.content,
                session_id: session_id.clone(),
                timestamp: now,
            });
        }
        tx.commit().await?;

        let ids = inserted.iter().map(|m| m.id).collect();

        // Fire-and-forget sidecars.
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = archive::append(store.layout(), &inserted).await {
                error!(error = %e, "Memo archive append failed");
            }
            if let Err(e) = devlog::sync(store.pool(), store.layout()).await {
                error!(error = %e, "dev-log.md sync failed");
            }
        });

        Ok(AddedMemos { session_id, ids })
    }

    /// Wide-in recall: every token matches content, entity or act; tokens
    /// are OR-joined; the optional category narrows; newest first.
    pub async fn search_memos(
        &self,
        keywords: &str,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Memo>, MemoryError> {
        let tokens: Vec<String> = keywords
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let mut qb = QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, category, entity, act, path, content, session_id, timestamp FROM memos",
        );

        let mut has_where = false;
        if !tokens.is_empty() {
            qb.push(" WHERE (");
            for (i, token) in tokens.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                let pattern = format!("%{}%", token);
                qb.push("(content LIKE ");
                qb.push_bind(pattern.clone());
                qb.push(" OR entity LIKE ");
                qb.push_bind(pattern.clone());
                qb.push(" OR act LIKE ");
                qb.push_bind(pattern);
                qb.push(")");
            }
            qb.push(")");
            has_where = true;
        }

        if let Some(cat) = category.filter(|c| !c.trim().is_empty()) {
            qb.push(if has_where { " AND " } else { " WHERE " });
            qb.push("category = ");
            qb.push_bind(cat.to_string());
        }

        qb.push(" ORDER BY timestamp DESC LIMIT ");
        qb.push_bind(limit.max(1));

        let memos = qb.build_query_as::<Memo>().fetch_all(self.pool()).await?;
        Ok(memos)
    }

    /// Most recent memos, newest first.
    pub async fn recent_memos(&self, limit: i64) -> Result<Vec<Memo>, MemoryError> {
        let memos = sqlx::query_as::<_, Memo>(
            "SELECT id, category, entity, act, path, content, session_id, timestamp \
             FROM memos ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit.max(1))
        .fetch_all(self.pool())
        .await?;
        Ok(memos)
    }
}

/// Short session id: lowercase-hex nanosecond clock, truncated.
fn session_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let mut hex = format!("{:x}", nanos);
    hex.truncate(10);
    hex
}
