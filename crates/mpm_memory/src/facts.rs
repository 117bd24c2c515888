//! Known facts and the flat system_state KV.

use crate::{KnownFact, MemoryError, MemoryStore};
use mpm_db::now_ms;

impl MemoryStore {
    pub async fn add_fact(&self, fact_type: &str, summarize: &str) -> Result<KnownFact, MemoryError> {
        let now = now_ms();
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO known_facts (type, summarize, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(fact_type)
        .bind(summarize)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(KnownFact {
            id: row.0,
            fact_type: fact_type.to_string(),
            summarize: summarize.to_string(),
            created_at: now,
        })
    }

    pub async fn list_facts(&self, limit: i64) -> Result<Vec<KnownFact>, MemoryError> {
        let facts = sqlx::query_as::<_, KnownFact>(
            "SELECT id, type, summarize, created_at FROM known_facts \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit.max(1))
        .fetch_all(self.pool())
        .await?;
        Ok(facts)
    }

    /// Facts matching any keyword token, for recall alongside memos.
    pub async fn search_facts(&self, keywords: &str, limit: i64) -> Result<Vec<KnownFact>, MemoryError> {
        let tokens: Vec<String> = keywords
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", t))
            .collect();
        if tokens.is_empty() {
            return self.list_facts(limit).await;
        }

        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, type, summarize, created_at FROM known_facts WHERE ",
        );
        for (i, pattern) in tokens.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("summarize LIKE ");
            qb.push_bind(pattern.clone());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(limit.max(1));

        let facts = qb
            .build_query_as::<KnownFact>()
            .fetch_all(self.pool())
            .await?;
        Ok(facts)
    }

    /// Upsert one system_state row.
    pub async fn set_state(
        &self,
        key: &str,
        value: &str,
        category: &str,
    ) -> Result<(), MemoryError> {
        sqlx::query(
            "INSERT INTO system_state (key, value, category, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
               category = excluded.category, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(category)
        .bind(now_ms())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM system_state WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(v,)| v))
    }
}
