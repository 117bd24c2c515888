//! Hooks: pending checkpoints with priority, tag and optional expiry.

use crate::{Hook, MemoryError, MemoryStore};
use mpm_db::now_ms;

const PRIORITIES: &[&str] = &["high", "medium", "low"];

impl MemoryStore {
    /// Create an open hook. Ids are `hook_<5 hex>` from the low 20 bits
    /// of the nanosecond clock.
    pub async fn create_hook(
        &self,
        description: &str,
        priority: &str,
        tag: &str,
        related_task_id: &str,
        expires_in_hours: Option<i64>,
    ) -> Result<Hook, MemoryError> {
        let priority = priority.trim().to_lowercase();
        if !PRIORITIES.contains(&priority.as_str()) {
            return Err(MemoryError::InvalidField {
                field: "priority",
                value: priority,
            });
        }

        let now = now_ms();
        let hook = Hook {
            hook_id: hook_id(),
            description: description.to_string(),
            priority,
            tag: tag.to_string(),
            status: "open".to_string(),
            related_task_id: related_task_id.to_string(),
            expires_at: expires_in_hours.map(|h| now + h * 3_600_000),
            result_summary: String::new(),
            summary: String::new(),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO pending_hooks \
             (hook_id, description, priority, tag, status, related_task_id, expires_at, result_summary, summary, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&hook.hook_id)
        .bind(&hook.description)
        .bind(&hook.priority)
        .bind(&hook.tag)
        .bind(&hook.status)
        .bind(&hook.related_task_id)
        .bind(hook.expires_at)
        .bind(&hook.result_summary)
        .bind(&hook.summary)
        .bind(hook.created_at)
        .execute(self.pool())
        .await?;

        Ok(hook)
    }

    /// List hooks by status (`open` or `closed`), newest first.
    pub async fn list_hooks(&self, status: &str) -> Result<Vec<Hook>, MemoryError> {
        let status = status.trim().to_lowercase();
        if status != "open" && status != "closed" {
            return Err(MemoryError::InvalidField {
                field: "status",
                value: status,
            });
        }
        let hooks = sqlx::query_as::<_, Hook>(
            "SELECT hook_id, description, priority, tag, status, related_task_id, expires_at, \
                    result_summary, summary, created_at \
             FROM pending_hooks WHERE status = ? ORDER BY created_at DESC",
        )
        .bind(&status)
        .fetch_all(self.pool())
        .await?;
        Ok(hooks)
    }

    /// Close a hook, recording the result summary.
    pub async fn release_hook(
        &self,
        hook_id: &str,
        result_summary: &str,
    ) -> Result<Hook, MemoryError> {
        let updated = sqlx::query(
            "UPDATE pending_hooks SET status = 'closed', result_summary = ? WHERE hook_id = ?",
        )
        .bind(result_summary)
        .bind(hook_id)
        .execute(self.pool())
        .await?;
        if updated.rows_affected() == 0 {
            return Err(MemoryError::HookNotFound(hook_id.to_string()));
        }

        let hook = sqlx::query_as::<_, Hook>(
            "SELECT hook_id, description, priority, tag, status, related_task_id, expires_at, \
                    result_summary, summary, created_at \
             FROM pending_hooks WHERE hook_id = ?",
        )
        .bind(hook_id)
        .fetch_one(self.pool())
        .await?;
        Ok(hook)
    }
}

fn hook_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default() as u64;
    format!("hook_{:05x}", nanos & 0xF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_ids_are_five_hex_digits() {
        let id = hook_id();
        assert!(id.starts_with("hook_"));
        assert_eq!(id.len(), "hook_".len() + 5);
        assert!(id["hook_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
