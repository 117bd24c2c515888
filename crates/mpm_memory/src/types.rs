//! Row types for the memory database.

use serde::{Deserialize, Serialize};

/// One development memo. Timestamps are INTEGER milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Memo {
    pub id: i64,
    pub category: String,
    pub entity: String,
    pub act: String,
    pub path: String,
    pub content: String,
    pub session_id: String,
    pub timestamp: i64,
}

/// Input shape for memo ingestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMemo {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub act: String,
    #[serde(default)]
    pub path: String,
    pub content: String,
}

/// An LLM-visible standing rule.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnownFact {
    pub id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub fact_type: String,
    pub summarize: String,
    pub created_at: i64,
}

/// A pending checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hook {
    pub hook_id: String,
    pub description: String,
    pub priority: String,
    pub tag: String,
    pub status: String,
    pub related_task_id: String,
    pub expires_at: Option<i64>,
    pub result_summary: String,
    pub summary: String,
    pub created_at: i64,
}
