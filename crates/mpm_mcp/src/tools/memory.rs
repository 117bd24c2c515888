//! Memory tools: memo ingestion, recall, known facts.

use super::McpTool;
use crate::session::SessionManager;
use anyhow::{bail, Result};
use async_trait::async_trait;
use mpm_memory::NewMemo;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct MemoTool;

#[derive(Debug, Deserialize)]
struct MemoArgs {
    /// Batch form; a single memo may also be passed inline.
    #[serde(default)]
    items: Vec<NewMemo>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    entity: Option<String>,
    #[serde(default)]
    act: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl McpTool for MemoTool {
    fn name(&self) -> &'static str {
        "memo"
    }

    fn description(&self) -> &'static str {
        "Record development memos (persisted, mirrored to dev-log.md and the JSONL archive)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "description": "Batch of memos",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category": { "type": "string" },
                            "entity": { "type": "string" },
                            "act": { "type": "string" },
                            "path": { "type": "string" },
                            "content": { "type": "string" }
                        },
                        "required": ["content"]
                    }
                },
                "category": { "type": "string" },
                "entity": { "type": "string" },
                "act": { "type": "string" },
                "path": { "type": "string" },
                "content": { "type": "string", "description": "Single-memo shorthand" }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: MemoArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        let mut items = args.items;
        if let Some(content) = args.content {
            items.push(NewMemo {
                category: args.category.unwrap_or_default(),
                entity: args.entity.unwrap_or_default(),
                act: args.act.unwrap_or_default(),
                path: args.path.unwrap_or_default(),
                content,
            });
        }
        if items.is_empty() {
            bail!("memo needs either items[] or a content field");
        }

        let added = handle.memory.add_memos(items).await?;
        Ok(json!({
            "session_id": added.session_id,
            "ids": added.ids,
            "count": added.ids.len(),
        }))
    }
}

pub struct SystemRecallTool;

#[derive(Debug, Deserialize)]
struct RecallArgs {
    keywords: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[async_trait]
impl McpTool for SystemRecallTool {
    fn name(&self) -> &'static str {
        "system_recall"
    }

    fn description(&self) -> &'static str {
        "Recall memos and known facts by keywords (wide multi-field OR match)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keywords": { "type": "string", "description": "Whitespace/comma separated tokens" },
                "category": { "type": "string" },
                "limit": { "type": "integer", "default": 20 }
            },
            "required": ["keywords"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: RecallArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        let memos = handle
            .memory
            .search_memos(&args.keywords, args.category.as_deref(), args.limit)
            .await?;
        let facts = handle.memory.search_facts(&args.keywords, 10).await?;

        if memos.is_empty() && facts.is_empty() {
            return Ok(json!({
                "memos": [],
                "facts": [],
                "message": format!("Nothing recalled for '{}'", args.keywords),
            }));
        }
        Ok(json!({ "memos": memos, "facts": facts }))
    }
}

pub struct KnownFactsTool;

#[derive(Debug, Deserialize)]
struct FactsArgs {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default, rename = "type")]
    fact_type: Option<String>,
    #[serde(default)]
    summarize: Option<String>,
    #[serde(default = "default_facts_limit")]
    limit: i64,
}

fn default_action() -> String {
    "list".to_string()
}

fn default_facts_limit() -> i64 {
    50
}

#[async_trait]
impl McpTool for KnownFactsTool {
    fn name(&self) -> &'static str {
        "known_facts"
    }

    fn description(&self) -> &'static str {
        "Add or list standing rules the LLM should honor"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["add", "list"], "default": "list" },
                "type": { "type": "string", "description": "Fact category" },
                "summarize": { "type": "string", "description": "The rule itself (add)" },
                "limit": { "type": "integer", "default": 50 }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: FactsArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        match args.action.as_str() {
            "add" => {
                let Some(summarize) = args.summarize.filter(|s| !s.trim().is_empty()) else {
                    bail!("known_facts add needs a summarize field");
                };
                let fact = handle
                    .memory
                    .add_fact(args.fact_type.as_deref().unwrap_or(""), &summarize)
                    .await?;
                Ok(json!({ "added": fact }))
            }
            "list" => {
                let facts = handle.memory.list_facts(args.limit).await?;
                Ok(json!({ "facts": facts }))
            }
            other => bail!("unknown known_facts action '{}'", other),
        }
    }
}
