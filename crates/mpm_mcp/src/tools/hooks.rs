//! Hook tools: create, list, release.

use super::McpTool;
use crate::session::SessionManager;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct CreateHookTool;

#[derive(Debug, Deserialize)]
struct CreateArgs {
    description: String,
    #[serde(default = "default_priority")]
    priority: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    related_task_id: String,
    #[serde(default)]
    expires_in_hours: Option<i64>,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[async_trait]
impl McpTool for CreateHookTool {
    fn name(&self) -> &'static str {
        "manager_create_hook"
    }

    fn description(&self) -> &'static str {
        "Create a pending checkpoint to revisit later"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string" },
                "priority": { "type": "string", "enum": ["high", "medium", "low"], "default": "medium" },
                "tag": { "type": "string" },
                "related_task_id": { "type": "string" },
                "expires_in_hours": { "type": "integer" }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: CreateArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;
        let hook = handle
            .memory
            .create_hook(
                &args.description,
                &args.priority,
                &args.tag,
                &args.related_task_id,
                args.expires_in_hours,
            )
            .await?;
        Ok(json!({ "hook": hook }))
    }
}

pub struct ListHooksTool;

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default = "default_status")]
    status: String,
}

fn default_status() -> String {
    "open".to_string()
}

#[async_trait]
impl McpTool for ListHooksTool {
    fn name(&self) -> &'static str {
        "manager_list_hooks"
    }

    fn description(&self) -> &'static str {
        "List pending or closed checkpoints"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["open", "closed"], "default": "open" }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: ListArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;
        let hooks = handle.memory.list_hooks(&args.status).await?;
        Ok(json!({ "status": args.status, "hooks": hooks }))
    }
}

pub struct ReleaseHookTool;

#[derive(Debug, Deserialize)]
struct ReleaseArgs {
    hook_id: String,
    #[serde(default)]
    result_summary: String,
}

#[async_trait]
impl McpTool for ReleaseHookTool {
    fn name(&self) -> &'static str {
        "manager_release_hook"
    }

    fn description(&self) -> &'static str {
        "Close a checkpoint with a result summary"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hook_id": { "type": "string" },
                "result_summary": { "type": "string" }
            },
            "required": ["hook_id"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: ReleaseArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;
        let hook = handle
            .memory
            .release_hook(&args.hook_id, &args.result_summary)
            .await?;
        Ok(json!({ "hook": hook }))
    }
}
