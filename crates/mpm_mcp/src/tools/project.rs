//! initialize_project and index_status.

use super::McpTool;
use crate::analysis::rules;
use crate::session::SessionManager;
use anyhow::Result;
use async_trait::async_trait;
use mpm_indexer::engine::IndexOptions;
use mpm_indexer::service::{read_heartbeat, read_status, run_index_with_fallback};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

pub struct InitializeProjectTool;

#[derive(Debug, Deserialize)]
struct InitializeArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    force_full: bool,
}

#[async_trait]
impl McpTool for InitializeProjectTool {
    fn name(&self) -> &'static str {
        "initialize_project"
    }

    fn description(&self) -> &'static str {
        "Bind a project root, create the data layout and start background indexing"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute project root; omitted = env auto-detection"
                },
                "force_full": {
                    "type": "boolean",
                    "default": false,
                    "description": "Disable the large-repo bootstrap strategy"
                }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: InitializeArgs = serde_json::from_value(args)?;
        let (handle, recovered_memos) = session.bind(args.path.as_deref()).await?;

        // Background indexing; the rules file is rewritten when it lands.
        let bg = handle.clone();
        let force_full = args.force_full;
        tokio::spawn(async move {
            let opts = IndexOptions {
                force_full,
                ..Default::default()
            };
            match run_index_with_fallback(&bg.symbols, &bg.layout, opts).await {
                Ok(summary) => {
                    info!(files = summary.total_files, "Background index finished");
                    if let Err(e) = rules::rewrite_rules_file(&bg, &summary).await {
                        error!(error = %e, "Rules file rewrite failed");
                    }
                }
                Err(e) => error!(error = %e, "Background index failed"),
            }
        });

        Ok(json!({
            "project_root": handle.layout.root().as_str(),
            "data_dir": handle.layout.data_dir().display().to_string(),
            "recovered_memos": recovered_memos,
            "indexing": "started",
            "message": "Project bound; indexing runs in the background, poll index_status",
        }))
    }
}

pub struct IndexStatusTool;

#[async_trait]
impl McpTool for IndexStatusTool {
    fn name(&self) -> &'static str {
        "index_status"
    }

    fn description(&self) -> &'static str {
        "Report the state of the background indexer"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, session: &SessionManager) -> Result<Value> {
        let handle = session.current().await?;
        let status = read_status(&handle.layout);
        let heartbeat = read_heartbeat(&handle.layout);

        Ok(match status {
            Some(status) => json!({ "status": status, "heartbeat": heartbeat }),
            None => json!({
                "status": null,
                "heartbeat": heartbeat,
                "message": "No index run recorded yet",
            }),
        })
    }
}
