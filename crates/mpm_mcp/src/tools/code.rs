//! Code intelligence tools: search, impact, map, flow trace, digest.

use super::McpTool;
use crate::analysis::{flow, grep, map_render};
use crate::session::SessionManager;
use anyhow::Result;
use async_trait::async_trait;
use mpm_indexer::map::{project_map, MapDetail};
use mpm_indexer::service::{ensure_fresh, index_scope};
use mpm_indexer::{analyze, query_symbols, symbol_at, Direction, IndexError};
use serde::Deserialize;
use serde_json::{json, Value};

/// Rendered maps beyond this size go to `project_map_<level>.md`.
const MAP_INLINE_LIMIT: usize = 2000;

pub struct CodeSearchTool;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    search_type: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

#[async_trait]
impl McpTool for CodeSearchTool {
    fn name(&self) -> &'static str {
        "code_search"
    }

    fn description(&self) -> &'static str {
        "Find symbols by name with AST-precise coordinates; falls back to text grep"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Symbol name or text" },
                "scope": { "type": "string", "description": "Project-relative sub-tree filter" },
                "search_type": {
                    "type": "string",
                    "description": "Node type filter: function, method, class, struct, interface, enum, module"
                },
                "limit": { "type": "integer", "default": 20 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: SearchArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        ensure_fresh(&handle.symbols, &handle.layout).await?;

        let hits = query_symbols(
            &handle.symbols,
            &args.query,
            args.scope.as_deref(),
            args.search_type.as_deref(),
            args.limit,
        )
        .await?;

        if !hits.is_empty() {
            return Ok(json!({ "source": "symbols", "results": hits }));
        }

        // No symbol matched: recursive text grep, each hit resolved to
        // its enclosing symbol.
        let grep_hits =
            grep::text_search(&handle.layout, &args.query, args.scope.as_deref()).await;
        if grep_hits.is_empty() {
            return Ok(json!({
                "source": "none",
                "results": [],
                "message": format!("No symbols or text matches found for '{}'", args.query),
            }));
        }

        let mut resolved = Vec::with_capacity(grep_hits.len());
        for hit in grep_hits {
            let enclosing = symbol_at(&handle.symbols, &hit.file, hit.line).await?;
            resolved.push(json!({
                "file": hit.file,
                "line": hit.line,
                "text": hit.text,
                "enclosing_symbol": enclosing,
            }));
        }
        Ok(json!({ "source": "grep", "results": resolved }))
    }
}

pub struct CodeImpactTool;

#[derive(Debug, Deserialize)]
struct ImpactArgs {
    symbol: String,
    #[serde(default = "default_direction")]
    direction: String,
}

fn default_direction() -> String {
    "backward".to_string()
}

#[async_trait]
impl McpTool for CodeImpactTool {
    fn name(&self) -> &'static str {
        "code_impact"
    }

    fn description(&self) -> &'static str {
        "Impact analysis over the call graph: callers, callees, complexity, risk"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Symbol name or canonical id" },
                "direction": {
                    "type": "string",
                    "enum": ["backward", "forward", "both"],
                    "default": "backward"
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: ImpactArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        ensure_fresh(&handle.symbols, &handle.layout).await?;

        let direction = Direction::parse(&args.direction)?;
        match analyze(&handle.symbols, &args.symbol, direction, 3).await {
            Ok(report) => Ok(json!(report)),
            Err(IndexError::SymbolNotFound(symbol)) => Ok(json!({
                "found": false,
                "message": format!("Symbol '{}' is not in the index; try code_search first", symbol),
            })),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct ProjectMapTool;

#[derive(Debug, Deserialize)]
struct MapArgs {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default = "default_level")]
    level: String,
}

fn default_level() -> String {
    "overview".to_string()
}

#[async_trait]
impl McpTool for ProjectMapTool {
    fn name(&self) -> &'static str {
        "project_map"
    }

    fn description(&self) -> &'static str {
        "Directory or symbol map with DICE complexity scores"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "scope": { "type": "string", "description": "Project-relative sub-tree" },
                "level": {
                    "type": "string",
                    "enum": ["overview", "standard", "full"],
                    "default": "overview"
                }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: MapArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;
        let detail = MapDetail::parse(&args.level)?;

        // Scoped refresh when the consumer knows the sub-tree.
        match args.scope.as_deref() {
            Some(scope) => {
                index_scope(&handle.symbols, &handle.layout, scope).await?;
            }
            None => {
                ensure_fresh(&handle.symbols, &handle.layout).await?;
            }
        }

        let report = project_map(&handle.symbols, args.scope.as_deref(), detail).await?;
        let rendered = map_render::render_markdown(&report, detail);

        if rendered.len() > MAP_INLINE_LIMIT {
            let path = handle.layout.project_map_file(detail.as_str());
            tokio::fs::write(&path, &rendered).await?;
            return Ok(json!({
                "statistics": report.statistics,
                "written_to": path.display().to_string(),
                "message": format!(
                    "Map is {} chars; full rendering written to {}",
                    rendered.len(),
                    path.display()
                ),
            }));
        }

        Ok(json!({
            "statistics": report.statistics,
            "complexity_map": report.complexity_map,
            "rendered": rendered,
        }))
    }
}

pub struct FlowTraceTool;

#[derive(Debug, Deserialize)]
struct FlowArgs {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    file: Option<String>,
}

#[async_trait]
impl McpTool for FlowTraceTool {
    fn name(&self) -> &'static str {
        "flow_trace"
    }

    fn description(&self) -> &'static str {
        "Trace upstream/downstream flow around a symbol or a file's entry point"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Symbol name or canonical id" },
                "file": { "type": "string", "description": "Project-relative file; best entry point is ranked" }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: FlowArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        ensure_fresh(&handle.symbols, &handle.layout).await?;

        match flow::flow_trace(
            &handle.symbols,
            args.symbol.as_deref(),
            args.file.as_deref(),
        )
        .await
        {
            Ok(value) => Ok(value),
            Err(IndexError::SymbolNotFound(symbol)) => Ok(json!({
                "found": false,
                "message": format!("Symbol '{}' is not in the index; try code_search first", symbol),
            })),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct ManagerAnalyzeTool;

#[async_trait]
impl McpTool for ManagerAnalyzeTool {
    fn name(&self) -> &'static str {
        "manager_analyze"
    }

    fn description(&self) -> &'static str {
        "Project health digest: index stats, complexity hotspots, open hooks, recent memos"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, session: &SessionManager) -> Result<Value> {
        let handle = session.current().await?;

        ensure_fresh(&handle.symbols, &handle.layout).await?;

        let report = project_map(&handle.symbols, None, MapDetail::Overview).await?;
        let mut hotspots: Vec<(&String, f64)> = report
            .complexity_map
            .iter()
            .map(|(name, score)| (name, score.as_f64().unwrap_or(0.0)))
            .collect();
        hotspots.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hotspots.truncate(5);
        let open_hooks = handle.memory.list_hooks("open").await?;
        let recent_memos = handle.memory.recent_memos(5).await?;
        let facts = handle.memory.list_facts(10).await?;

        Ok(json!({
            "statistics": report.statistics,
            "complexity_hotspots": hotspots
                .into_iter()
                .map(|(name, score)| json!({ "name": name, "score": score }))
                .collect::<Vec<_>>(),
            "open_hooks": open_hooks,
            "recent_memos": recent_memos,
            "known_facts": facts,
        }))
    }
}
