//! `mpm-ast`: standalone indexer entry point.
//!
//! Writes the result JSON to `--output` and exits 0; any failure prints
//! to stderr and exits non-zero. The server usually drives the index
//! engine in-process; this binary exposes the same engine for external
//! callers and debugging.

use anyhow::{bail, Context, Result};
use clap::Parser;
use mpm_db::{open_db_at, DbKind};
use mpm_indexer::engine::IndexOptions;
use mpm_indexer::map::{project_map, structure_listing, MapDetail};
use mpm_indexer::service::{run_index, IndexMode};
use mpm_indexer::{analyze, query_symbols, symbol_at, Direction};
use mpm_project::{resolve_project_root, ProjectLayout};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "mpm-ast", about = "AST indexer for MPM projects", version)]
struct Cli {
    /// index | query | map | structure | analyze
    #[arg(long)]
    mode: String,

    /// Absolute project root
    #[arg(long)]
    project: String,

    /// Path to symbols.db
    #[arg(long)]
    db: PathBuf,

    /// Where the result JSON is written
    #[arg(long)]
    output: PathBuf,

    /// Project-relative sub-tree
    #[arg(long)]
    scope: Option<String>,

    /// Symbol name or canonical id (query / analyze)
    #[arg(long)]
    query: Option<String>,

    /// File for symbol-at-line lookup
    #[arg(long)]
    file: Option<String>,

    /// Line for symbol-at-line lookup
    #[arg(long)]
    line: Option<i64>,

    /// backward | forward | both
    #[arg(long, default_value = "backward")]
    direction: String,

    /// overview | standard | full
    #[arg(long, default_value = "standard")]
    detail: String,

    /// Extra ignored directory names
    #[arg(long, value_delimiter = ',')]
    ignore_dirs: Vec<String>,

    /// Extension whitelist
    #[arg(long, value_delimiter = ',')]
    extensions: Vec<String>,

    /// Disable the bootstrap strategy
    #[arg(long)]
    force_full: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("mpm-ast: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mode = IndexMode::parse(&cli.mode)?;

    let root = resolve_project_root(Some(&cli.project))?;
    let layout = ProjectLayout::new(root);
    layout.ensure().context("Failed to create project data directories")?;
    let pool = open_db_at(&cli.db, DbKind::Symbols)
        .await
        .context("Failed to open symbols database")?;

    let result = match mode {
        IndexMode::Index => {
            let opts = IndexOptions {
                scope: cli.scope.clone(),
                force_full: cli.force_full,
                ignore_dirs: cli.ignore_dirs.clone(),
                extensions: cli.extensions.clone(),
            };
            let summary = run_index(&pool, &layout, opts, "index").await?;
            json!(summary)
        }
        IndexMode::Query => match (&cli.file, cli.line) {
            (Some(file), Some(line)) => {
                let symbol = symbol_at(&pool, file, line).await?;
                json!({ "file": file, "line": line, "symbol": symbol })
            }
            _ => {
                let Some(query) = cli.query.as_deref() else {
                    bail!("--mode query needs --query, or --file with --line");
                };
                let hits =
                    query_symbols(&pool, query, cli.scope.as_deref(), None, 50).await?;
                json!({ "query": query, "results": hits })
            }
        },
        IndexMode::Map => {
            let detail = MapDetail::parse(&cli.detail)?;
            let report = project_map(&pool, cli.scope.as_deref(), detail).await?;
            json!(report)
        }
        IndexMode::Structure => structure_listing(&layout, cli.scope.as_deref()),
        IndexMode::Analyze => {
            let Some(query) = cli.query.as_deref() else {
                bail!("--mode analyze needs --query");
            };
            let direction = Direction::parse(&cli.direction)?;
            let report = analyze(&pool, query, direction, 3).await?;
            json!(report)
        }
    };

    let body = serde_json::to_string_pretty(&result)?;
    std::fs::write(&cli.output, body)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;
    Ok(())
}
