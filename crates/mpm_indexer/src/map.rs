//! Project map and structure modes.
//!
//! `map` reads the symbol store and attaches DICE scores; `structure` is
//! the cheap directory/file listing that never parses anything.

use crate::impact::{dice_score, fan_degrees};
use crate::stack::DEFAULT_IGNORE_DIRS;
use crate::types::SymbolRow;
use crate::IndexError;
use mpm_db::DbPool;
use mpm_project::ProjectLayout;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use walkdir::WalkDir;

/// How much detail the map carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapDetail {
    /// Directory-level rollup only.
    Overview,
    /// Per-file symbol listing.
    Standard,
    /// Per-file symbol listing with signatures.
    Full,
}

impl MapDetail {
    pub fn parse(s: &str) -> Result<Self, IndexError> {
        match s {
            "overview" => Ok(Self::Overview),
            "standard" => Ok(Self::Standard),
            "full" => Ok(Self::Full),
            other => Err(IndexError::InvalidArgument(format!(
                "detail must be overview, standard or full, got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Standard => "standard",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapReport {
    pub statistics: Value,
    pub structure: Value,
    pub complexity_map: Map<String, Value>,
}

/// Symbol map for the project (or a scoped sub-tree).
pub async fn project_map(
    pool: &DbPool,
    scope: Option<&str>,
    detail: MapDetail,
) -> Result<MapReport, IndexError> {
    let scope_norm = scope.map(|s| s.trim_matches('/').to_string());

    let mut symbols = sqlx::query_as::<_, SymbolRow>(
        "SELECT symbol_id, canonical_id, name, qualified_name, scope_path, node_type, \
                file_path, line_start, line_end, signature \
         FROM symbols ORDER BY file_path, line_start",
    )
    .fetch_all(pool)
    .await?;
    if let Some(ref scope) = scope_norm {
        symbols.retain(|s| {
            s.file_path == *scope || s.file_path.starts_with(&format!("{}/", scope))
        });
    }

    let (total_files,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
        .fetch_one(pool)
        .await?;
    let (total_edges,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM calls")
        .fetch_one(pool)
        .await?;

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for symbol in &symbols {
        *by_type.entry(symbol.node_type.as_str()).or_default() += 1;
    }

    let statistics = json!({
        "total_files": total_files,
        "total_symbols": symbols.len(),
        "call_edges": total_edges,
        "symbols_by_type": by_type,
        "scope": scope_norm,
    });

    let structure = build_structure(&symbols, detail);

    // DICE scores for callables in scope, largest first, capped.
    let mut complexity: Vec<(String, f64)> = Vec::new();
    for symbol in symbols
        .iter()
        .filter(|s| matches!(s.node_type.as_str(), "function" | "method"))
    {
        let (fan_out, fan_in) = fan_degrees(pool, symbol).await?;
        complexity.push((symbol.qualified_name.clone(), dice_score(fan_out, fan_in)));
    }
    complexity.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    complexity.truncate(200);

    let mut complexity_map = Map::new();
    for (name, score) in complexity {
        complexity_map.insert(name, json!(score));
    }

    Ok(MapReport {
        statistics,
        structure,
        complexity_map,
    })
}

fn build_structure(symbols: &[SymbolRow], detail: MapDetail) -> Value {
    let mut dirs: BTreeMap<String, (usize, usize)> = BTreeMap::new(); // dir -> (files, symbols)
    let mut files: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    let mut last_file = "";
    for symbol in symbols {
        let dir = symbol
            .file_path
            .rsplit_once('/')
            .map(|(d, _)| d)
            .unwrap_or(".");
        let entry = dirs.entry(dir.to_string()).or_default();
        if symbol.file_path != last_file {
            entry.0 += 1;
            last_file = &symbol.file_path;
        }
        entry.1 += 1;

        if detail != MapDetail::Overview {
            let mut node = json!({
                "name": symbol.qualified_name,
                "type": symbol.node_type,
                "line_start": symbol.line_start,
                "line_end": symbol.line_end,
            });
            if detail == MapDetail::Full {
                node["signature"] = json!(symbol.signature);
            }
            files.entry(symbol.file_path.clone()).or_default().push(node);
        }
    }

    let directories: Map<String, Value> = dirs
        .into_iter()
        .map(|(dir, (files, symbols))| {
            (dir, json!({ "files": files, "symbols": symbols }))
        })
        .collect();

    if detail == MapDetail::Overview {
        json!({ "directories": directories })
    } else {
        json!({ "directories": directories, "files": files })
    }
}

/// Cheap directory/file listing without parsing (mode=structure).
pub fn structure_listing(layout: &ProjectLayout, scope: Option<&str>) -> Value {
    let root = layout.root().path();
    let base = match scope {
        Some(scope) => root.join(scope.trim_matches('/')),
        None => root.to_path_buf(),
    };

    let mut dirs: Vec<String> = Vec::new();
    let mut files: Vec<Value> = Vec::new();

    let walker = WalkDir::new(&base)
        .max_depth(6)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir() && DEFAULT_IGNORE_DIRS.contains(&name.as_ref()))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        let rel = layout.relative(entry.path());
        if rel.is_empty() {
            continue;
        }
        if entry.file_type().is_dir() {
            dirs.push(rel);
        } else if let Ok(meta) = entry.metadata() {
            files.push(json!({ "path": rel, "size": meta.len() }));
        }
    }
    dirs.sort();

    json!({ "directories": dirs, "files": files })
}
