//! Flow tracing: entry-point ranking and upstream/downstream synthesis.

use mpm_db::DbPool;
use mpm_indexer::impact::{analyze, fan_degrees, Direction, ImpactNode};
use mpm_indexer::types::SymbolRow;
use mpm_indexer::IndexError;
use serde_json::{json, Value};

/// Cap for each of the upstream and downstream lists.
const NODE_LIMIT: usize = 15;

/// Trace data flow around a symbol, or around the best entry point of a
/// file when only a file is given.
pub async fn flow_trace(
    pool: &DbPool,
    symbol: Option<&str>,
    file: Option<&str>,
) -> Result<Value, IndexError> {
    let entry = match (symbol, file) {
        (Some(symbol), _) => symbol.to_string(),
        (None, Some(file)) => match rank_entry_points(pool, file).await?.into_iter().next() {
            Some(candidate) => candidate.canonical_id,
            None => {
                return Ok(json!({
                    "found": false,
                    "message": format!("No symbols indexed in '{}'; run initialize_project or check the path", file),
                }))
            }
        },
        (None, None) => {
            return Err(IndexError::InvalidArgument(
                "flow_trace needs a symbol or a file".to_string(),
            ))
        }
    };

    let backward = analyze(pool, &entry, Direction::Backward, 3).await?;
    let forward = analyze(pool, &entry, Direction::Forward, 3).await?;

    let mut upstream: Vec<&ImpactNode> = backward
        .direct_callers
        .iter()
        .chain(backward.indirect_callers.iter())
        .collect();
    upstream.truncate(NODE_LIMIT);
    let mut downstream: Vec<&ImpactNode> = forward
        .direct_callees
        .iter()
        .chain(forward.indirect_callees.iter())
        .collect();
    downstream.truncate(NODE_LIMIT);

    let critical_paths = critical_paths(&backward.name, &upstream, &downstream);

    let mut names: Vec<&str> = vec![backward.name.as_str()];
    names.extend(downstream.iter().map(|n| n.name.as_str()));
    let mut files: Vec<&str> = vec![];
    files.extend(downstream.iter().map(|n| n.file_path.as_str()));
    let side_effects = side_effect_tags(&names, &files);
    let stages = stage_tags(&names);

    Ok(json!({
        "found": true,
        "entry_point": {
            "canonical_id": backward.node_id.clone(),
            "name": backward.name.clone(),
            "complexity_score": backward.complexity_score,
            "complexity_level": backward.complexity_level.clone(),
            "risk_level": backward.risk_level.clone(),
            "callers": backward.direct_callers.len(),
            "callees": forward.direct_callees.len(),
        },
        "upstream": upstream.iter().map(|n| node_json(n)).collect::<Vec<_>>(),
        "downstream": downstream.iter().map(|n| node_json(n)).collect::<Vec<_>>(),
        "critical_paths": critical_paths,
        "side_effects": side_effects,
        "stages": stages,
    }))
}

/// Candidate entry points of a file: callable kinds first, then
/// cross-file in-edges, backward direct count, and a composite score.
pub async fn rank_entry_points(
    pool: &DbPool,
    file: &str,
) -> Result<Vec<SymbolRow>, IndexError> {
    let symbols = sqlx::query_as::<_, SymbolRow>(
        "SELECT symbol_id, canonical_id, name, qualified_name, scope_path, node_type, \
                file_path, line_start, line_end, signature \
         FROM symbols WHERE file_path = ? ORDER BY line_start",
    )
    .bind(file)
    .fetch_all(pool)
    .await?;

    let mut ranked = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let (cross_in,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM calls \
             WHERE (callee_id = ? OR (callee_id IS NULL AND callee_name = ?)) \
               AND file_path <> ?",
        )
        .bind(&symbol.canonical_id)
        .bind(&symbol.name)
        .bind(file)
        .fetch_one(pool)
        .await?;
        let (fan_out, fan_in) = fan_degrees(pool, &symbol).await?;
        let callable = matches!(symbol.node_type.as_str(), "function" | "method");
        let composite = 2.0 * cross_in as f64 + fan_in as f64 + 0.5 * fan_out as f64;
        ranked.push((symbol, callable, cross_in, fan_in, composite));
    }

    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then(b.2.cmp(&a.2))
            .then(b.3.cmp(&a.3))
            .then(
                b.4.partial_cmp(&a.4)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    Ok(ranked.into_iter().map(|(s, ..)| s).collect())
}

/// Top-3 paths stitched from upstream names through the entry into
/// downstream names.
fn critical_paths(
    entry: &str,
    upstream: &[&ImpactNode],
    downstream: &[&ImpactNode],
) -> Vec<String> {
    let mut paths = Vec::new();
    for i in 0..3 {
        let up = upstream.get(i).map(|n| n.name.as_str());
        let down = downstream.get(i).map(|n| n.name.as_str());
        if up.is_none() && down.is_none() {
            break;
        }
        let mut parts = Vec::new();
        if let Some(up) = up {
            parts.push(up);
        }
        parts.push(entry);
        if let Some(down) = down {
            parts.push(down);
        }
        paths.push(parts.join(" -> "));
    }
    paths
}

fn node_json(node: &ImpactNode) -> Value {
    json!({
        "canonical_id": node.canonical_id,
        "name": node.name,
        "type": node.node_type,
        "file": node.file_path,
        "line": node.line_start,
        "depth": node.depth,
    })
}

/// Best-effort side-effect tags from token scoring on symbol and file
/// names.
fn side_effect_tags(names: &[&str], files: &[&str]) -> Vec<&'static str> {
    let haystack = names
        .iter()
        .chain(files.iter())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut tags = Vec::new();
    let rules: &[(&[&str], &'static str)] = &[
        (&["write", "save", "insert", "update", "delete", "persist", "store", "db", "sql"], "storage-write"),
        (&["send", "publish", "post", "fetch", "request", "http", "rpc"], "network"),
        (&["log", "trace", "audit"], "logging"),
        (&["spawn", "thread", "exec", "process"], "process"),
    ];
    for (tokens, tag) in rules {
        if tokens.iter().any(|t| haystack.contains(t)) {
            tags.push(*tag);
        }
    }
    tags
}

/// Pipeline-stage tags from symbol names.
fn stage_tags(names: &[&str]) -> Vec<&'static str> {
    let haystack = names
        .iter()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut tags = Vec::new();
    let rules: &[(&[&str], &'static str)] = &[
        (&["init", "new", "setup", "open", "bind"], "initialization"),
        (&["parse", "decode", "read", "load", "scan"], "input"),
        (&["validate", "check", "verify", "guard"], "validation"),
        (&["transform", "convert", "map", "build", "resolve"], "transformation"),
        (&["render", "format", "write", "output", "emit", "flush"], "output"),
    ];
    for (tokens, tag) in rules {
        if tokens.iter().any(|t| haystack.contains(t)) {
            tags.push(*tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_paths_stitch_through_entry() {
        let up = ImpactNode {
            canonical_id: "function:a.go::Caller".to_string(),
            name: "Caller".to_string(),
            node_type: "function".to_string(),
            file_path: "a.go".to_string(),
            line_start: 1,
            depth: 1,
            direction: Direction::Backward,
        };
        let down = ImpactNode {
            canonical_id: "function:b.go::Callee".to_string(),
            name: "Callee".to_string(),
            node_type: "function".to_string(),
            file_path: "b.go".to_string(),
            line_start: 1,
            depth: 1,
            direction: Direction::Forward,
        };
        let paths = critical_paths("Entry", &[&up], &[&down]);
        assert_eq!(paths, vec!["Caller -> Entry -> Callee"]);

        let paths = critical_paths("Entry", &[], &[&down]);
        assert_eq!(paths, vec!["Entry -> Callee"]);
        assert!(critical_paths("Entry", &[], &[]).is_empty());
    }

    #[test]
    fn side_effect_tokens_detected() {
        let tags = side_effect_tags(&["saveRecord", "sendMail"], &["store/db.rs"]);
        assert!(tags.contains(&"storage-write"));
        assert!(tags.contains(&"network"));
        assert!(!tags.contains(&"logging"));
    }
}
