//! Impact analysis: BFS over the call graph plus DICE complexity.
//!
//! Edges are followed where `callee_id` matches a canonical id or, for
//! unresolved edges, where `callee_name` matches the symbol name; the
//! union deliberately over-approximates callers (§ same-name ambiguity).
//! The graph has cycles, so the BFS tracks visited canonical ids.

use crate::types::SymbolRow;
use crate::IndexError;
use mpm_db::DbPool;
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_DEPTH: usize = 3;

const SELECT_COLUMNS: &str = "symbol_id, canonical_id, name, qualified_name, scope_path, \
                              node_type, file_path, line_start, line_end, signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Backward,
    Forward,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self, IndexError> {
        match s {
            "backward" => Ok(Self::Backward),
            "forward" => Ok(Self::Forward),
            "both" => Ok(Self::Both),
            other => Err(IndexError::InvalidArgument(format!(
                "direction must be backward, forward or both, got '{}'",
                other
            ))),
        }
    }
}

/// One node reached by the BFS.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactNode {
    pub canonical_id: String,
    pub name: String,
    pub node_type: String,
    pub file_path: String,
    pub line_start: i64,
    pub depth: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub node_id: String,
    pub name: String,
    pub direction: Direction,
    pub complexity_score: f64,
    pub complexity_level: String,
    pub risk_level: String,
    pub affected_nodes: usize,
    pub direct_callers: Vec<ImpactNode>,
    pub indirect_callers: Vec<ImpactNode>,
    pub direct_callees: Vec<ImpactNode>,
    pub indirect_callees: Vec<ImpactNode>,
    pub modification_checklist: Vec<String>,
}

/// Analyze impact relative to a symbol name or canonical id.
pub async fn analyze(
    pool: &DbPool,
    symbol: &str,
    direction: Direction,
    depth: usize,
) -> Result<ImpactReport, IndexError> {
    let target = find_target(pool, symbol).await?;
    let depth = depth.clamp(1, 5);

    let mut direct_callers = Vec::new();
    let mut indirect_callers = Vec::new();
    let mut direct_callees = Vec::new();
    let mut indirect_callees = Vec::new();

    if matches!(direction, Direction::Backward | Direction::Both) {
        let nodes = bfs(pool, &target, Direction::Backward, depth).await?;
        for node in nodes {
            if node.depth == 1 {
                direct_callers.push(node);
            } else {
                indirect_callers.push(node);
            }
        }
    }
    if matches!(direction, Direction::Forward | Direction::Both) {
        let nodes = bfs(pool, &target, Direction::Forward, depth).await?;
        for node in nodes {
            if node.depth == 1 {
                direct_callees.push(node);
            } else {
                indirect_callees.push(node);
            }
        }
    }

    let (fan_out, fan_in) = fan_degrees(pool, &target).await?;
    let complexity_score = dice_score(fan_out, fan_in);
    let affected_nodes = direct_callers.len()
        + indirect_callers.len()
        + direct_callees.len()
        + indirect_callees.len();

    let risk_level = risk_level(affected_nodes, fan_in, fan_out).to_string();
    let modification_checklist = checklist(
        &target,
        &direct_callers,
        &indirect_callers,
        affected_nodes,
    );

    Ok(ImpactReport {
        node_id: target.canonical_id.clone(),
        name: target.name.clone(),
        direction,
        complexity_score,
        complexity_level: complexity_level(complexity_score).to_string(),
        risk_level,
        affected_nodes,
        direct_callers,
        indirect_callers,
        direct_callees,
        indirect_callees,
        modification_checklist,
    })
}

/// DICE: `2·fan_out + 1·fan_in`.
pub fn dice_score(fan_out: i64, fan_in: i64) -> f64 {
    2.0 * fan_out as f64 + fan_in as f64
}

pub fn complexity_level(score: f64) -> &'static str {
    if score >= 80.0 {
        "Extreme"
    } else if score >= 50.0 {
        "High"
    } else if score >= 20.0 {
        "Medium"
    } else {
        "Simple"
    }
}

/// Out- and in-degree of one symbol. In-edges prefer `callee_id`
/// equality; unresolved edges fall back to the raw name.
pub async fn fan_degrees(pool: &DbPool, symbol: &SymbolRow) -> Result<(i64, i64), IndexError> {
    let (fan_out,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM calls WHERE caller_id = ?")
        .bind(symbol.symbol_id)
        .fetch_one(pool)
        .await?;
    let (fan_in,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM calls \
         WHERE callee_id = ? OR (callee_id IS NULL AND callee_name = ?)",
    )
    .bind(&symbol.canonical_id)
    .bind(&symbol.name)
    .fetch_one(pool)
    .await?;
    Ok((fan_out, fan_in))
}

async fn find_target(pool: &DbPool, symbol: &str) -> Result<SymbolRow, IndexError> {
    let by_canonical = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols WHERE canonical_id = ? LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(symbol)
    .fetch_optional(pool)
    .await?;
    if let Some(row) = by_canonical {
        return Ok(row);
    }

    sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols WHERE name = ? OR qualified_name = ? \
         ORDER BY canonical_id LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(symbol)
    .bind(symbol)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| IndexError::SymbolNotFound(symbol.to_string()))
}

async fn bfs(
    pool: &DbPool,
    target: &SymbolRow,
    direction: Direction,
    depth: usize,
) -> Result<Vec<ImpactNode>, IndexError> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(target.canonical_id.clone());

    let mut frontier = vec![target.clone()];
    let mut out = Vec::new();

    for level in 1..=depth {
        let mut next = Vec::new();
        for symbol in &frontier {
            let neighbors = match direction {
                Direction::Backward => callers_of(pool, symbol).await?,
                Direction::Forward => callees_of(pool, symbol).await?,
                Direction::Both => unreachable!("bfs runs per direction"),
            };
            for neighbor in neighbors {
                if !visited.insert(neighbor.canonical_id.clone()) {
                    continue;
                }
                out.push(ImpactNode {
                    canonical_id: neighbor.canonical_id.clone(),
                    name: neighbor.name.clone(),
                    node_type: neighbor.node_type.clone(),
                    file_path: neighbor.file_path.clone(),
                    line_start: neighbor.line_start,
                    depth: level,
                    direction,
                });
                next.push(neighbor);
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(out)
}

async fn callers_of(pool: &DbPool, symbol: &SymbolRow) -> Result<Vec<SymbolRow>, IndexError> {
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT DISTINCT s.{} FROM symbols s \
         JOIN calls c ON c.caller_id = s.symbol_id \
         WHERE c.callee_id = ? OR (c.callee_id IS NULL AND c.callee_name = ?)",
        SELECT_COLUMNS.replace(", ", ", s.")
    ))
    .bind(&symbol.canonical_id)
    .bind(&symbol.name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn callees_of(pool: &DbPool, symbol: &SymbolRow) -> Result<Vec<SymbolRow>, IndexError> {
    // Resolved edges join straight to the callee symbol; unresolved edges
    // fall back to any same-named declaration.
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT DISTINCT s.{} FROM symbols s \
         JOIN calls c ON (c.callee_id = s.canonical_id) \
                      OR (c.callee_id IS NULL AND c.callee_name = s.name) \
         WHERE c.caller_id = ?",
        SELECT_COLUMNS.replace(", ", ", s.")
    ))
    .bind(symbol.symbol_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

fn risk_level(affected: usize, fan_in: i64, fan_out: i64) -> &'static str {
    if affected >= 20 || fan_in >= 10 {
        "high"
    } else if affected >= 8 || fan_in >= 5 || fan_out >= 10 {
        "medium"
    } else {
        "low"
    }
}

fn checklist(
    target: &SymbolRow,
    direct: &[ImpactNode],
    indirect: &[ImpactNode],
    affected: usize,
) -> Vec<String> {
    let mut items = Vec::new();
    if direct.is_empty() && indirect.is_empty() {
        items.push(format!(
            "No in-project callers found for {}; verify external entry points before changing it",
            target.name
        ));
    } else {
        items.push(format!(
            "Review {} direct caller(s) before changing the signature of {}",
            direct.len(),
            target.name
        ));
        if !indirect.is_empty() {
            items.push(format!(
                "Walk {} indirect caller(s) for behavioral assumptions",
                indirect.len()
            ));
        }
        let mut files: Vec<&str> = direct.iter().map(|n| n.file_path.as_str()).collect();
        files.sort_unstable();
        files.dedup();
        files.truncate(3);
        items.push(format!("Re-run tests covering: {}", files.join(", ")));
    }
    if affected >= 20 {
        items.push("Large blast radius; consider staging the change behind a flag".to_string());
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dice_levels() {
        assert_eq!(complexity_level(dice_score(2, 3)), "Simple"); // 7
        assert_eq!(complexity_level(dice_score(8, 5)), "Medium"); // 21
        assert_eq!(complexity_level(dice_score(20, 12)), "High"); // 52
        assert_eq!(complexity_level(dice_score(35, 15)), "Extreme"); // 85
    }

    #[test]
    fn risk_thresholds() {
        assert_eq!(risk_level(0, 0, 0), "low");
        assert_eq!(risk_level(9, 0, 0), "medium");
        assert_eq!(risk_level(3, 6, 0), "medium");
        assert_eq!(risk_level(25, 0, 0), "high");
        assert_eq!(risk_level(1, 12, 0), "high");
    }
}
