//! Five-tier symbol search and enclosing-symbol lookup.
//!
//! Tiers run in order and the first one that yields results (after the
//! client-side scope and type filters) wins: exact, prefix/suffix,
//! substring, Levenshtein within distance 2, stem.

use crate::types::SymbolRow;
use crate::IndexError;
use mpm_db::DbPool;
use serde::Serialize;

const SELECT_COLUMNS: &str = "symbol_id, canonical_id, name, qualified_name, scope_path, \
                              node_type, file_path, line_start, line_end, signature";

/// Maximum edit distance for the Levenshtein tier.
const MAX_EDIT_DISTANCE: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub symbol: SymbolRow,
    pub match_type: String,
    pub score: f64,
}

/// Search for a symbol by name.
pub async fn query_symbols(
    pool: &DbPool,
    query: &str,
    scope: Option<&str>,
    node_type: Option<&str>,
    limit: usize,
) -> Result<Vec<SearchHit>, IndexError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(IndexError::InvalidArgument("empty query".to_string()));
    }

    // Tier 1: exact name or qualified name.
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols WHERE name = ? OR qualified_name = ? ORDER BY name LIMIT 200",
        SELECT_COLUMNS
    ))
    .bind(query)
    .bind(query)
    .fetch_all(pool)
    .await?;
    let hits = filter_hits(rows, scope, node_type, "exact", |_| 100.0);
    if !hits.is_empty() {
        return Ok(truncate(hits, limit));
    }

    // Tier 2: prefix / suffix.
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols WHERE name LIKE ? OR name LIKE ? ORDER BY length(name) LIMIT 200",
        SELECT_COLUMNS
    ))
    .bind(format!("{}%", query))
    .bind(format!("%{}", query))
    .fetch_all(pool)
    .await?;
    let hits = filter_hits(rows, scope, node_type, "prefix", |_| 80.0);
    if !hits.is_empty() {
        return Ok(truncate(hits, limit));
    }

    // Tier 3: substring over name and qualified name.
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols WHERE name LIKE ? OR qualified_name LIKE ? \
         ORDER BY length(name) LIMIT 200",
        SELECT_COLUMNS
    ))
    .bind(format!("%{}%", query))
    .bind(format!("%{}%", query))
    .fetch_all(pool)
    .await?;
    let hits = filter_hits(rows, scope, node_type, "substring", |_| 60.0);
    if !hits.is_empty() {
        return Ok(truncate(hits, limit));
    }

    // Tiers 4 and 5 compare against the candidate name set in process.
    let len = query.len() as i64;
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols WHERE length(name) BETWEEN ? AND ? LIMIT 5000",
        SELECT_COLUMNS
    ))
    .bind(len - MAX_EDIT_DISTANCE as i64)
    .bind(len + MAX_EDIT_DISTANCE as i64)
    .fetch_all(pool)
    .await?;

    let query_lower = query.to_lowercase();
    let fuzzy: Vec<(SymbolRow, usize)> = rows
        .into_iter()
        .filter_map(|row| {
            let d = levenshtein(&query_lower, &row.name.to_lowercase(), MAX_EDIT_DISTANCE)?;
            (d > 0).then_some((row, d))
        })
        .collect();
    let hits: Vec<SearchHit> = fuzzy
        .into_iter()
        .filter(|(row, _)| in_scope(row, scope) && type_matches(row, node_type))
        .map(|(symbol, d)| SearchHit {
            symbol,
            match_type: "levenshtein".to_string(),
            score: 40.0 - 5.0 * d as f64,
        })
        .collect();
    if !hits.is_empty() {
        return Ok(truncate(hits, limit));
    }

    // Tier 5: stem fallback.
    let stem_query = stem(query);
    let rows = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols LIMIT 20000",
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    let hits: Vec<SearchHit> = rows
        .into_iter()
        .filter(|row| !stem_query.is_empty() && stem(&row.name) == stem_query)
        .filter(|row| in_scope(row, scope) && type_matches(row, node_type))
        .map(|symbol| SearchHit {
            symbol,
            match_type: "stem".to_string(),
            score: 20.0,
        })
        .collect();
    Ok(truncate(hits, limit))
}

/// Symbol enclosing `(file, line)`: the tightest matching line range.
pub async fn symbol_at(
    pool: &DbPool,
    file: &str,
    line: i64,
) -> Result<Option<SymbolRow>, IndexError> {
    let row = sqlx::query_as::<_, SymbolRow>(&format!(
        "SELECT {} FROM symbols \
         WHERE file_path = ? AND line_start <= ? AND line_end >= ? \
         ORDER BY (line_end - line_start) ASC LIMIT 1",
        SELECT_COLUMNS
    ))
    .bind(file)
    .bind(line)
    .bind(line)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

fn truncate(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit.max(1));
    hits
}

fn filter_hits(
    rows: Vec<SymbolRow>,
    scope: Option<&str>,
    node_type: Option<&str>,
    match_type: &str,
    score: impl Fn(&SymbolRow) -> f64,
) -> Vec<SearchHit> {
    rows.into_iter()
        .filter(|row| in_scope(row, scope) && type_matches(row, node_type))
        .map(|symbol| {
            let s = score(&symbol);
            SearchHit {
                symbol,
                match_type: match_type.to_string(),
                score: s,
            }
        })
        .collect()
}

/// Client-side scope filter over normalized forward-slash paths.
fn in_scope(row: &SymbolRow, scope: Option<&str>) -> bool {
    let Some(scope) = scope.map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()) else {
        return true;
    };
    let path = row.file_path.trim_start_matches('/');
    path == scope || path.starts_with(&format!("{}/", scope))
}

/// Type filter: `function` also admits methods (a callable is a callable).
fn type_matches(row: &SymbolRow, node_type: Option<&str>) -> bool {
    match node_type.filter(|t| !t.trim().is_empty()) {
        None => true,
        Some("function") => row.node_type == "function" || row.node_type == "method",
        Some(t) => row.node_type == t,
    }
}

/// Bounded Levenshtein distance; `None` when above `max`.
fn levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut current);
    }
    (prev[b.len()] <= max).then_some(prev[b.len()])
}

/// Lightweight morphological normalization: case, separators, plural and
/// progressive suffixes, trailing digits.
fn stem(word: &str) -> String {
    let mut s: String = word
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();
    while s.ends_with(|c: char| c.is_ascii_digit()) {
        s.pop();
    }
    for suffix in ["ing", "ed", "es", "s"] {
        if s.len() > suffix.len() + 2 && s.ends_with(suffix) {
            s.truncate(s.len() - suffix.len());
            break;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_bounds() {
        assert_eq!(levenshtein("login", "login", 2), Some(0));
        assert_eq!(levenshtein("login", "logon", 2), Some(1));
        assert_eq!(levenshtein("login", "logging", 2), None);
        assert_eq!(levenshtein("abc", "xyz", 2), None);
    }

    #[test]
    fn stem_normalizes_separators_and_suffixes() {
        assert_eq!(stem("get_sessions"), stem("GetSession"));
        assert_eq!(stem("handler2"), stem("handlers"));
        assert_ne!(stem("login"), stem("logout"));
    }

    #[test]
    fn scope_filter_is_prefix_based() {
        let row = SymbolRow {
            symbol_id: 1,
            canonical_id: "function:auth/a.go::Login".to_string(),
            name: "Login".to_string(),
            qualified_name: "Login".to_string(),
            scope_path: String::new(),
            node_type: "function".to_string(),
            file_path: "auth/a.go".to_string(),
            line_start: 1,
            line_end: 3,
            signature: String::new(),
        };
        assert!(in_scope(&row, None));
        assert!(in_scope(&row, Some("auth")));
        assert!(in_scope(&row, Some("auth/")));
        assert!(!in_scope(&row, Some("api")));
        // "auth" must match as a path segment, not a string prefix.
        assert!(!in_scope(&row, Some("au")));
    }
}
