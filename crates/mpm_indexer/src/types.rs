//! Row and report types for the indexer.

use serde::{Deserialize, Serialize};

/// How much of a file has been ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLevel {
    /// File entry recorded, symbol extraction deferred.
    Bootstrap,
    /// Symbols and call edges extracted.
    Full,
}

impl IndexLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "bootstrap" {
            Self::Bootstrap
        } else {
            Self::Full
        }
    }
}

/// One symbol as stored. `canonical_id` is
/// `<kind>:<rel_path>::<qualified_name>` and is the global uniqueness key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SymbolRow {
    pub symbol_id: i64,
    pub canonical_id: String,
    pub name: String,
    pub qualified_name: String,
    pub scope_path: String,
    pub node_type: String,
    pub file_path: String,
    pub line_start: i64,
    pub line_end: i64,
    pub signature: String,
}

/// Symbol extracted from one file, before row ids exist.
#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub canonical_id: String,
    pub name: String,
    pub qualified_name: String,
    pub scope_path: String,
    pub node_type: &'static str,
    pub line_start: i64,
    pub line_end: i64,
    pub signature: String,
}

/// Call site extracted from one file; `caller` indexes into the parsed
/// symbol list of the same file.
#[derive(Debug, Clone)]
pub struct ParsedCall {
    pub caller: usize,
    pub callee_name: String,
    pub line: i64,
}

/// Full parse result for one file.
#[derive(Debug, Clone, Default)]
pub struct FileParse {
    pub symbols: Vec<ParsedSymbol>,
    pub calls: Vec<ParsedCall>,
}

/// Result of an index run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSummary {
    pub total_files: usize,
    pub parsed: usize,
    pub skipped_unchanged: usize,
    pub bootstrapped: usize,
    pub deleted: usize,
    pub symbols: usize,
    pub call_edges: usize,
    pub elapsed_ms: u64,
}

/// Canonical id for a symbol.
pub fn canonical_id(node_type: &str, rel_path: &str, qualified_name: &str) -> String {
    format!("{}:{}::{}", node_type, rel_path, qualified_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_shape() {
        assert_eq!(
            canonical_id("function", "auth/a.go", "Login"),
            "function:auth/a.go::Login"
        );
        assert_eq!(
            canonical_id("method", "src/session.rs", "SessionManager::GetSession"),
            "method:src/session.rs::SessionManager::GetSession"
        );
    }
}
