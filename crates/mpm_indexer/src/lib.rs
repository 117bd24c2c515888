//! Content-addressed, incremental AST indexer.
//!
//! Walks a repository, extracts symbols and call edges with tree-sitter,
//! and stores them in the per-project `symbols.db`. Serves search, impact
//! and map queries over that store. Incremental: files whose `(size,
//! mtime)` are unchanged are skipped; very large repositories get a
//! bootstrap pass that records file entries and defers symbol extraction
//! until a scoped query needs them.

pub mod engine;
pub mod impact;
pub mod lang;
pub mod map;
pub mod parser;
pub mod search;
pub mod service;
pub mod stack;
pub mod store;
pub mod types;

pub use engine::{IndexEngine, IndexOptions};
pub use impact::{analyze, Direction, ImpactReport};
pub use map::{project_map, structure_listing, MapDetail, MapReport};
pub use search::{query_symbols, symbol_at, SearchHit};
pub use service::{ensure_fresh, index_scope, run_index, IndexMode};
pub use types::{IndexLevel, IndexSummary, SymbolRow};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error at {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Parser error for {0}: {1}")]
    Parser(String, String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Indexing timed out after {0} seconds; partial state persists")]
    Timeout(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
