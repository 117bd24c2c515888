//! Indexer service: freshness window, scoped refresh, status sidecars.
//!
//! `ensure_fresh` is the consumer entry point: within the 5-minute
//! window, with a non-empty `files` table, it is a no-op. The
//! `lastIndexAt` map is process-wide and mutex-guarded.

use crate::engine::{IndexEngine, IndexOptions};
use crate::store::IndexStore;
use crate::types::IndexSummary;
use crate::IndexError;
use mpm_db::DbPool;
use mpm_project::ProjectLayout;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Reads within this window trust the existing index.
const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Wall-clock cap for one index run; override with
/// `MPM_AST_INDEX_TIMEOUT_SECONDS`.
const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

static LAST_INDEX_AT: Lazy<Mutex<HashMap<String, Instant>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Subprocess-contract mode names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Index,
    Query,
    Map,
    Structure,
    Analyze,
}

impl IndexMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Query => "query",
            Self::Map => "map",
            Self::Structure => "structure",
            Self::Analyze => "analyze",
        }
    }

    pub fn parse(s: &str) -> Result<Self, IndexError> {
        match s {
            "index" => Ok(Self::Index),
            "query" => Ok(Self::Query),
            "map" => Ok(Self::Map),
            "structure" => Ok(Self::Structure),
            "analyze" => Ok(Self::Analyze),
            other => Err(IndexError::InvalidArgument(format!(
                "unknown mode '{}'",
                other
            ))),
        }
    }
}

/// Contents of `index_status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub status: String,
    pub mode: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Refresh the index unless it is fresh and non-empty. Returns whether a
/// run actually happened.
pub async fn ensure_fresh(pool: &DbPool, layout: &ProjectLayout) -> Result<bool, IndexError> {
    let key = layout.root().as_str().to_string();
    let fresh = LAST_INDEX_AT
        .lock()
        .map(|m| {
            m.get(&key)
                .is_some_and(|at| at.elapsed() < FRESHNESS_WINDOW)
        })
        .unwrap_or(false);

    if fresh {
        let store = IndexStore::new(pool.clone());
        if store.file_count().await? > 0 {
            return Ok(false);
        }
    }

    run_index(pool, layout, IndexOptions::default(), "index").await?;
    Ok(true)
}

/// Index only a project-relative sub-tree.
pub async fn index_scope(
    pool: &DbPool,
    layout: &ProjectLayout,
    scope: &str,
) -> Result<IndexSummary, IndexError> {
    let opts = IndexOptions {
        scope: Some(scope.trim_matches('/').to_string()),
        ..Default::default()
    };
    run_index(pool, layout, opts, "index").await
}

/// Run one index pass with status/heartbeat sidecars and the wall-clock
/// cap. Partial state persists on timeout; bootstrap rows remain for a
/// later refresh.
pub async fn run_index(
    pool: &DbPool,
    layout: &ProjectLayout,
    opts: IndexOptions,
    mode: &str,
) -> Result<IndexSummary, IndexError> {
    let started_at = chrono::Utc::now();
    write_status(
        layout,
        &IndexStatus {
            status: "running".to_string(),
            mode: mode.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: None,
            total_files: 0,
            elapsed_ms: 0,
            error: None,
        },
    );

    let engine = IndexEngine::new(IndexStore::new(pool.clone()), layout.clone());
    let timeout = index_timeout();
    let result = tokio::time::timeout(timeout, engine.index(&opts)).await;

    let finished_at = chrono::Utc::now().to_rfc3339();
    match result {
        Ok(Ok(summary)) => {
            write_status(
                layout,
                &IndexStatus {
                    status: "done".to_string(),
                    mode: mode.to_string(),
                    started_at: started_at.to_rfc3339(),
                    finished_at: Some(finished_at),
                    total_files: summary.total_files,
                    elapsed_ms: summary.elapsed_ms,
                    error: None,
                },
            );
            write_result(layout, "index", &serde_json::json!(summary));
            if let Ok(mut m) = LAST_INDEX_AT.lock() {
                m.insert(layout.root().as_str().to_string(), Instant::now());
            }
            Ok(summary)
        }
        Ok(Err(e)) => {
            write_error_status(layout, mode, &started_at, &e.to_string());
            Err(e)
        }
        Err(_) => {
            let e = IndexError::Timeout(timeout.as_secs());
            write_error_status(layout, mode, &started_at, &e.to_string());
            warn!(timeout_secs = timeout.as_secs(), "Index run timed out");
            Err(e)
        }
    }
}

/// Full-scan index with one permitted fallback: when the full scan
/// fails (not a timeout), retry once restricted to the extensions the
/// stack detection actually found.
pub async fn run_index_with_fallback(
    pool: &DbPool,
    layout: &ProjectLayout,
    mut opts: IndexOptions,
) -> Result<IndexSummary, IndexError> {
    match run_index(pool, layout, opts.clone(), "index").await {
        Ok(summary) => Ok(summary),
        Err(IndexError::Timeout(secs)) => Err(IndexError::Timeout(secs)),
        Err(first) => {
            let root = layout.root().path().to_path_buf();
            let extra = opts.ignore_dirs.clone();
            let stack =
                tokio::task::spawn_blocking(move || crate::stack::detect_stack(&root, &extra))
                    .await
                    .map_err(|e| IndexError::Parser("stack detection".to_string(), e.to_string()))?;
            if stack.extensions.is_empty() {
                return Err(first);
            }
            warn!(error = %first, "Full scan failed; retrying with extension whitelist");
            opts.extensions = stack.extensions;
            run_index(pool, layout, opts, "index").await
        }
    }
}

/// Read back `index_status.json`, if present.
pub fn read_status(layout: &ProjectLayout) -> Option<IndexStatus> {
    let raw = std::fs::read_to_string(layout.index_status_file()).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Read the heartbeat file (`processed/total`), if present.
pub fn read_heartbeat(layout: &ProjectLayout) -> Option<String> {
    std::fs::read_to_string(layout.heartbeat_file())
        .ok()
        .map(|s| s.trim().to_string())
}

/// Write the transient IPC result file for a mode.
pub fn write_result(layout: &ProjectLayout, mode: &str, value: &serde_json::Value) {
    let path = layout.ast_result_file(mode);
    match serde_json::to_string_pretty(value) {
        Ok(body) => {
            if let Err(e) = std::fs::write(&path, body) {
                warn!(path = %path.display(), error = %e, "Result file write failed");
            }
        }
        Err(e) => warn!(error = %e, "Result serialization failed"),
    }
}

fn index_timeout() -> Duration {
    let secs = std::env::var("MPM_AST_INDEX_TIMEOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn write_status(layout: &ProjectLayout, status: &IndexStatus) {
    let path = layout.index_status_file();
    match serde_json::to_string_pretty(status) {
        Ok(body) => {
            if let Err(e) = std::fs::write(&path, body) {
                warn!(path = %path.display(), error = %e, "Status write failed");
            }
        }
        Err(e) => warn!(error = %e, "Status serialization failed"),
    }
}

fn write_error_status(
    layout: &ProjectLayout,
    mode: &str,
    started_at: &chrono::DateTime<chrono::Utc>,
    error: &str,
) {
    write_status(
        layout,
        &IndexStatus {
            status: "error".to_string(),
            mode: mode.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Some(chrono::Utc::now().to_rfc3339()),
            total_files: 0,
            elapsed_ms: 0,
            error: Some(error.to_string()),
        },
    );
}

/// Drop the freshness record for a project (tests and re-initialization).
pub fn forget_freshness(layout: &ProjectLayout) {
    if let Ok(mut m) = LAST_INDEX_AT.lock() {
        m.remove(layout.root().as_str());
    }
    info!(project = layout.root().as_str(), "Freshness window reset");
}
