//! Text-search fallback for `code_search`.
//!
//! When no symbol matches, the query falls back to a recursive grep:
//! an external fast grep first (`rg`), then a pure in-process walker.
//! Hits are later resolved to their enclosing symbol.

use ignore::WalkBuilder;
use mpm_project::ProjectLayout;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

const MAX_HITS: usize = 50;
const MAX_GREP_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct GrepHit {
    pub file: String,
    pub line: i64,
    pub text: String,
}

/// Search file contents under the project (or a scope sub-tree).
pub async fn text_search(
    layout: &ProjectLayout,
    pattern: &str,
    scope: Option<&str>,
) -> Vec<GrepHit> {
    let base = match scope {
        Some(scope) => layout.root().path().join(scope.trim_matches('/')),
        None => layout.root().path().to_path_buf(),
    };
    if !base.exists() {
        return Vec::new();
    }

    match rg_search(layout, pattern, &base).await {
        Some(hits) => hits,
        None => {
            debug!("rg unavailable, using in-process walker");
            walker_search(layout, pattern, &base)
        }
    }
}

/// External fast grep. `None` means rg could not be run at all.
async fn rg_search(
    layout: &ProjectLayout,
    pattern: &str,
    base: &std::path::Path,
) -> Option<Vec<GrepHit>> {
    let output = Command::new("rg")
        .arg("--line-number")
        .arg("--no-heading")
        .arg("--color")
        .arg("never")
        .arg("--ignore-case")
        .arg("--max-count")
        .arg("5")
        .arg("--fixed-strings")
        .arg("--")
        .arg(pattern)
        .arg(base)
        .output()
        .await
        .ok()?;

    // Exit code 1 is "no matches"; other failures fall back to the walker.
    if !output.status.success() && output.status.code() != Some(1) {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut hits = Vec::new();
    for raw in stdout.lines().take(MAX_HITS) {
        let mut parts = raw.splitn(3, ':');
        let (Some(path), Some(line), Some(text)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Ok(line) = line.parse::<i64>() else { continue };
        hits.push(GrepHit {
            file: layout.relative(std::path::Path::new(path)),
            line,
            text: text.trim().to_string(),
        });
    }
    Some(hits)
}

/// Pure in-process fallback: case-insensitive substring scan.
fn walker_search(layout: &ProjectLayout, pattern: &str, base: &std::path::Path) -> Vec<GrepHit> {
    let needle = pattern.to_lowercase();
    let mut hits = Vec::new();

    let walker = WalkBuilder::new(base)
        .hidden(false)
        .git_ignore(true)
        .build();
    for entry in walker.filter_map(|e| e.ok()) {
        if hits.len() >= MAX_HITS {
            break;
        }
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX) > MAX_GREP_FILE_SIZE {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue; // binary or undecodable
        };
        let mut per_file = 0usize;
        for (idx, line) in content.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                hits.push(GrepHit {
                    file: layout.relative(entry.path()),
                    line: idx as i64 + 1,
                    text: line.trim().to_string(),
                });
                per_file += 1;
                if per_file >= 5 || hits.len() >= MAX_HITS {
                    break;
                }
            }
        }
    }
    hits
}
