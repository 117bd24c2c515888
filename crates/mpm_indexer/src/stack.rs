//! Technology-stack detection.
//!
//! A shallow recursive scan (depth 8) counts source-file extensions and
//! expands the ignore-directory set from `.gitignore`. The extension set
//! is used as an opt-in whitelist fallback when a full scan fails; the
//! ignore set seeds the walker.

use crate::lang::SOURCE_EXTENSIONS;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use walkdir::WalkDir;

const DETECT_DEPTH: usize = 8;

/// Build/VCS/dependency directories never worth indexing.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    ".venv",
    "venv",
    "__pycache__",
    ".idea",
    ".vscode",
    ".next",
    "coverage",
    "bin",
    "obj",
    ".mcp-data",
    "dev-log-archive",
];

#[derive(Debug, Clone)]
pub struct StackInfo {
    /// Source extensions present in the repository, most common first.
    pub extensions: Vec<String>,
    /// Directory names to skip while walking.
    pub ignore_dirs: HashSet<String>,
}

/// Scan `root` to depth 8 and report the stack.
pub fn detect_stack(root: &Path, extra_ignore: &[String]) -> StackInfo {
    let mut ignore_dirs: HashSet<String> = DEFAULT_IGNORE_DIRS
        .iter()
        .map(|s| s.to_string())
        .collect();
    ignore_dirs.extend(extra_ignore.iter().cloned());
    ignore_dirs.extend(gitignore_dir_patterns(root));

    let mut counts: HashMap<String, usize> = HashMap::new();
    let walker = WalkDir::new(root)
        .max_depth(DETECT_DEPTH)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                !ignore_dirs.contains(name.as_ref())
            } else {
                true
            }
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext = ext.to_lowercase();
            if SOURCE_EXTENSIONS.contains(&ext.as_str()) {
                *counts.entry(ext).or_default() += 1;
            }
        }
    }

    let mut extensions: Vec<(String, usize)> = counts.into_iter().collect();
    extensions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    StackInfo {
        extensions: extensions.into_iter().map(|(ext, _)| ext).collect(),
        ignore_dirs,
    }
}

/// Directory patterns from the root `.gitignore`: plain names and lines
/// with a trailing slash. Glob lines and nested paths are left to the
/// gitignore-aware walker itself.
fn gitignore_dir_patterns(root: &Path) -> HashSet<String> {
    let mut dirs = HashSet::new();
    let Ok(raw) = std::fs::read_to_string(root.join(".gitignore")) else {
        return dirs;
    };
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let name = line.trim_end_matches('/');
        if name.is_empty() || name.contains(['*', '?', '[', '/']) {
            continue;
        }
        dirs.insert(name.to_string());
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_extensions_and_gitignore_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("gen")).unwrap();
        std::fs::write(root.join("src/a.rs"), "fn a() {}").unwrap();
        std::fs::write(root.join("src/b.rs"), "fn b() {}").unwrap();
        std::fs::write(root.join("src/c.py"), "def c(): pass").unwrap();
        std::fs::write(root.join("gen/d.rs"), "fn d() {}").unwrap();
        std::fs::write(root.join(".gitignore"), "gen/\n*.log\n").unwrap();

        let stack = detect_stack(root, &[]);
        assert!(stack.ignore_dirs.contains("gen"));
        // gen/ is ignored, so rs counts 2 and leads.
        assert_eq!(stack.extensions.first().map(String::as_str), Some("rs"));
        assert!(stack.extensions.contains(&"py".to_string()));
    }

    #[test]
    fn default_ignores_always_present() {
        let dir = tempfile::tempdir().unwrap();
        let stack = detect_stack(dir.path(), &["custom_out".to_string()]);
        assert!(stack.ignore_dirs.contains("node_modules"));
        assert!(stack.ignore_dirs.contains(".git"));
        assert!(stack.ignore_dirs.contains("custom_out"));
        assert!(stack.extensions.is_empty());
    }
}
