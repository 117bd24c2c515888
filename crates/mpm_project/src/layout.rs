//! Per-project on-disk layout.
//!
//! ```text
//! <project_root>/
//!   _MPM_PROJECT_RULES.md
//!   dev-log.md
//!   dev-log-archive/memo_archive.jsonl
//!   .mcp-data/
//!     project_config.json
//!     symbols.db / mcp_memory.db
//!     index_status.json, heartbeat
//!     .ast_result_<mode>.json
//!     project_map_<level>.md
//! ```

use crate::{ProjectError, ProjectRoot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DATA_DIR_NAME: &str = ".mcp-data";
const ARCHIVE_DIR_NAME: &str = "dev-log-archive";

/// Contents of `.mcp-data/project_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project_root: String,
    pub initialized_at: String,
}

/// Owns every path MPM reads or writes inside a bound project.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: ProjectRoot,
}

impl ProjectLayout {
    pub fn new(root: ProjectRoot) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ProjectRoot {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.path().join(DATA_DIR_NAME)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.path().join(ARCHIVE_DIR_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir().join("project_config.json")
    }

    pub fn symbols_db(&self) -> PathBuf {
        self.data_dir().join("symbols.db")
    }

    pub fn memory_db(&self) -> PathBuf {
        self.data_dir().join("mcp_memory.db")
    }

    pub fn index_status_file(&self) -> PathBuf {
        self.data_dir().join("index_status.json")
    }

    pub fn heartbeat_file(&self) -> PathBuf {
        self.data_dir().join("heartbeat")
    }

    pub fn ast_result_file(&self, mode: &str) -> PathBuf {
        self.data_dir().join(format!(".ast_result_{}.json", mode))
    }

    pub fn project_map_file(&self, level: &str) -> PathBuf {
        self.data_dir().join(format!("project_map_{}.md", level))
    }

    pub fn dev_log(&self) -> PathBuf {
        self.root.path().join("dev-log.md")
    }

    pub fn memo_archive(&self) -> PathBuf {
        self.archive_dir().join("memo_archive.jsonl")
    }

    pub fn rules_file(&self) -> PathBuf {
        self.root.path().join("_MPM_PROJECT_RULES.md")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.data_dir().join("skills")
    }

    /// Create `.mcp-data/` and `dev-log-archive/`.
    pub fn ensure(&self) -> Result<(), ProjectError> {
        for dir in [self.data_dir(), self.archive_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| ProjectError::Io(dir.display().to_string(), e))?;
        }
        Ok(())
    }

    /// Write `project_config.json`, stamping `initialized_at` only once.
    pub fn write_config(&self) -> Result<ProjectConfig, ProjectError> {
        if let Some(existing) = self.read_config() {
            return Ok(existing);
        }
        let config = ProjectConfig {
            project_root: self.root.as_str().to_string(),
            initialized_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = self.config_file();
        let body = serde_json::to_string_pretty(&config)
            .map_err(|e| ProjectError::Io(path.display().to_string(), e.into()))?;
        std::fs::write(&path, body).map_err(|e| ProjectError::Io(path.display().to_string(), e))?;
        Ok(config)
    }

    pub fn read_config(&self) -> Option<ProjectConfig> {
        let raw = std::fs::read_to_string(self.config_file()).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Project-relative, forward-slash form of an absolute path.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(self.root.path()).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}
