//! Project root validation and the per-project on-disk layout.

mod layout;
mod resolver;

pub use layout::{ProjectConfig, ProjectLayout, DATA_DIR_NAME};
pub use resolver::{resolve_project_root, ProjectRoot};

use thiserror::Error;

/// Project-boundary errors. Surfaced verbatim to the caller, never retried.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project path is not absolute: {0}")]
    NotAbsolute(String),

    #[error("Project path does not exist or is unreadable: {0}")]
    Unreadable(String),

    #[error("Refusing to bind a volume root as a project: {0}")]
    VolumeRoot(String),

    #[error("Path is inside a system or IDE runtime directory: {0} (matched '{1}')")]
    SensitivePath(String, String),

    #[error("Path looks like a user cache ('{1}') and has no .git marker: {0}")]
    CacheWithoutRepo(String, String),

    #[error("No project path given and auto-detection found nothing usable")]
    NoCandidate,

    #[error("I/O error at {0}: {1}")]
    Io(String, #[source] std::io::Error),
}
