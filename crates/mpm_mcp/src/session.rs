//! Session manager: binds one project at a time and owns its handles.

use anyhow::{anyhow, Result};
use mpm_db::{open_db_at, DbKind, DbPool};
use mpm_memory::MemoryStore;
use mpm_project::{resolve_project_root, ProjectLayout};
use mpm_taskchain::ChainStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Everything a bound project exposes to the tools.
pub struct ProjectHandle {
    pub layout: ProjectLayout,
    pub symbols: DbPool,
    pub memory: MemoryStore,
    pub chains: ChainStore,
}

/// One server process serves one project at a time; rebinding replaces
/// the handle (pools are cached process-wide, so rebinding to the same
/// root is cheap).
#[derive(Default)]
pub struct SessionManager {
    project: RwLock<Option<Arc<ProjectHandle>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve, validate and bind a project. Creates the on-disk layout,
    /// opens both databases and runs memo recovery.
    pub async fn bind(&self, candidate: Option<&str>) -> Result<(Arc<ProjectHandle>, usize)> {
        let root = resolve_project_root(candidate)?;
        let layout = ProjectLayout::new(root);
        layout.ensure()?;
        layout.write_config()?;

        let symbols = open_db_at(&layout.symbols_db(), DbKind::Symbols).await?;
        let memory_pool = open_db_at(&layout.memory_db(), DbKind::Memory).await?;

        let memory = MemoryStore::new(memory_pool.clone(), layout.clone());
        let recovered = memory.recover_if_empty().await?;

        let handle = Arc::new(ProjectHandle {
            layout,
            symbols,
            memory,
            chains: ChainStore::new(memory_pool),
        });

        info!(project = handle.layout.root().as_str(), "Project bound");
        *self.project.write().await = Some(handle.clone());
        Ok((handle, recovered))
    }

    /// The bound project, or an instructive error.
    pub async fn current(&self) -> Result<Arc<ProjectHandle>> {
        self.project
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("No project is bound; call initialize_project first"))
    }
}
