//! Tool discovery and dispatch by name.

use super::{code, hooks, memory, persona, project, taskchain, McpTool};
use crate::protocol::ToolDefinition;
use crate::session::SessionManager;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn McpTool>>,
}

impl ToolRegistry {
    /// Registry with every tool of the stable surface registered.
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        registry.register(Box::new(project::InitializeProjectTool));
        registry.register(Box::new(project::IndexStatusTool));
        registry.register(Box::new(code::CodeSearchTool));
        registry.register(Box::new(code::CodeImpactTool));
        registry.register(Box::new(code::FlowTraceTool));
        registry.register(Box::new(code::ProjectMapTool));
        registry.register(Box::new(code::ManagerAnalyzeTool));
        registry.register(Box::new(taskchain::TaskChainTool));
        registry.register(Box::new(memory::MemoTool));
        registry.register(Box::new(memory::SystemRecallTool));
        registry.register(Box::new(memory::KnownFactsTool));
        registry.register(Box::new(hooks::CreateHookTool));
        registry.register(Box::new(hooks::ListHooksTool));
        registry.register(Box::new(hooks::ReleaseHookTool));
        registry.register(Box::new(persona::PersonaTool));
        registry.register(Box::new(persona::SkillListTool));
        registry.register(Box::new(persona::SkillLoadTool));
        registry.register(Box::new(persona::OpenTimelineTool));

        debug!("Registered {} tools", registry.tools.len());
        registry
    }

    fn register(&mut self, tool: Box<dyn McpTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
        session: &SessionManager,
    ) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", name))?;
        tool.execute(args, session).await
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
