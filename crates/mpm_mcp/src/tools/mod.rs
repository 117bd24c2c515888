//! Tool implementations and the dispatch registry.
//!
//! Each tool validates its own arguments, talks to the bound project
//! through the session manager, and returns a JSON value. LLM-facing
//! warnings (empty results, deprecated modes) are returned inside the
//! value, not as errors, so the client still renders them.

mod code;
mod hooks;
mod memory;
mod persona;
mod project;
mod registry;
mod taskchain;

pub use registry::ToolRegistry;

use crate::protocol::ToolDefinition;
use crate::session::SessionManager;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Trait every exposed tool implements.
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Stable external tool name.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the input arguments.
    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}
