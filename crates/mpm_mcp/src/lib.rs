//! MCP server for MPM: grounded code intelligence, persistent memory and
//! task-chain orchestration over a bound project.
//!
//! The transport is newline-delimited JSON-RPC 2.0 on stdio
//! ([`server`]); tools ([`tools`]) validate inputs and compose the
//! indexer, memory and task-chain layers; the analysis composer
//! ([`analysis`]) builds flow traces, map renderings and the grep
//! fallback on top of them.

pub mod analysis;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;

pub use server::{McpServer, McpServerConfig};
pub use session::{ProjectHandle, SessionManager};
pub use tools::{McpTool, ToolRegistry};
