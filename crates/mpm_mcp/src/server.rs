//! The MCP server: newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Requests are handled one at a time off stdin; long-running work
//! (background indexing, dev-log sync) runs as spawned tasks so the
//! request loop stays responsive.

use crate::protocol::{
    methods, ContentBlock, ErrorCode, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolCallResult, ToolsCapability, ToolsListResult, JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
use crate::session::SessionManager;
use crate::tools::ToolRegistry;
use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub server_name: String,
    pub server_version: String,
    /// Bind this project on startup instead of waiting for
    /// initialize_project.
    pub project_root: Option<String>,
    /// Responses above this size are replaced by a truncation notice.
    pub max_response_bytes: usize,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            server_name: "mpm-server".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            project_root: None,
            max_response_bytes: 1024 * 1024,
        }
    }
}

pub struct McpServer {
    config: McpServerConfig,
    session: SessionManager,
    tools: ToolRegistry,
    initialized: bool,
}

impl McpServer {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            session: SessionManager::new(),
            tools: ToolRegistry::new(),
            initialized: false,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Blocking request loop over stdin/stdout.
    pub async fn run(&mut self) -> Result<()> {
        if let Some(root) = self.config.project_root.clone() {
            match self.session.bind(Some(&root)).await {
                Ok(_) => info!(root, "Pre-bound project from CLI"),
                Err(e) => warn!(root, error = %e, "CLI project binding failed"),
            }
        }

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        info!("MCP server starting");

        while let Some(line) = lines.next_line().await.context("stdin read failed")? {
            if line.trim().is_empty() {
                continue;
            }
            debug!(len = line.len(), "Received request line");

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    let response = JsonRpcResponse::error(
                        None,
                        JsonRpcError::new(ErrorCode::ParseError, format!("Invalid JSON: {}", e)),
                    );
                    write_response(&mut stdout, &response).await?;
                    continue;
                }
            };

            let response = self.handle_request(request).await;
            if response.is_empty_notification_ack() {
                continue;
            }
            write_response(&mut stdout, &response).await?;
        }

        info!("MCP server shutting down");
        Ok(())
    }

    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::new(
                    ErrorCode::InvalidRequest,
                    format!("Invalid JSON-RPC version: {}", request.jsonrpc),
                ),
            );
        }

        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request),
            methods::INITIALIZED => {
                if request.id.is_none() {
                    // Notification: no response goes out.
                    return JsonRpcResponse {
                        jsonrpc: JSONRPC_VERSION.to_string(),
                        id: None,
                        result: None,
                        error: None,
                    };
                }
                JsonRpcResponse::success(request.id, Value::Null)
            }
            methods::TOOLS_LIST => {
                let result = ToolsListResult {
                    tools: self.tools.list_tools(),
                };
                match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(request.id, value),
                    Err(e) => internal_error(request.id, e),
                }
            }
            methods::TOOLS_CALL => self.handle_tools_call(request).await,
            methods::PING => {
                JsonRpcResponse::success(request.id, Value::Object(Default::default()))
            }
            other => JsonRpcResponse::error(
                request.id,
                JsonRpcError::new(
                    ErrorCode::MethodNotFound,
                    format!("Unknown method: {}", other),
                ),
            ),
        }
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: InitializeParams = match request
            .params
            .ok_or_else(|| "missing initialize params".to_string())
            .and_then(|p| serde_json::from_value(p).map_err(|e| e.to_string()))
        {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::new(ErrorCode::InvalidParams, e),
                )
            }
        };

        info!(
            client = params.client_info.name,
            version = params.client_info.version,
            protocol = params.protocol_version,
            "Client initialized"
        );
        self.initialized = true;

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
        };
        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => internal_error(request.id, e),
        }
    }

    async fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if !self.initialized {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::new(ErrorCode::ServerError(-32002), "Server not initialized"),
            );
        }

        let params: ToolCallParams = match request
            .params
            .ok_or_else(|| "missing tool call params".to_string())
            .and_then(|p| serde_json::from_value(p).map_err(|e| e.to_string()))
        {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::new(ErrorCode::InvalidParams, e),
                )
            }
        };

        info!(tool = params.name, "Tool call");
        let outcome = self
            .tools
            .call_tool(&params.name, params.arguments, &self.session)
            .await;

        let tool_result = match outcome {
            Ok(value) => {
                let json = match serde_json::to_string(&value) {
                    Ok(j) => j,
                    Err(e) => {
                        error!(error = %e, "Tool result serialization failed");
                        return internal_error(request.id, e);
                    }
                };
                if json.len() > self.config.max_response_bytes {
                    warn!(
                        bytes = json.len(),
                        limit = self.config.max_response_bytes,
                        "Tool response truncated"
                    );
                    let notice = serde_json::json!({
                        "truncated": true,
                        "original_bytes": json.len(),
                        "max_bytes": self.config.max_response_bytes,
                        "message": "Response exceeded the size limit; narrow the query or paginate",
                    });
                    ToolCallResult {
                        content: vec![ContentBlock::text(notice.to_string())],
                        is_error: true,
                    }
                } else {
                    ToolCallResult {
                        content: vec![ContentBlock::text(json)],
                        is_error: false,
                    }
                }
            }
            Err(e) => {
                // Tool failures surface as error-marked content so the
                // client can still show them.
                ToolCallResult {
                    content: vec![ContentBlock::text(format!("Error: {:#}", e))],
                    is_error: true,
                }
            }
        };

        match serde_json::to_value(tool_result) {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => internal_error(request.id, e),
        }
    }
}

fn internal_error(
    id: Option<crate::protocol::RequestId>,
    e: impl std::fmt::Display,
) -> JsonRpcResponse {
    JsonRpcResponse::error(
        id,
        JsonRpcError::new(ErrorCode::InternalError, format!("Internal error: {}", e)),
    )
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> Result<()> {
    let mut json = serde_json::to_string(response)?;
    json.push('\n');
    stdout.write_all(json.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
