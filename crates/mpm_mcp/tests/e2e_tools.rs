//! End-to-end tests for the MCP tools with real files and databases.

use mpm_mcp::protocol::{JsonRpcRequest, RequestId, JSONRPC_VERSION};
use mpm_mcp::{McpServer, McpServerConfig, SessionManager, ToolRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn bound_session() -> (TempDir, SessionManager, ToolRegistry) {
    let dir = TempDir::new().unwrap();
    let proj = dir.path().join("repo");
    std::fs::create_dir_all(proj.join("auth")).unwrap();
    std::fs::create_dir_all(proj.join("api")).unwrap();
    std::fs::write(
        proj.join("auth/a.go"),
        "package auth\n\nfunc Login(name string) string {\n    return name\n}\n",
    )
    .unwrap();
    std::fs::write(
        proj.join("api/b.py"),
        "class Login:\n    def perform(self):\n        return 1\n",
    )
    .unwrap();

    let session = SessionManager::new();
    let registry = ToolRegistry::new();
    let result = registry
        .call_tool(
            "initialize_project",
            json!({ "path": proj.to_string_lossy() }),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(result["indexing"], "started");

    (dir, session, registry)
}

#[tokio::test]
async fn tools_require_a_bound_project() {
    let session = SessionManager::new();
    let registry = ToolRegistry::new();
    let err = registry
        .call_tool("code_search", json!({ "query": "Login" }), &session)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("initialize_project"));
}

#[tokio::test]
async fn scoped_typed_code_search_returns_the_go_function() {
    let (_dir, session, registry) = bound_session().await;

    let result = registry
        .call_tool(
            "code_search",
            json!({ "query": "Login", "scope": "auth", "search_type": "function" }),
            &session,
        )
        .await
        .unwrap();

    assert_eq!(result["source"], "symbols");
    let hits = result["results"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["file_path"], "auth/a.go");
    assert_eq!(hits[0]["node_type"], "function");
    assert_eq!(hits[0]["line_start"], 3);
}

#[tokio::test]
async fn code_search_falls_back_to_grep_with_enclosing_symbol() {
    let (_dir, session, registry) = bound_session().await;

    let result = registry
        .call_tool(
            "code_search",
            json!({ "query": "return name", "scope": "auth" }),
            &session,
        )
        .await
        .unwrap();

    assert_eq!(result["source"], "grep");
    let hits = result["results"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["file"], "auth/a.go");
    assert_eq!(hits[0]["enclosing_symbol"]["name"], "Login");
}

#[tokio::test]
async fn code_search_reports_not_found_as_text_not_error() {
    let (_dir, session, registry) = bound_session().await;

    let result = registry
        .call_tool(
            "code_search",
            json!({ "query": "zzz_does_not_exist_zzz" }),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(result["source"], "none");
    assert!(result["message"].as_str().unwrap().contains("No symbols"));
}

#[tokio::test]
async fn code_impact_handles_unknown_symbol_gracefully() {
    let (_dir, session, registry) = bound_session().await;

    let result = registry
        .call_tool("code_impact", json!({ "symbol": "Nonexistent" }), &session)
        .await
        .unwrap();
    assert_eq!(result["found"], false);
}

#[tokio::test]
async fn memo_then_system_recall_round_trip() {
    let (_dir, session, registry) = bound_session().await;

    let result = registry
        .call_tool(
            "memo",
            json!({
                "items": [
                    { "category": "decision", "entity": "timeout", "act": "raise to 30s", "content": "ECS cold start" }
                ]
            }),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(result["count"], 1);

    let recalled = registry
        .call_tool("system_recall", json!({ "keywords": "timeout" }), &session)
        .await
        .unwrap();
    let memos = recalled["memos"].as_array().unwrap();
    assert_eq!(memos.len(), 1);
    assert_eq!(memos[0]["content"], "ECS cold start");
}

#[tokio::test]
async fn task_chain_develop_happy_path_through_the_tool() {
    let (_dir, session, registry) = bound_session().await;

    let call = |mode: &str, extra: Value| {
        let mut args = json!({ "mode": mode, "task_id": "T1" });
        args.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        registry.call_tool("task_chain", args, &session)
    };

    call("init", json!({ "protocol": "develop" })).await.unwrap();
    call("complete", json!({ "phase": "analyze", "summary": "3 subs" }))
        .await
        .unwrap();
    let gate = call(
        "complete",
        json!({ "phase": "plan_gate", "result": "pass", "summary": "ok" }),
    )
    .await
    .unwrap();
    assert_eq!(gate["next"], "implement");

    let spawned = call(
        "spawn",
        json!({ "phase": "implement", "sub_tasks": [ { "name": "A" }, { "name": "B" } ] }),
    )
    .await
    .unwrap();
    assert_eq!(spawned["spawned"], json!(["sub_001", "sub_002"]));

    call(
        "complete_sub",
        json!({ "phase": "implement", "sub_id": "sub_001", "result": "pass", "summary": "A done" }),
    )
    .await
    .unwrap();
    let done = call(
        "complete_sub",
        json!({ "phase": "implement", "sub_id": "sub_002", "result": "pass", "summary": "B done" }),
    )
    .await
    .unwrap();
    assert_eq!(done["loop_done"], true);
    assert_eq!(done["next_phase"], "verify_gate");

    call(
        "complete",
        json!({ "phase": "verify_gate", "result": "pass", "summary": "tests green" }),
    )
    .await
    .unwrap();
    let finished = call("complete", json!({ "phase": "finalize", "summary": "archived" }))
        .await
        .unwrap();
    assert_eq!(finished["chain"]["status"], "finished");
    assert_eq!(finished["chain"]["finished"], true);

    // Event trail in strict commit order.
    let handle = session.current().await.unwrap();
    let kinds: Vec<String> = handle
        .chains
        .events("T1")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(kinds.first().map(String::as_str), Some("init"));
    assert_eq!(kinds.last().map(String::as_str), Some("finish"));
    assert_eq!(kinds.iter().filter(|k| *k == "complete_sub").count(), 2);
}

#[tokio::test]
async fn task_chain_gate_exhaustion_surfaces_as_error() {
    let (_dir, session, registry) = bound_session().await;

    registry
        .call_tool(
            "task_chain",
            json!({ "mode": "init", "task_id": "T2", "protocol": "develop" }),
            &session,
        )
        .await
        .unwrap();
    registry
        .call_tool(
            "task_chain",
            json!({ "mode": "complete", "task_id": "T2", "phase": "analyze", "summary": "v1" }),
            &session,
        )
        .await
        .unwrap();

    // plan_gate max_retries = 2: first fail routes back to analyze.
    let retry = registry
        .call_tool(
            "task_chain",
            json!({ "mode": "complete", "task_id": "T2", "phase": "plan_gate", "result": "fail", "summary": "thin" }),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(retry["next"], "analyze");
    assert_eq!(retry["retry_count"], 1);

    registry
        .call_tool(
            "task_chain",
            json!({ "mode": "complete", "task_id": "T2", "phase": "analyze", "summary": "v2" }),
            &session,
        )
        .await
        .unwrap();
    let err = registry
        .call_tool(
            "task_chain",
            json!({ "mode": "complete", "task_id": "T2", "phase": "plan_gate", "result": "fail", "summary": "still thin" }),
            &session,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exhausted"));

    let status = registry
        .call_tool(
            "task_chain",
            json!({ "mode": "status", "task_id": "T2" }),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(status["status"], "failed");
}

#[tokio::test]
async fn task_chain_rejects_deprecated_step_modes() {
    let (_dir, session, registry) = bound_session().await;

    for mode in ["step", "next", "linear_step", "update"] {
        let err = registry
            .call_tool(
                "task_chain",
                json!({ "mode": mode, "task_id": "T9" }),
                &session,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("removed"), "mode {}", mode);
    }
}

#[tokio::test]
async fn task_chain_reinit_guard_through_the_tool() {
    let (_dir, session, registry) = bound_session().await;

    let init = |desc: &str| {
        registry.call_tool(
            "task_chain",
            json!({ "mode": "init", "task_id": "T3", "protocol": "linear", "description": desc }),
            &session,
        )
    };

    let first = init("a").await.unwrap();
    assert_eq!(first["reinit_count"], 0);
    let second = init("b").await.unwrap();
    assert_eq!(second["reinit_count"], 1);
    let err = init("c").await.unwrap_err();
    assert!(err.to_string().contains("pause and consult"));
}

#[tokio::test]
async fn hooks_and_persona_tools() {
    let (_dir, session, registry) = bound_session().await;

    let created = registry
        .call_tool(
            "manager_create_hook",
            json!({ "description": "recheck WAL growth", "priority": "high", "tag": "db" }),
            &session,
        )
        .await
        .unwrap();
    let hook_id = created["hook"]["hook_id"].as_str().unwrap().to_string();
    assert!(hook_id.starts_with("hook_"));

    let listed = registry
        .call_tool("manager_list_hooks", json!({ "status": "open" }), &session)
        .await
        .unwrap();
    assert_eq!(listed["hooks"].as_array().unwrap().len(), 1);

    let released = registry
        .call_tool(
            "manager_release_hook",
            json!({ "hook_id": hook_id, "result_summary": "bounded" }),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(released["hook"]["status"], "closed");

    registry
        .call_tool(
            "persona",
            json!({ "action": "activate", "name": "reviewer" }),
            &session,
        )
        .await
        .unwrap();
    let status = registry
        .call_tool("persona", json!({ "action": "status" }), &session)
        .await
        .unwrap();
    assert_eq!(status["active_persona"], "reviewer");
}

#[tokio::test]
async fn server_handshake_and_unknown_method() {
    let mut server = McpServer::new(McpServerConfig::default());

    let init = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(RequestId::Number(1)),
        method: "initialize".to_string(),
        params: Some(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "0.0.1" }
        })),
    };
    let response = server.handle_request(init).await;
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "mpm-server");

    let list = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(RequestId::Number(2)),
        method: "tools/list".to_string(),
        params: None,
    };
    let response = server.handle_request(list).await;
    let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, 18);

    let unknown = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(RequestId::Number(3)),
        method: "resources/list".to_string(),
        params: None,
    };
    let response = server.handle_request(unknown).await;
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn tool_errors_become_error_content_not_protocol_errors() {
    let mut server = McpServer::new(McpServerConfig::default());

    // Handshake first.
    let init = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(RequestId::Number(1)),
        method: "initialize".to_string(),
        params: Some(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "t", "version": "0" }
        })),
    };
    server.handle_request(init).await;

    // No project bound: the tool fails, but as is_error content.
    let call = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Some(RequestId::Number(2)),
        method: "tools/call".to_string(),
        params: Some(json!({ "name": "code_search", "arguments": { "query": "x" } })),
    };
    let response = server.handle_request(call).await;
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
}
