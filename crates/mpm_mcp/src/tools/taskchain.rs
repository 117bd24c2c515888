//! The task_chain tool: one entry point, mode-dispatched.

use super::McpTool;
use crate::session::SessionManager;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mpm_taskchain::store::status_view;
use mpm_taskchain::{GateResult, Phase, PhaseType, SubTaskSpec};
use serde::Deserialize;
use serde_json::{json, Value};

/// Removed legacy step modes, rejected with an explicit error.
const DEPRECATED_MODES: &[&str] = &["step", "next", "linear_step", "update"];

pub struct TaskChainTool;

#[derive(Debug, Deserialize)]
struct ChainArgs {
    mode: String,
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_protocol")]
    protocol: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    sub_id: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    sub_tasks: Vec<SubTaskSpec>,
    /// Custom protocol phase list (protocol = "custom").
    #[serde(default)]
    phases: Option<Vec<Phase>>,
}

fn default_protocol() -> String {
    "linear".to_string()
}

#[async_trait]
impl McpTool for TaskChainTool {
    fn name(&self) -> &'static str {
        "task_chain"
    }

    fn description(&self) -> &'static str {
        "Protocol-driven task state machine: execute/gate/loop phases with retry routing"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["init", "start", "complete", "spawn", "complete_sub",
                             "status", "resume", "protocol", "finish"]
                },
                "task_id": { "type": "string" },
                "description": { "type": "string" },
                "protocol": {
                    "type": "string",
                    "enum": ["linear", "develop", "debug", "refactor", "custom"],
                    "default": "linear"
                },
                "input": { "type": "string", "description": "Task statement seeded into the first phase" },
                "phase": { "type": "string", "description": "Phase id" },
                "sub_id": { "type": "string", "description": "Sub-task id" },
                "result": { "type": "string", "enum": ["pass", "fail"] },
                "summary": { "type": "string" },
                "sub_tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "verify": { "type": "string" }
                        },
                        "required": ["name"]
                    }
                },
                "phases": { "type": "array", "description": "Custom protocol phase list" }
            },
            "required": ["mode", "task_id"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let mut args: ChainArgs = serde_json::from_value(args)?;

        if DEPRECATED_MODES.contains(&args.mode.as_str()) {
            bail!(
                "task_chain mode '{}' was removed; use the protocol state machine \
                 (init with protocol=linear|develop|debug|refactor, then complete/spawn/complete_sub)",
                args.mode
            );
        }
        if args.task_id.trim().is_empty() {
            bail!("task_chain needs a task_id");
        }

        let handle = session.current().await?;
        let chains = &handle.chains;

        match args.mode.as_str() {
            "init" => {
                let custom = match args.protocol.as_str() {
                    "custom" => Some(args.phases.ok_or_else(|| {
                        anyhow!("protocol=custom needs an explicit phases list")
                    })?),
                    _ => None,
                };
                let chain = chains
                    .init(
                        &args.task_id,
                        &args.description,
                        &args.protocol,
                        custom,
                        &args.input,
                    )
                    .await?;
                Ok(json!({
                    "initialized": true,
                    "reinit_count": chain.reinit_count,
                    "chain": status_view(&chain),
                }))
            }
            "start" => {
                let phase = required_phase(&args)?;
                let chain = chains.start_phase(&args.task_id, phase).await?;
                Ok(json!({ "chain": status_view(&chain) }))
            }
            "complete" => {
                let phase_id = required_phase(&args)?;
                let chain = chains
                    .load(&args.task_id)
                    .await?
                    .ok_or_else(|| anyhow!("Task chain not found: {}", args.task_id))?;
                let phase_type = chain.phase(phase_id)?.phase_type;

                match phase_type {
                    PhaseType::Gate => {
                        let result = parse_result(args.result.as_deref().ok_or_else(|| {
                            anyhow!("completing gate '{}' needs result=pass|fail", phase_id)
                        })?)?;
                        let (chain, outcome) = chains
                            .complete_gate(&args.task_id, phase_id, result, &args.summary)
                            .await?;
                        if outcome.exhausted {
                            bail!(
                                "gate '{}' exhausted its {} retries; task chain '{}' is failed",
                                phase_id,
                                outcome.max_retries,
                                args.task_id
                            );
                        }
                        Ok(json!({
                            "result": outcome.result,
                            "next": outcome.next,
                            "retry_count": outcome.retry_count,
                            "max_retries": outcome.max_retries,
                            "chain": status_view(&chain),
                        }))
                    }
                    _ => {
                        let (chain, next) = chains
                            .complete_execute(&args.task_id, phase_id, &args.summary)
                            .await?;
                        Ok(json!({ "next": next, "chain": status_view(&chain) }))
                    }
                }
            }
            "spawn" => {
                if args.sub_tasks.is_empty() {
                    bail!("spawn needs a non-empty sub_tasks list");
                }
                let sub_tasks = std::mem::take(&mut args.sub_tasks);
                let phase = required_phase(&args)?;
                let (chain, ids) = chains
                    .spawn_sub_tasks(&args.task_id, phase, sub_tasks)
                    .await?;
                Ok(json!({ "spawned": ids, "chain": status_view(&chain) }))
            }
            "complete_sub" => {
                let phase = required_phase(&args)?;
                let sub_id = args
                    .sub_id
                    .as_deref()
                    .ok_or_else(|| anyhow!("complete_sub needs a sub_id"))?;
                let result = parse_result(args.result.as_deref().unwrap_or("pass"))?;
                let (chain, outcome) = chains
                    .complete_sub_task(&args.task_id, phase, sub_id, result, &args.summary)
                    .await?;
                Ok(json!({
                    "loop_done": outcome.loop_done,
                    "next_sub": outcome.next_sub,
                    "next_phase": outcome.next_phase,
                    "chain": status_view(&chain),
                }))
            }
            "status" => Ok(chains.status(&args.task_id).await?),
            "resume" => {
                let chain = chains.resume(&args.task_id).await?;
                Ok(json!({ "resumed": true, "chain": status_view(&chain) }))
            }
            "finish" => {
                let chain = chains.finish(&args.task_id).await?;
                Ok(json!({ "chain": status_view(&chain) }))
            }
            "protocol" => Ok(json!({
                "protocols": {
                    "linear": ["main (execute)"],
                    "develop": [
                        "analyze (execute)",
                        "plan_gate (gate: pass->implement, fail->analyze, max=2)",
                        "implement (loop)",
                        "verify_gate (gate: pass->finalize, fail->implement, max=3)",
                        "finalize (execute)"
                    ],
                    "debug": [
                        "reproduce (execute)",
                        "locate (execute)",
                        "fix (loop)",
                        "verify_gate (gate: fail->fix, max=3)",
                        "finalize (execute)"
                    ],
                    "refactor": [
                        "baseline (execute)",
                        "analyze (execute)",
                        "refactor (loop)",
                        "verify_gate (gate: fail->refactor, max=3)",
                        "finalize (execute)"
                    ],
                    "custom": "pass protocol=custom with an explicit phases list"
                }
            })),
            other => bail!("unknown task_chain mode '{}'", other),
        }
    }
}

fn required_phase(args: &ChainArgs) -> Result<&str> {
    args.phase
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| anyhow!("task_chain mode '{}' needs a phase id", args.mode))
}

fn parse_result(raw: &str) -> Result<GateResult> {
    match raw {
        "pass" => Ok(GateResult::Pass),
        "fail" => Ok(GateResult::Fail),
        other => bail!("result must be pass or fail, got '{}'", other),
    }
}
