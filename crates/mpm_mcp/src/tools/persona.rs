//! Thin surface tools: persona activation, skills, timeline pointer.

use super::McpTool;
use crate::session::SessionManager;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Persona activation is per-project state (a `system_state` row), never
/// a process global.
pub struct PersonaTool;

#[derive(Debug, Deserialize)]
struct PersonaArgs {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    name: Option<String>,
}

fn default_action() -> String {
    "status".to_string()
}

#[async_trait]
impl McpTool for PersonaTool {
    fn name(&self) -> &'static str {
        "persona"
    }

    fn description(&self) -> &'static str {
        "Activate or inspect the project's active persona"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["activate", "status"], "default": "status" },
                "name": { "type": "string", "description": "Persona to activate" }
            }
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: PersonaArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        match args.action.as_str() {
            "activate" => {
                let Some(name) = args.name.filter(|n| !n.trim().is_empty()) else {
                    bail!("persona activate needs a name");
                };
                handle
                    .memory
                    .set_state("active_persona", &name, "persona")
                    .await?;
                Ok(json!({ "active_persona": name }))
            }
            "status" => {
                let active = handle.memory.get_state("active_persona").await?;
                Ok(json!({ "active_persona": active }))
            }
            other => bail!("unknown persona action '{}'", other),
        }
    }
}

pub struct SkillListTool;

#[async_trait]
impl McpTool for SkillListTool {
    fn name(&self) -> &'static str {
        "skill_list"
    }

    fn description(&self) -> &'static str {
        "List markdown skills available under .mcp-data/skills"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, session: &SessionManager) -> Result<Value> {
        let handle = session.current().await?;
        let dir = handle.layout.skills_dir();

        let mut skills = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "md") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        skills.push(stem.to_string());
                    }
                }
            }
        }
        skills.sort();
        Ok(json!({ "skills": skills, "dir": dir.display().to_string() }))
    }
}

pub struct SkillLoadTool;

#[derive(Debug, Deserialize)]
struct SkillLoadArgs {
    name: String,
}

#[async_trait]
impl McpTool for SkillLoadTool {
    fn name(&self) -> &'static str {
        "skill_load"
    }

    fn description(&self) -> &'static str {
        "Load one skill's markdown content"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value, session: &SessionManager) -> Result<Value> {
        let args: SkillLoadArgs = serde_json::from_value(args)?;
        let handle = session.current().await?;

        // Skill names are bare stems; reject separators outright.
        if args.name.contains(['/', '\\', '.']) {
            bail!("invalid skill name '{}'", args.name);
        }
        let path = handle.layout.skills_dir().join(format!("{}.md", args.name));
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(json!({ "name": args.name, "content": content })),
            Err(_) => Ok(json!({
                "name": args.name,
                "content": null,
                "message": format!("Skill '{}' not found; see skill_list", args.name),
            })),
        }
    }
}

pub struct OpenTimelineTool;

#[async_trait]
impl McpTool for OpenTimelineTool {
    fn name(&self) -> &'static str {
        "open_timeline"
    }

    fn description(&self) -> &'static str {
        "Point at the human-readable dev log for this project"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, session: &SessionManager) -> Result<Value> {
        let handle = session.current().await?;
        let dev_log = handle.layout.dev_log();
        let exists = dev_log.exists();
        Ok(json!({
            "dev_log": dev_log.display().to_string(),
            "exists": exists,
            "archive": handle.layout.memo_archive().display().to_string(),
        }))
    }
}
