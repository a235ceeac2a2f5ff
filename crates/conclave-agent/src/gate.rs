//! The tool gate (spec §4.6): enforced for every tool_call the LLM emits,
//! before the orchestrator acts on it.
//!
//! `switch_mode` never reaches the gate — the orchestrator special-cases it
//! at parse time (spec §7 "exception as control flow", DESIGN NOTES) because
//! it is a control-flow signal, not a tool invocation.

use crate::catalog;
use crate::registry::AgentDefinition;
use conclave_core::AgentType;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    #[error("tool not allowed: {tool} for agent {agent}")]
    ToolNotAllowed { tool: String, agent: AgentType },

    #[error("file restricted: {agent} may not write to {path}")]
    FileRestricted { path: String, agent: AgentType },
}

impl GateError {
    /// Human-readable content for the `tool`-role error message the
    /// orchestrator appends on gate failure (spec §4.6, Scenario D).
    pub fn as_tool_result_content(&self) -> String {
        match self {
            GateError::ToolNotAllowed { tool, agent } => {
                format!("tool not allowed for agent {agent}: {tool}")
            }
            GateError::FileRestricted { path, agent } => {
                format!("agent {agent} may not write to path: {path}")
            }
        }
    }
}

/// Validate one tool_call against the active agent's allow-list and (for
/// `write_file`) its file restrictions.
pub fn check_tool_call(
    agent: &AgentDefinition,
    tool_name: &str,
    arguments: &serde_json::Value,
) -> Result<(), GateError> {
    if !agent.allows(tool_name) {
        return Err(GateError::ToolNotAllowed {
            tool: tool_name.to_string(),
            agent: agent.agent_type,
        });
    }

    if tool_name == catalog::WRITE_FILE {
        // A missing or non-string `file_path` can't match any restriction
        // regex, so it's treated the same as a non-matching path rather than
        // silently passing (spec §4.6 item 2).
        let path = arguments.get("file_path").and_then(|v| v.as_str()).unwrap_or_default();
        if !agent.path_allowed(path) {
            return Err(GateError::FileRestricted {
                path: path.to_string(),
                agent: agent.agent_type,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AgentRegistry, RegistryMode};
    use serde_json::json;

    #[test]
    fn allowed_tool_passes() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let coder = registry.get(AgentType::Coder);
        assert!(check_tool_call(coder, catalog::READ_FILE, &json!({})).is_ok());
    }

    #[test]
    fn disallowed_tool_rejected() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let ask = registry.get(AgentType::Ask);
        let err = check_tool_call(ask, catalog::WRITE_FILE, &json!({"file_path": "a.py"}))
            .unwrap_err();
        assert!(matches!(err, GateError::ToolNotAllowed { .. }));
        assert!(err.as_tool_result_content().contains("not allowed"));
    }

    #[test]
    fn architect_rejected_outside_markdown() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let architect = registry.get(AgentType::Architect);
        let err = check_tool_call(
            architect,
            catalog::WRITE_FILE,
            &json!({"file_path": "src/main.rs", "content": "x"}),
        )
        .unwrap_err();
        assert!(matches!(err, GateError::FileRestricted { .. }));
    }

    #[test]
    fn architect_rejected_for_missing_file_path() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let architect = registry.get(AgentType::Architect);
        let err = check_tool_call(architect, catalog::WRITE_FILE, &json!({"content": "x"})).unwrap_err();
        assert!(matches!(err, GateError::FileRestricted { .. }));
    }

    #[test]
    fn architect_allowed_for_markdown() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let architect = registry.get(AgentType::Architect);
        assert!(check_tool_call(
            architect,
            catalog::WRITE_FILE,
            &json!({"file_path": "docs/plan.md", "content": "x"}),
        )
        .is_ok());
    }
}
