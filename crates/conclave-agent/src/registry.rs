//! Static agent registry (spec §3 "Agent", §4.6).
//!
//! Agent definitions are immutable after startup — constructed once in the
//! composition root and shared behind an `Arc`, never mutated (spec §5
//! "In-memory registry ... immutable after startup; no locking required").

use crate::catalog;
use conclave_core::{AgentType, ToolDefinition};
use regex::Regex;
use std::collections::HashSet;

/// One agent's system prompt, tool allow-list, and (for Architect) the file
/// paths it may write to.
pub struct AgentDefinition {
    pub agent_type: AgentType,
    pub system_prompt: String,
    pub allowed_tools: HashSet<&'static str>,
    pub file_restrictions: Option<Vec<Regex>>,
}

impl AgentDefinition {
    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools.contains(tool_name)
    }

    /// For `write_file` calls: does `path` match at least one restriction
    /// regex? Agents without restrictions impose none.
    pub fn path_allowed(&self, path: &str) -> bool {
        match &self.file_restrictions {
            None => true,
            Some(patterns) => patterns.iter().any(|re| re.is_match(path)),
        }
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self
            .allowed_tools
            .iter()
            .filter_map(|name| catalog::by_name(name))
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

fn md_restriction() -> Vec<Regex> {
    vec![Regex::new(r"\.md$").expect("static pattern compiles")]
}

const READ_ONLY_ANALYSIS: &[&str] = &[
    catalog::READ_FILE,
    catalog::LIST_FILES,
    catalog::SEARCH_IN_CODE,
];

fn orchestrator() -> AgentDefinition {
    let mut allowed: HashSet<&'static str> = READ_ONLY_ANALYSIS.iter().copied().collect();
    allowed.insert(catalog::SWITCH_MODE);
    AgentDefinition {
        agent_type: AgentType::Orchestrator,
        system_prompt:
            "You are the Orchestrator. You do not write code or execute commands yourself. \
             Read and analyse the user's request, then hand it off to the specialist agent \
             best suited for it by calling switch_mode with the target mode and your reasoning."
                .to_string(),
        allowed_tools: allowed,
        file_restrictions: None,
    }
}

fn coder() -> AgentDefinition {
    let allowed: HashSet<&'static str> = [
        catalog::READ_FILE,
        catalog::LIST_FILES,
        catalog::SEARCH_IN_CODE,
        catalog::WRITE_FILE,
        catalog::EXECUTE_COMMAND,
        catalog::CREATE_DIRECTORY,
        catalog::ATTEMPT_COMPLETION,
        catalog::SWITCH_MODE,
    ]
    .into_iter()
    .collect();
    AgentDefinition {
        agent_type: AgentType::Coder,
        system_prompt: "You are the Coder. You implement, edit, and run code. Prefer small, \
             verifiable changes. Use attempt_completion once the task is done."
            .to_string(),
        allowed_tools: allowed,
        file_restrictions: None,
    }
}

fn architect() -> AgentDefinition {
    let allowed: HashSet<&'static str> = [
        catalog::READ_FILE,
        catalog::LIST_FILES,
        catalog::SEARCH_IN_CODE,
        catalog::WRITE_FILE,
        catalog::EXECUTE_COMMAND,
        catalog::CREATE_DIRECTORY,
        catalog::ATTEMPT_COMPLETION,
        catalog::SWITCH_MODE,
    ]
    .into_iter()
    .collect();
    AgentDefinition {
        agent_type: AgentType::Architect,
        system_prompt: "You are the Architect. You design systems and document decisions. \
             You may read and explore the whole codebase, but your writes are restricted to \
             markdown documents — hand off to the Coder for implementation."
            .to_string(),
        allowed_tools: allowed,
        file_restrictions: Some(md_restriction()),
    }
}

fn debug_agent() -> AgentDefinition {
    let allowed: HashSet<&'static str> = [
        catalog::READ_FILE,
        catalog::LIST_FILES,
        catalog::SEARCH_IN_CODE,
        catalog::EXECUTE_COMMAND,
        catalog::ATTEMPT_COMPLETION,
        catalog::SWITCH_MODE,
    ]
    .into_iter()
    .collect();
    AgentDefinition {
        agent_type: AgentType::Debug,
        system_prompt: "You are the Debug agent. Reproduce, diagnose, and narrow down issues \
             using read, search, and execute tools. You never write files — hand off to the \
             Coder to apply a fix."
            .to_string(),
        allowed_tools: allowed,
        file_restrictions: None,
    }
}

fn ask() -> AgentDefinition {
    let mut allowed: HashSet<&'static str> = READ_ONLY_ANALYSIS.iter().copied().collect();
    allowed.insert(catalog::ATTEMPT_COMPLETION);
    allowed.insert(catalog::SWITCH_MODE);
    AgentDefinition {
        agent_type: AgentType::Ask,
        system_prompt: "You are the Ask agent. Answer questions about the codebase using only \
             read and search tools. Hand off to a specialist if the user wants something changed."
            .to_string(),
        allowed_tools: allowed,
        file_restrictions: None,
    }
}

/// Single-agent-mode's only specialist. No `switch_mode`: the registry in
/// this mode contains only `{Orchestrator, Universal}` and Orchestrator
/// already short-circuits straight to Universal without an LLM call, so
/// there is never a second agent to hand off to (see
/// `AgentRegistry::route_orchestrator`).
fn universal() -> AgentDefinition {
    let allowed: HashSet<&'static str> = [
        catalog::READ_FILE,
        catalog::LIST_FILES,
        catalog::SEARCH_IN_CODE,
        catalog::WRITE_FILE,
        catalog::EXECUTE_COMMAND,
        catalog::CREATE_DIRECTORY,
        catalog::ATTEMPT_COMPLETION,
    ]
    .into_iter()
    .collect();
    AgentDefinition {
        agent_type: AgentType::Universal,
        system_prompt: "You are a general-purpose coding assistant with the full tool set. \
             Read, write, search, and execute as needed to complete the user's request."
            .to_string(),
        allowed_tools: allowed,
        file_restrictions: None,
    }
}

/// Selects between multi-agent (Orchestrator + 4 specialists) and
/// single-agent (Orchestrator + Universal) deployments (spec §4.9).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryMode {
    MultiAgent,
    SingleAgent,
}

/// Holds the immutable agent definitions for one deployment mode.
pub struct AgentRegistry {
    mode: RegistryMode,
    orchestrator: AgentDefinition,
    coder: AgentDefinition,
    architect: AgentDefinition,
    debug: AgentDefinition,
    ask: AgentDefinition,
    universal: AgentDefinition,
}

impl AgentRegistry {
    pub fn new(mode: RegistryMode) -> Self {
        Self {
            mode,
            orchestrator: orchestrator(),
            coder: coder(),
            architect: architect(),
            debug: debug_agent(),
            ask: ask(),
            universal: universal(),
        }
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Every session starts with the Orchestrator as its current agent
    /// (spec §4.3), in both deployment modes.
    pub fn initial_agent(&self) -> AgentType {
        AgentType::Orchestrator
    }

    /// The agent a session starting in single-agent mode is routed to
    /// without an LLM call (spec §4.9, §4.7 "Orchestrator routing").
    pub fn single_agent_target(&self) -> AgentType {
        AgentType::Universal
    }

    pub fn get(&self, agent_type: AgentType) -> &AgentDefinition {
        match agent_type {
            AgentType::Orchestrator => &self.orchestrator,
            AgentType::Coder => &self.coder,
            AgentType::Architect => &self.architect,
            AgentType::Debug => &self.debug,
            AgentType::Ask => &self.ask,
            AgentType::Universal => &self.universal,
        }
    }

    /// Agent types reachable via `switch_mode` in the current deployment
    /// mode — single-agent mode only ever switches Orchestrator -> Universal.
    pub fn is_member(&self, agent_type: AgentType) -> bool {
        match self.mode {
            RegistryMode::MultiAgent => !matches!(agent_type, AgentType::Universal),
            RegistryMode::SingleAgent => {
                matches!(agent_type, AgentType::Orchestrator | AgentType::Universal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_is_read_only_plus_switch_mode() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let def = registry.get(AgentType::Orchestrator);
        assert!(def.allows(catalog::READ_FILE));
        assert!(def.allows(catalog::SWITCH_MODE));
        assert!(!def.allows(catalog::WRITE_FILE));
        assert!(!def.allows(catalog::EXECUTE_COMMAND));
    }

    #[test]
    fn architect_write_restricted_to_markdown() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let def = registry.get(AgentType::Architect);
        assert!(def.allows(catalog::WRITE_FILE));
        assert!(def.path_allowed("docs/design.md"));
        assert!(!def.path_allowed("src/main.rs"));
    }

    #[test]
    fn debug_cannot_write_files() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let def = registry.get(AgentType::Debug);
        assert!(!def.allows(catalog::WRITE_FILE));
        assert!(def.allows(catalog::EXECUTE_COMMAND));
    }

    #[test]
    fn ask_is_strictly_read_only() {
        let registry = AgentRegistry::new(RegistryMode::MultiAgent);
        let def = registry.get(AgentType::Ask);
        assert!(def.allows(catalog::READ_FILE));
        assert!(!def.allows(catalog::WRITE_FILE));
        assert!(!def.allows(catalog::EXECUTE_COMMAND));
    }

    #[test]
    fn single_agent_mode_limits_membership_to_orchestrator_and_universal() {
        let registry = AgentRegistry::new(RegistryMode::SingleAgent);
        assert!(registry.is_member(AgentType::Orchestrator));
        assert!(registry.is_member(AgentType::Universal));
        assert!(!registry.is_member(AgentType::Coder));
    }

    #[test]
    fn universal_has_full_tools_but_no_switch_mode() {
        let registry = AgentRegistry::new(RegistryMode::SingleAgent);
        let def = registry.get(AgentType::Universal);
        assert!(def.allows(catalog::WRITE_FILE));
        assert!(def.allows(catalog::EXECUTE_COMMAND));
        assert!(!def.allows(catalog::SWITCH_MODE));
    }
}
