//! Static tool schema catalog.
//!
//! Tools themselves execute on the client side (the IDE); this crate only
//! needs to know their names, descriptions, and JSON Schema shapes so the
//! LLM Driver can advertise the right subset to the model per agent.

use conclave_core::ToolDefinition;
use serde_json::json;

pub const READ_FILE: &str = "read_file";
pub const LIST_FILES: &str = "list_files";
pub const SEARCH_IN_CODE: &str = "search_in_code";
pub const WRITE_FILE: &str = "write_file";
pub const EXECUTE_COMMAND: &str = "execute_command";
pub const CREATE_DIRECTORY: &str = "create_directory";
pub const ATTEMPT_COMPLETION: &str = "attempt_completion";

/// Not a real tool call — a control signal the orchestrator intercepts
/// before it ever reaches a tool result (spec §4.7). Never gated against
/// HITL and never paired with a `tool` role message.
pub const SWITCH_MODE: &str = "switch_mode";

/// Tools whose effects reach outside the conversation and therefore require
/// human approval before the orchestrator will act on them (spec §4.4).
pub const SIDE_EFFECTING_TOOLS: &[&str] = &[WRITE_FILE, EXECUTE_COMMAND, CREATE_DIRECTORY];

pub fn is_side_effecting(tool_name: &str) -> bool {
    SIDE_EFFECTING_TOOLS.contains(&tool_name)
}

fn def(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

pub fn read_file() -> ToolDefinition {
    def(
        READ_FILE,
        "Read the contents of a file, optionally a line range.",
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Path relative to the workspace root"},
                "offset": {"type": "integer", "description": "First line to read, 1-indexed"},
                "limit": {"type": "integer", "description": "Maximum number of lines to return"}
            },
            "required": ["file_path"]
        }),
    )
}

pub fn list_files() -> ToolDefinition {
    def(
        LIST_FILES,
        "List files and directories under a path.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list, relative to the workspace root"},
                "recursive": {"type": "boolean", "description": "Recurse into subdirectories"}
            },
            "required": ["path"]
        }),
    )
}

pub fn search_in_code() -> ToolDefinition {
    def(
        SEARCH_IN_CODE,
        "Search the workspace for a regex pattern, optionally scoped to a path or file glob.",
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regular expression to search for"},
                "path": {"type": "string", "description": "Directory or file to search"},
                "file_glob": {"type": "string", "description": "Restrict to files matching this glob"}
            },
            "required": ["pattern"]
        }),
    )
}

pub fn write_file() -> ToolDefinition {
    def(
        WRITE_FILE,
        "Write content to a file, creating it if it does not exist. Side-effecting: requires approval.",
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "description": "Path relative to the workspace root"},
                "content": {"type": "string", "description": "Full contents to write"}
            },
            "required": ["file_path", "content"]
        }),
    )
}

pub fn execute_command() -> ToolDefinition {
    def(
        EXECUTE_COMMAND,
        "Run a shell command in the workspace. Side-effecting: requires approval.",
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to execute"},
                "cwd": {"type": "string", "description": "Working directory, relative to the workspace root"}
            },
            "required": ["command"]
        }),
    )
}

pub fn create_directory() -> ToolDefinition {
    def(
        CREATE_DIRECTORY,
        "Create a directory, including parent directories as needed. Side-effecting: requires approval.",
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path relative to the workspace root"}
            },
            "required": ["path"]
        }),
    )
}

pub fn attempt_completion() -> ToolDefinition {
    def(
        ATTEMPT_COMPLETION,
        "Signal that the current task is finished and summarise the result for the user.",
        json!({
            "type": "object",
            "properties": {
                "result": {"type": "string", "description": "Summary of what was accomplished"}
            },
            "required": ["result"]
        }),
    )
}

pub fn switch_mode() -> ToolDefinition {
    def(
        SWITCH_MODE,
        "Hand the conversation off to a different agent mode.",
        json!({
            "type": "object",
            "properties": {
                "mode": {"type": "string", "description": "Target agent: orchestrator, coder, architect, debug, or ask"},
                "reason": {"type": "string", "description": "Why this switch is needed"}
            },
            "required": ["mode", "reason"]
        }),
    )
}

pub fn by_name(name: &str) -> Option<ToolDefinition> {
    match name {
        READ_FILE => Some(read_file()),
        LIST_FILES => Some(list_files()),
        SEARCH_IN_CODE => Some(search_in_code()),
        WRITE_FILE => Some(write_file()),
        EXECUTE_COMMAND => Some(execute_command()),
        CREATE_DIRECTORY => Some(create_directory()),
        ATTEMPT_COMPLETION => Some(attempt_completion()),
        SWITCH_MODE => Some(switch_mode()),
        _ => None,
    }
}
