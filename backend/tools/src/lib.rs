pub mod fs;
pub mod terminal;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use hearth_core::ToolRegistry;
use hearth_security::{CommandPolicy, PathPolicy};

pub use fs::{FilesystemDeleteTool, FilesystemListTool, FilesystemReadTool, FilesystemWriteTool};
pub use terminal::TerminalExecuteTool;

/// Limits and policies shared by every built-in tool.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    pub paths: PathPolicy,
    pub commands: CommandPolicy,
    pub command_timeout: Duration,
    pub max_read_bytes: u64,
    pub max_output_chars: usize,
    pub max_list_entries: usize,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            paths: PathPolicy::unrestricted(),
            commands: CommandPolicy::default(),
            command_timeout: Duration::from_secs(30),
            max_read_bytes: 1024 * 1024,
            max_output_chars: 10_000,
            max_list_entries: 100,
        }
    }
}

/// Registry holding all built-in tools under one policy.
pub fn default_registry(policy: ToolPolicy) -> ToolRegistry {
    let policy = Arc::new(policy);
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FilesystemReadTool::new(policy.clone())));
    registry.register(Arc::new(FilesystemListTool::new(policy.clone())));
    registry.register(Arc::new(FilesystemWriteTool::new(policy.clone())));
    registry.register(Arc::new(FilesystemDeleteTool::new(policy.clone())));
    registry.register(Arc::new(TerminalExecuteTool::new(policy)));
    registry
}

pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

pub(crate) fn bool_arg(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::RiskLevel;

    #[test]
    fn test_default_registry_contents() {
        let registry = default_registry(ToolPolicy::default());
        assert_eq!(
            registry.list(),
            vec![
                "filesystem_delete",
                "filesystem_list",
                "filesystem_read",
                "filesystem_write",
                "terminal_execute",
            ]
        );
        let delete = registry.get("filesystem_delete").unwrap();
        assert_eq!(delete.risk_level(), RiskLevel::High);
        assert!(delete.requires_approval());
        assert!(!registry.get("filesystem_read").unwrap().requires_approval());
    }

    #[test]
    fn test_args() {
        let args = serde_json::json!({"path": "a", "recursive": true});
        assert_eq!(str_arg(&args, "path").unwrap(), "a");
        assert!(str_arg(&args, "content").is_err());
        assert!(bool_arg(&args, "recursive", false));
        assert!(!bool_arg(&args, "append", false));
    }
}
