use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::{RiskLevel, Tool, ToolOutput};
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::{bool_arg, str_arg, ToolPolicy};

fn io_failure(err: std::io::Error, path: &str) -> ToolOutput {
    match err.kind() {
        ErrorKind::PermissionDenied => ToolOutput::err(format!("Permission denied: {}", path)),
        ErrorKind::NotFound => ToolOutput::err(format!("Path not found: {}", path)),
        _ => ToolOutput::err(err.to_string()),
    }
}

pub struct FilesystemReadTool {
    policy: Arc<ToolPolicy>,
}

impl FilesystemReadTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FilesystemReadTool {
    fn name(&self) -> &str {
        "filesystem_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file from the file system"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let raw = str_arg(&args, "path")?;
        let path = match self.policy.paths.check(raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(format!("Access denied: {}", e))),
        };

        let meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ToolOutput::err(format!("File not found: {}", raw)))
            }
            Err(e) => return Ok(io_failure(e, raw)),
        };
        if !meta.is_file() {
            return Ok(ToolOutput::err(format!("Not a file: {}", raw)));
        }
        let max = self.policy.max_read_bytes;
        if meta.len() > max {
            return Ok(ToolOutput::err(format!(
                "File too large: {} bytes (max: {})",
                meta.len(),
                max
            )));
        }

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Ok(ToolOutput::err(format!("Encoding error: {} is not valid UTF-8", raw)))
            }
            Err(e) => return Ok(io_failure(e, raw)),
        };

        info!(path = %path.display(), size = meta.len(), "File read");
        Ok(ToolOutput::ok(content).with_metadata(json!({
            "path": path.display().to_string(),
            "size": meta.len(),
        })))
    }
}

pub struct FilesystemListTool {
    policy: Arc<ToolPolicy>,
}

impl FilesystemListTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FilesystemListTool {
    fn name(&self) -> &str {
        "filesystem_list"
    }

    fn description(&self) -> &str {
        "List the contents of a directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (defaults to the current directory)"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Include entries starting with a dot",
                    "default": false
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let show_hidden = bool_arg(&args, "show_hidden", false);
        let path = match self.policy.paths.check(raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(format!("Access denied: {}", e))),
        };

        match fs::metadata(&path).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return Ok(ToolOutput::err(format!("Not a directory: {}", raw))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ToolOutput::err(format!("Directory not found: {}", raw)))
            }
            Err(e) => return Ok(io_failure(e, raw)),
        }

        let mut reader = match fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => return Ok(io_failure(e, raw)),
        };
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push((name, is_dir));
        }
        entries.sort();

        let total = entries.len();
        let max = self.policy.max_list_entries;
        let mut lines: Vec<String> = entries
            .iter()
            .take(max)
            .map(|(name, is_dir)| if *is_dir { format!("{}/", name) } else { name.clone() })
            .collect();
        if total > max {
            lines.push(format!("\n... and {} more entries", total - max));
        }

        info!(path = %path.display(), entries = total.min(max), "Directory listed");
        Ok(ToolOutput::ok(lines.join("\n")).with_metadata(json!({
            "path": path.display().to_string(),
            "count": total.min(max),
            "total_count": total,
            "truncated": total > max,
        })))
    }
}

pub struct FilesystemWriteTool {
    policy: Arc<ToolPolicy>,
}

impl FilesystemWriteTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FilesystemWriteTool {
    fn name(&self) -> &str {
        "filesystem_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to write" },
                "content": { "type": "string", "description": "The content to write" },
                "overwrite": { "type": "boolean", "default": false },
                "append": { "type": "boolean", "default": false }
            },
            "required": ["path", "content"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let raw = str_arg(&args, "path")?;
        let content = str_arg(&args, "content")?;
        let overwrite = bool_arg(&args, "overwrite", false);
        let append = bool_arg(&args, "append", false);

        let path = match self.policy.paths.check(raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(format!("Access denied: {}", e))),
        };

        let exists = fs::try_exists(&path).await.unwrap_or(false);
        if exists && !overwrite && !append {
            return Ok(ToolOutput::err(format!(
                "File already exists: {}. Set overwrite=true to replace.",
                raw
            )));
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return Ok(io_failure(e, raw));
            }
        }

        let written = if append {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await;
            match file {
                Ok(mut f) => f.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            fs::write(&path, content).await
        };
        if let Err(e) = written {
            return Ok(io_failure(e, raw));
        }

        info!(path = %path.display(), size = content.len(), append, "File written");
        Ok(ToolOutput::ok(format!("File written successfully: {}", raw)).with_metadata(json!({
            "path": path.display().to_string(),
            "size": content.len(),
        })))
    }
}

pub struct FilesystemDeleteTool {
    policy: Arc<ToolPolicy>,
}

impl FilesystemDeleteTool {
    pub fn new(policy: Arc<ToolPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FilesystemDeleteTool {
    fn name(&self) -> &str {
        "filesystem_delete"
    }

    fn description(&self) -> &str {
        "Delete a file or directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to delete" },
                "recursive": {
                    "type": "boolean",
                    "description": "Delete non-empty directories",
                    "default": false
                }
            },
            "required": ["path"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolOutput> {
        let raw = str_arg(&args, "path")?;
        let recursive = bool_arg(&args, "recursive", false);

        let path = match self.policy.paths.check_delete(raw) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::err(format!("Dangerous operation: {}", e))),
        };

        let meta = match fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ToolOutput::err(format!("Path not found: {}", raw)))
            }
            Err(e) => return Ok(io_failure(e, raw)),
        };

        let removed = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await
            } else {
                match fs::remove_dir(&path).await {
                    Err(e) if e.kind() != ErrorKind::PermissionDenied => {
                        return Ok(ToolOutput::err(format!(
                            "Directory not empty: {}. Use recursive=true to delete.",
                            raw
                        )))
                    }
                    other => other,
                }
            }
        } else {
            fs::remove_file(&path).await
        };
        if let Err(e) = removed {
            return Ok(io_failure(e, raw));
        }

        info!(path = %path.display(), recursive, "Path deleted");
        Ok(ToolOutput::ok(format!("Deleted: {}", raw))
            .with_metadata(json!({ "path": path.display().to_string() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_security::PathPolicy;

    fn policy() -> Arc<ToolPolicy> {
        Arc::new(ToolPolicy::default())
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/notes.txt");
        let file_str = file.to_string_lossy().to_string();

        let write = FilesystemWriteTool::new(policy());
        let out = write
            .execute(json!({"path": file_str, "content": "hello"}))
            .await
            .unwrap();
        assert!(out.success, "{:?}", out.error);

        let again = write
            .execute(json!({"path": file_str, "content": "again"}))
            .await
            .unwrap();
        assert!(!again.success);
        assert!(again.error.unwrap().starts_with("File already exists"));

        write
            .execute(json!({"path": file_str, "content": " world", "append": true}))
            .await
            .unwrap();

        let read = FilesystemReadTool::new(policy());
        let out = read.execute(json!({"path": file_str})).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("hello world"));
        assert_eq!(out.metadata["size"], 11);
    }

    #[tokio::test]
    async fn test_read_limits() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "0123456789").unwrap();

        let tight = Arc::new(ToolPolicy {
            max_read_bytes: 5,
            ..ToolPolicy::default()
        });
        let out = FilesystemReadTool::new(tight)
            .execute(json!({"path": file.to_string_lossy()}))
            .await
            .unwrap();
        assert!(out.error.unwrap().starts_with("File too large: 10 bytes"));

        let missing = FilesystemReadTool::new(policy())
            .execute(json!({"path": dir.path().join("nope").to_string_lossy()}))
            .await
            .unwrap();
        assert!(missing.error.unwrap().starts_with("File not found"));
    }

    #[tokio::test]
    async fn test_allow_list_denies_outside_paths() {
        let allowed = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "x").unwrap();

        let restricted = Arc::new(ToolPolicy {
            paths: PathPolicy::new([allowed.path().to_string_lossy()]),
            ..ToolPolicy::default()
        });
        let out = FilesystemReadTool::new(restricted)
            .execute(json!({"path": outside.path().join("secret.txt").to_string_lossy()}))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.error.unwrap().starts_with("Access denied"));
    }

    #[tokio::test]
    async fn test_list_sorted_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.txt", "a.txt", ".hidden", "b.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let tool = FilesystemListTool::new(Arc::new(ToolPolicy {
            max_list_entries: 3,
            ..ToolPolicy::default()
        }));
        let out = tool
            .execute(json!({"path": dir.path().to_string_lossy()}))
            .await
            .unwrap();
        let text = out.output.unwrap();
        assert!(text.starts_with("a.txt\nb.txt\nc.txt"));
        assert!(text.contains("... and 1 more entries"));
        assert!(!text.contains(".hidden"));
        assert_eq!(out.metadata["truncated"], true);
    }

    #[tokio::test]
    async fn test_delete_requires_recursive_for_non_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("build");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("out.o"), "").unwrap();
        let target_str = target.to_string_lossy().to_string();

        let tool = FilesystemDeleteTool::new(policy());
        let out = tool.execute(json!({"path": target_str})).await.unwrap();
        assert!(out.error.unwrap().starts_with("Directory not empty"));

        let out = tool
            .execute(json!({"path": target_str, "recursive": true}))
            .await
            .unwrap();
        assert!(out.success);
        assert!(!target.exists());

        let home = tool.execute(json!({"path": "~"})).await.unwrap();
        assert!(home.error.unwrap().starts_with("Dangerous operation"));
    }
}
