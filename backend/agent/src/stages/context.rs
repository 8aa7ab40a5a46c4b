//! Ambient context for planning: where the user is, and whatever the
//! intent's category makes relevant (files, git, shell).

use std::env;
use std::path::Path;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use hearth_core::{EventKind, Intent, IntentCategory};
use hearth_security::resolve;

use crate::stages::Services;
use crate::state::AgentState;

const MAX_CHECKED_PATHS: usize = 5;
const MAX_LISTING: usize = 20;
const MAX_GIT_STATUS_CHARS: usize = 500;
const MAX_PATH_ENTRIES: usize = 10;
const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Gather context. Never fails: lookup errors are collected under
/// `errors` in the bundle.
pub async fn run(services: &Services, state: &mut AgentState) {
    let cwd = env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf());
    let mut bundle = base_context(&cwd);
    let mut errors: Vec<String> = Vec::new();

    if let Some(intent) = &state.intent {
        match intent.category {
            c if c.is_filesystem() => filesystem_context(intent, &cwd, &mut bundle, &mut errors).await,
            IntentCategory::GitOperation => {
                bundle.insert("git".into(), git_context(&cwd, &mut errors).await);
            }
            IntentCategory::TerminalCommand => terminal_context(&mut bundle),
            _ => {}
        }
    }

    if let Some(store) = &services.preferences {
        match store.all().await {
            Ok(prefs) if !prefs.is_empty() => {
                bundle.insert("preferences".into(), json!(prefs));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("preferences: {e}")),
        }
    }

    if !errors.is_empty() {
        warn!(count = errors.len(), "Context gathering had errors");
        bundle.insert("errors".into(), json!(errors));
    }

    let keys: Vec<&String> = bundle.keys().collect();
    debug!(?keys, "Context gathered");
    services
        .record(&state.session_id, EventKind::ContextGathered, json!({ "keys": keys }))
        .await;
    state.context = bundle;
}

fn base_context(cwd: &Path) -> Map<String, Value> {
    let home = dirs::home_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let username = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into());

    let mut bundle = Map::new();
    bundle.insert("current_directory".into(), json!(cwd.display().to_string()));
    bundle.insert("home_directory".into(), json!(home));
    bundle.insert("username".into(), json!(username));
    bundle
}

async fn filesystem_context(
    intent: &Intent,
    cwd: &Path,
    bundle: &mut Map<String, Value>,
    errors: &mut Vec<String>,
) {
    let paths = intent.entity("paths");
    if paths.is_empty() {
        match list_directory(cwd).await {
            Ok(entries) => {
                bundle.insert("directory_listing".into(), json!(entries));
            }
            Err(e) => errors.push(format!("directory listing: {e}")),
        }
        return;
    }

    let mut info = Map::new();
    for raw in paths.iter().take(MAX_CHECKED_PATHS) {
        let path = resolve(raw, cwd);
        let entry = match tokio::fs::metadata(&path).await {
            Ok(meta) => json!({
                "path": path.display().to_string(),
                "exists": true,
                "is_file": meta.is_file(),
                "is_dir": meta.is_dir(),
                "size": meta.len(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => json!({
                "path": path.display().to_string(),
                "exists": false,
            }),
            Err(e) => {
                errors.push(format!("{raw}: {e}"));
                continue;
            }
        };
        info.insert(raw.clone(), entry);
    }
    bundle.insert("file_info".into(), Value::Object(info));
}

async fn list_directory(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names.truncate(MAX_LISTING);
    Ok(names)
}

async fn git(cwd: &Path, args: &[&str]) -> Result<String, String> {
    let output = tokio::time::timeout(
        GIT_TIMEOUT,
        Command::new("git")
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| format!("git {} timed out", args.join(" ")))?
    .map_err(|e| format!("git {}: {e}", args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}

async fn git_context(cwd: &Path, errors: &mut Vec<String>) -> Value {
    let is_repo = matches!(
        git(cwd, &["rev-parse", "--is-inside-work-tree"]).await.as_deref(),
        Ok("true")
    );
    if !is_repo {
        return json!({ "is_repo": false });
    }

    let branch = git(cwd, &["branch", "--show-current"])
        .await
        .unwrap_or_else(|e| {
            errors.push(e);
            String::new()
        });
    let status = match git(cwd, &["status", "--short"]).await {
        Ok(status) => status.chars().take(MAX_GIT_STATUS_CHARS).collect(),
        Err(e) => {
            errors.push(e);
            String::new()
        }
    };
    json!({ "is_repo": true, "branch": branch, "status": status })
}

fn terminal_context(bundle: &mut Map<String, Value>) {
    let shell = env::var("SHELL").unwrap_or_else(|_| "unknown".into());
    let path: Vec<String> = env::var_os("PATH")
        .map(|raw| {
            env::split_paths(&raw)
                .take(MAX_PATH_ENTRIES)
                .map(|p| p.display().to_string())
                .collect()
        })
        .unwrap_or_default();
    bundle.insert("shell".into(), json!(shell));
    bundle.insert("path".into(), json!(path));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_file_info_for_entity_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let intent = Intent::new(IntentCategory::FilesystemRead, 0.9).with_entity(
            "paths",
            vec!["a.txt".into(), "missing.txt".into()],
        );

        let mut bundle = Map::new();
        let mut errors = Vec::new();
        filesystem_context(&intent, dir.path(), &mut bundle, &mut errors).await;

        let info = &bundle["file_info"];
        assert_eq!(info["a.txt"]["exists"], true);
        assert_eq!(info["a.txt"]["is_file"], true);
        assert_eq!(info["a.txt"]["size"], 5);
        assert_eq!(info["missing.txt"]["exists"], false);
        assert!(errors.is_empty());
        assert!(!bundle.contains_key("directory_listing"));
    }

    #[tokio::test]
    async fn test_directory_listing_without_paths() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..25 {
            fs::write(dir.path().join(format!("f{i:02}")), "").unwrap();
        }
        let intent = Intent::new(IntentCategory::FilesystemWrite, 0.9);

        let mut bundle = Map::new();
        let mut errors = Vec::new();
        filesystem_context(&intent, dir.path(), &mut bundle, &mut errors).await;

        let listing = bundle["directory_listing"].as_array().unwrap();
        assert_eq!(listing.len(), MAX_LISTING);
        assert_eq!(listing[0], "f00");
    }

    #[tokio::test]
    async fn test_git_context_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = Vec::new();
        let git = git_context(dir.path(), &mut errors).await;
        assert_eq!(git["is_repo"], false);
    }

    #[test]
    fn test_base_and_terminal_context() {
        let mut bundle = base_context(Path::new("/work"));
        assert_eq!(bundle["current_directory"], "/work");
        assert!(bundle.contains_key("home_directory"));
        assert!(bundle.contains_key("username"));

        terminal_context(&mut bundle);
        assert!(bundle["path"].as_array().unwrap().len() <= MAX_PATH_ENTRIES);
        assert!(bundle.contains_key("shell"));
    }
}
