//! Wiring: turns a prepared config into a running pipeline.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use hearth_agent::{DecisionPipeline, SessionStore};
use hearth_config::defaults::*;
use hearth_config::{HearthConfig, ProviderConfig};
use hearth_core::{GenerationBackend, ToolRegistry};
use hearth_learning::Learner;
use hearth_llm::providers::ollama::OllamaBackend;
use hearth_llm::providers::openai::OpenAiBackend;
use hearth_llm::{GenerationDefaults, GenerationGateway};
use hearth_security::{expand_user, CommandPolicy, PathPolicy};
use hearth_storage::{
    ActionLog, InMemoryActionLog, InMemoryPreferenceStore, InMemoryRelationshipStore,
    InMemoryVectorStore, SqliteActionLog,
};
use hearth_tools::{default_registry, ToolPolicy};

/// Everything a request handler needs.
pub struct Runtime {
    pub pipeline: DecisionPipeline,
    pub sessions: SessionStore,
    pub learner: Arc<Learner>,
}

impl Runtime {
    /// Build from config and check the backends. An unreachable backend
    /// is logged, not fatal: turns report it in their reply.
    pub async fn build(config: &HearthConfig) -> Result<Self> {
        let gateway = Arc::new(build_gateway(config));
        match gateway.initialize().await {
            Ok(availability) => info!(
                primary = availability.primary,
                fallback = availability.fallback,
                "Generation backends ready"
            ),
            Err(e) => warn!(error = %e, "No generation backend available"),
        }
        let registry = Arc::new(build_registry(config)?);
        Self::assemble(config, gateway, registry)
    }

    /// Assemble around an already initialized gateway.
    pub fn assemble(
        config: &HearthConfig,
        gateway: Arc<GenerationGateway>,
        registry: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let learning = config.learning.clone().unwrap_or_default();
        let max_suggestions = learning.max_suggestions.unwrap_or(DEFAULT_MAX_SUGGESTIONS);
        let learner = Arc::new(
            Learner::new(Arc::new(InMemoryRelationshipStore::new()))
                .with_max_suggestions(max_suggestions),
        );

        let mut pipeline = DecisionPipeline::new(gateway, registry)
            .with_action_log(build_action_log(config)?)
            .with_preferences(Arc::new(InMemoryPreferenceStore::new()))
            .with_vectors(Arc::new(InMemoryVectorStore::new()))
            .with_assistant_name(
                config
                    .assistant_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ASSISTANT_NAME.to_string()),
            );
        if learning.enabled.unwrap_or(true) {
            pipeline = pipeline.with_learner(learner.clone());
        } else {
            info!("Learning disabled");
        }

        Ok(Self {
            pipeline,
            sessions: SessionStore::new(),
            learner,
        })
    }
}

fn backend(provider: &ProviderConfig, timeout: Duration) -> Option<Arc<dyn GenerationBackend>> {
    match provider.provider.as_deref().unwrap_or(DEFAULT_PRIMARY_PROVIDER) {
        "openai" => {
            let mut backend = OpenAiBackend::new(provider.api_key.clone()).with_timeout(timeout);
            if let Some(url) = &provider.base_url {
                backend = backend.with_base_url(url);
            }
            if let Some(model) = &provider.model {
                backend = backend.with_model(model);
            }
            Some(Arc::new(backend))
        }
        "ollama" => {
            let mut backend = OllamaBackend::new().with_timeout(timeout);
            if let Some(url) = &provider.base_url {
                backend = backend.with_base_url(url);
            }
            if let Some(model) = &provider.model {
                backend = backend.with_model(model);
            }
            if let Some(model) = &provider.embedding_model {
                backend = backend.with_embedding_model(model);
            }
            Some(Arc::new(backend))
        }
        other => {
            warn!(provider = other, "Unknown provider ignored");
            None
        }
    }
}

pub fn build_gateway(config: &HearthConfig) -> GenerationGateway {
    let llm = config.llm.clone().unwrap_or_default();
    let timeout = Duration::from_secs(llm.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS));
    let primary: Arc<dyn GenerationBackend> = match llm.primary.as_ref().and_then(|p| backend(p, timeout)) {
        Some(primary) => primary,
        None => Arc::new(OllamaBackend::new().with_timeout(timeout)),
    };

    let mut gateway = GenerationGateway::new(primary).with_defaults(GenerationDefaults {
        temperature: llm.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });
    if let Some(fallback) = llm.fallback.as_ref().and_then(|p| backend(p, timeout)) {
        gateway = gateway.with_fallback(fallback);
    }
    gateway
}

pub fn build_registry(config: &HearthConfig) -> Result<ToolRegistry> {
    let tools = config.tools.clone().unwrap_or_default();
    let commands = CommandPolicy::new(&tools.blocked_commands, &tools.allowed_commands)
        .context("Invalid command policy")?;
    let policy = ToolPolicy {
        paths: PathPolicy::new(&tools.allowed_directories),
        commands,
        command_timeout: Duration::from_secs(
            tools.command_timeout_secs.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        ),
        max_read_bytes: tools.max_read_bytes.unwrap_or(DEFAULT_MAX_READ_BYTES),
        max_output_chars: tools.max_output_chars.unwrap_or(DEFAULT_MAX_OUTPUT_CHARS),
        max_list_entries: tools.max_list_entries.unwrap_or(DEFAULT_MAX_LIST_ENTRIES),
    };
    Ok(default_registry(policy))
}

fn build_action_log(config: &HearthConfig) -> Result<Arc<dyn ActionLog>> {
    let path = config
        .storage
        .as_ref()
        .and_then(|s| s.action_log_path.as_deref());
    match path {
        Some(raw) => {
            let path = expand_user(raw);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let log = SqliteActionLog::open(&path.display().to_string())?;
            info!(path = %path.display(), "Action log opened");
            Ok(Arc::new(log))
        }
        None => Ok(Arc::new(InMemoryActionLog::new())),
    }
}

fn hostname() -> String {
    env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// Ambient facts about the host, as reported by `get_context`.
pub fn ambient_context() -> Value {
    let cwd = env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let home = dirs::home_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let username = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let context: HashMap<&str, String> = HashMap::from([
        ("current_directory", cwd),
        ("hostname", hostname()),
        ("platform", env::consts::OS.to_string()),
        ("home_dir", home),
        ("username", username),
    ]);
    json!(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_config::{LearningConfig, ToolsConfig};

    #[test]
    fn test_registry_from_config() {
        let config = HearthConfig {
            tools: Some(ToolsConfig {
                blocked_commands: vec!["shutdown".into()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let registry = build_registry(&config).unwrap();
        assert_eq!(
            registry.list(),
            vec![
                "filesystem_delete",
                "filesystem_list",
                "filesystem_read",
                "filesystem_write",
                "terminal_execute"
            ]
        );
    }

    #[test]
    fn test_ambient_context_keys() {
        let context = ambient_context();
        for key in ["current_directory", "hostname", "platform", "home_dir", "username"] {
            assert!(context.get(key).is_some(), "{key}");
        }
        assert_eq!(context["platform"], env::consts::OS);
    }

    #[tokio::test]
    async fn test_learning_can_be_disabled() {
        let config = HearthConfig {
            learning: Some(LearningConfig {
                enabled: Some(false),
                max_suggestions: Some(2),
            }),
            ..Default::default()
        };
        let gateway = Arc::new(build_gateway(&config));
        let registry = Arc::new(build_registry(&config).unwrap());
        let runtime = Runtime::assemble(&config, gateway, registry).unwrap();
        assert!(runtime.pipeline.learner().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_action_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("actions.db");
        let config = HearthConfig {
            storage: Some(hearth_config::StorageConfig {
                action_log_path: Some(path.display().to_string()),
            }),
            ..Default::default()
        };
        build_action_log(&config).unwrap();
        assert!(path.exists());
    }
}
