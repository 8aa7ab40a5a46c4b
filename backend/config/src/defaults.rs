//! Config defaults: fills every unset field after loading.

use crate::schema::{
    HearthConfig, LearningConfig, LlmConfig, LoggingConfig, ProviderConfig, StorageConfig,
    ToolsConfig,
};

pub const DEFAULT_PRIMARY_PROVIDER: &str = "ollama";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_READ_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 10_000;
pub const DEFAULT_MAX_LIST_ENTRIES: usize = 100;

pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_ASSISTANT_NAME: &str = "Hearth";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: HearthConfig) -> HearthConfig {
    let config = apply_llm_defaults(config);
    let config = apply_tools_defaults(config);
    let config = apply_learning_defaults(config);
    let mut config = apply_logging_defaults(config);
    config.storage.get_or_insert_with(StorageConfig::default);
    if config.assistant_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        config.assistant_name = Some(DEFAULT_ASSISTANT_NAME.to_string());
    }
    config
}

fn apply_llm_defaults(mut config: HearthConfig) -> HearthConfig {
    let llm = config.llm.get_or_insert_with(LlmConfig::default);

    let primary = llm.primary.get_or_insert_with(ProviderConfig::default);
    primary
        .provider
        .get_or_insert_with(|| DEFAULT_PRIMARY_PROVIDER.to_string());
    if primary.provider.as_deref() == Some("openai") {
        primary.base_url.get_or_insert_with(|| DEFAULT_OPENAI_URL.to_string());
        primary.model.get_or_insert_with(|| DEFAULT_OPENAI_MODEL.to_string());
    } else {
        primary.base_url.get_or_insert_with(|| DEFAULT_OLLAMA_URL.to_string());
        primary.model.get_or_insert_with(|| DEFAULT_OLLAMA_MODEL.to_string());
        primary
            .embedding_model
            .get_or_insert_with(|| DEFAULT_EMBEDDING_MODEL.to_string());
    }

    if let Some(fallback) = &mut llm.fallback {
        fallback.provider.get_or_insert_with(|| "openai".to_string());
        if fallback.provider.as_deref() == Some("openai") {
            fallback.base_url.get_or_insert_with(|| DEFAULT_OPENAI_URL.to_string());
            fallback.model.get_or_insert_with(|| DEFAULT_OPENAI_MODEL.to_string());
        }
    }

    llm.temperature.get_or_insert(DEFAULT_TEMPERATURE);
    llm.max_tokens.get_or_insert(DEFAULT_MAX_TOKENS);
    llm.request_timeout_secs.get_or_insert(DEFAULT_REQUEST_TIMEOUT_SECS);
    config
}

fn apply_tools_defaults(mut config: HearthConfig) -> HearthConfig {
    let tools = config.tools.get_or_insert_with(ToolsConfig::default);
    tools.command_timeout_secs.get_or_insert(DEFAULT_COMMAND_TIMEOUT_SECS);
    tools.max_read_bytes.get_or_insert(DEFAULT_MAX_READ_BYTES);
    tools.max_output_chars.get_or_insert(DEFAULT_MAX_OUTPUT_CHARS);
    tools.max_list_entries.get_or_insert(DEFAULT_MAX_LIST_ENTRIES);
    config
}

fn apply_learning_defaults(mut config: HearthConfig) -> HearthConfig {
    let learning = config.learning.get_or_insert_with(LearningConfig::default);
    learning.enabled.get_or_insert(true);
    learning.max_suggestions.get_or_insert(DEFAULT_MAX_SUGGESTIONS);
    config
}

fn apply_logging_defaults(mut config: HearthConfig) -> HearthConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.json.get_or_insert(false);
    config
}
