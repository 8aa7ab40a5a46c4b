//! `hearth-config`: runtime configuration for Hearth.
//!
//! Provides:
//! - Typed config schema (backends, tools, storage, learning, logging)
//! - YAML loading with a missing file treated as empty
//! - `${ENV_VAR}` substitution and well-known env overrides
//! - Default value application
//! - Validation with warnings and errors

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    apply_env_overrides, apply_env_overrides_with, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, load_config};
pub use schema::{
    HearthConfig, LearningConfig, LlmConfig, LoggingConfig, ProviderConfig, StorageConfig,
    ToolsConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load, substitute env vars, apply overrides and defaults, then validate.
///
/// This is the main entry point for loading a config at runtime. Warnings
/// are logged; any validation error fails the load.
pub async fn load_and_prepare(path: &Path) -> Result<HearthConfig> {
    let raw_config = load_config(path).await?;

    let value: Value =
        serde_json::to_value(&raw_config).context("Failed to serialize config for processing")?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;
    let config: HearthConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_all_defaults(apply_env_overrides(config));

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.first() {
        bail!("{} ({} error(s) total)", first, report.errors.len());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepares_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        std::fs::write(&path, "llm:\n  maxTokens: 256\nassistantName: Ember\n").unwrap();

        let cfg = load_and_prepare(&path).await.unwrap();
        let llm = cfg.llm.unwrap();
        assert_eq!(llm.max_tokens, Some(256));
        assert!(llm.temperature.is_some());
        assert_eq!(cfg.assistant_name.as_deref(), Some("Ember"));
    }

    #[tokio::test]
    async fn invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        std::fs::write(&path, "tools:\n  commandTimeoutSecs: 900\n").unwrap();

        let err = load_and_prepare(&path).await.unwrap_err();
        assert!(err.to_string().contains("tools.commandTimeoutSecs"));
    }
}
