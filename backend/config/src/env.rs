//! Environment handling for config values.
//!
//! `${VAR_NAME}` references in string leaves are substituted at load time
//! (uppercase `[A-Z_][A-Z0-9_]*` names only; `$${VAR}` escapes to a literal
//! `${VAR}`). A fixed set of variables then overrides individual fields.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::schema::{HearthConfig, ProviderConfig};

/// Optional `$` escape, then a `${NAME}` reference.
static ENV_VAR_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").ok());

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute env vars using a provided map (useful for testing).
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let result: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(result?))
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    let Some(pattern) = ENV_VAR_PATTERN.as_ref() else {
        return Ok(s.to_string());
    };
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = pattern.replace_all(s, |caps: &regex::Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

/// Apply the well-known environment overrides from the process environment.
pub fn apply_env_overrides(config: HearthConfig) -> HearthConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply overrides from a provided map. Empty values are ignored.
pub fn apply_env_overrides_with(
    mut config: HearthConfig,
    env: &HashMap<String, String>,
) -> HearthConfig {
    let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    let llm = config.llm.get_or_insert_with(Default::default);
    {
        let primary = llm.primary.get_or_insert_with(ProviderConfig::default);
        if let Some(host) = get("OLLAMA_HOST") {
            primary.base_url = Some(host.to_string());
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            primary.model = Some(model.to_string());
        }
        if let Some(model) = get("OLLAMA_EMBEDDING_MODEL") {
            primary.embedding_model = Some(model.to_string());
        }
    }
    if get("OPENAI_API_KEY").is_some() || get("OPENAI_MODEL").is_some() {
        let fallback = llm.fallback.get_or_insert_with(|| ProviderConfig {
            provider: Some("openai".to_string()),
            ..Default::default()
        });
        if let Some(key) = get("OPENAI_API_KEY") {
            fallback.api_key = Some(key.to_string());
        }
        if let Some(model) = get("OPENAI_MODEL") {
            fallback.model = Some(model.to_string());
        }
    }

    if let Some(level) = get("LOG_LEVEL") {
        config.logging.get_or_insert_with(Default::default).level = Some(level.to_lowercase());
    }

    if let Some(dirs) = get("HEARTH_ALLOWED_DIRS") {
        config
            .tools
            .get_or_insert_with(Default::default)
            .allowed_directories = std::env::split_paths(dirs)
            .map(|p: PathBuf| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .collect();
    }

    config
}
