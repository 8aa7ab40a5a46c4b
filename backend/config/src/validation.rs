//! Config validation with field paths in every message.

use crate::schema::HearthConfig;
use std::path::Path;
use thiserror::Error;

/// A config validation error with field path and message.
#[derive(Debug, Error, PartialEq)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &HearthConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_llm(config, &mut report);
    validate_tools(config, &mut report);
    validate_learning(config, &mut report);
    report
}

fn validate_llm(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(llm) = &config.llm else { return };

    if let Some(t) = llm.temperature {
        if !(0.0..=2.0).contains(&t) {
            report.error("llm.temperature", format!("temperature must be within [0, 2], got {t}"));
        }
    }
    if llm.max_tokens == Some(0) {
        report.error("llm.maxTokens", "maxTokens must be > 0");
    }
    if llm.request_timeout_secs == Some(0) {
        report.error("llm.requestTimeoutSecs", "requestTimeoutSecs must be > 0");
    }

    for (path, provider) in [("llm.primary", &llm.primary), ("llm.fallback", &llm.fallback)] {
        let Some(provider) = provider else { continue };
        match provider.provider.as_deref() {
            None | Some("ollama") | Some("openai") => {}
            Some(other) => report.error(
                format!("{path}.provider"),
                format!("Unknown provider '{other}' (expected ollama or openai)"),
            ),
        }
    }

    if let Some(fallback) = &llm.fallback {
        let is_openai = fallback.provider.as_deref().unwrap_or("openai") == "openai";
        let has_key = fallback.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if is_openai && !has_key {
            report.warn(
                "llm.fallback.apiKey",
                "OpenAI fallback has no API key; fallback is disabled",
            );
        }
    }
}

fn validate_tools(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(tools) = &config.tools else { return };

    if let Some(secs) = tools.command_timeout_secs {
        if !(1..=300).contains(&secs) {
            report.error(
                "tools.commandTimeoutSecs",
                format!("commandTimeoutSecs must be within 1..=300, got {secs}"),
            );
        }
    }
    if tools.max_read_bytes == Some(0) {
        report.error("tools.maxReadBytes", "maxReadBytes must be > 0");
    }
    if tools.max_list_entries == Some(0) {
        report.error("tools.maxListEntries", "maxListEntries must be > 0");
    }

    for (i, dir) in tools.allowed_directories.iter().enumerate() {
        let path = format!("tools.allowedDirectories[{i}]");
        if dir.trim().is_empty() {
            report.error(path, "Allowed directory cannot be empty");
            continue;
        }
        let expanded = match dir.strip_prefix("~") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches('/')),
                None => Path::new(dir).to_path_buf(),
            },
            None => Path::new(dir).to_path_buf(),
        };
        if !expanded.is_dir() {
            report.warn(path, format!("Allowed directory does not exist: {dir}"));
        }
    }
}

fn validate_learning(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(learning) = &config.learning else { return };
    if learning.max_suggestions == Some(0) && learning.enabled == Some(true) {
        report.warn(
            "learning.maxSuggestions",
            "maxSuggestions is 0; no suggestions will be shown",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::{LlmConfig, ProviderConfig, ToolsConfig};

    #[test]
    fn defaults_are_valid() {
        let report = validate(&apply_all_defaults(HearthConfig::default()));
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn out_of_range_values_are_errors() {
        let cfg = HearthConfig {
            llm: Some(LlmConfig {
                temperature: Some(3.5),
                max_tokens: Some(0),
                ..Default::default()
            }),
            tools: Some(ToolsConfig {
                command_timeout_secs: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        let paths: Vec<&str> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["llm.temperature", "llm.maxTokens", "tools.commandTimeoutSecs"]
        );
    }

    #[test]
    fn keyless_fallback_and_missing_dir_warn() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HearthConfig {
            llm: Some(LlmConfig {
                fallback: Some(ProviderConfig {
                    provider: Some("openai".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            tools: Some(ToolsConfig {
                allowed_directories: vec![
                    dir.path().display().to_string(),
                    "/definitely/not/here".into(),
                ],
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        assert!(report.is_valid());
        let paths: Vec<&str> = report.warnings.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["llm.fallback.apiKey", "tools.allowedDirectories[1]"]);
    }

    #[test]
    fn unknown_provider_is_error() {
        let cfg = HearthConfig {
            llm: Some(LlmConfig {
                primary: Some(ProviderConfig {
                    provider: Some("llamafile".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(validate(&cfg).errors[0].path, "llm.primary.provider");
    }
}
