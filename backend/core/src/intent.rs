use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed set of labels a user message can be classified into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentCategory {
    FilesystemRead,
    FilesystemWrite,
    FilesystemDelete,
    TerminalCommand,
    GitOperation,
    BrowserAction,
    CodeAnalysis,
    Question,
    ClarificationNeeded,
    Greeting,
    Other,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 11] = [
        Self::FilesystemRead,
        Self::FilesystemWrite,
        Self::FilesystemDelete,
        Self::TerminalCommand,
        Self::GitOperation,
        Self::BrowserAction,
        Self::CodeAnalysis,
        Self::Question,
        Self::ClarificationNeeded,
        Self::Greeting,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilesystemRead => "FILESYSTEM_READ",
            Self::FilesystemWrite => "FILESYSTEM_WRITE",
            Self::FilesystemDelete => "FILESYSTEM_DELETE",
            Self::TerminalCommand => "TERMINAL_COMMAND",
            Self::GitOperation => "GIT_OPERATION",
            Self::BrowserAction => "BROWSER_ACTION",
            Self::CodeAnalysis => "CODE_ANALYSIS",
            Self::Question => "QUESTION",
            Self::ClarificationNeeded => "CLARIFICATION_NEEDED",
            Self::Greeting => "GREETING",
            Self::Other => "OTHER",
        }
    }

    /// Lenient parse of a model-produced label. Unknown labels become `Other`.
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(Self::Other)
    }

    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            Self::FilesystemRead | Self::FilesystemWrite | Self::FilesystemDelete
        )
    }

    /// Categories answered directly without planning any tool calls.
    pub fn is_conversational(&self) -> bool {
        matches!(self, Self::Greeting | Self::Question)
    }

    /// Human wording, e.g. `file system read`.
    pub fn describe(&self) -> String {
        self.as_str().to_lowercase().replace('_', " ")
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk attached to an intent, a plan step, or a whole plan.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Unknown or missing levels are treated as low.
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Low,
        }
    }

    /// Medium and high risk always require the user to confirm.
    pub fn requires_confirmation(&self) -> bool {
        *self >= Self::Medium
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured classification of one user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub category: IntentCategory,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    #[serde(default)]
    pub entities: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub explanation: String,
}

impl Intent {
    pub fn new(category: IntentCategory, confidence: f64) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            risk_level: RiskLevel::Low,
            requires_approval: false,
            entities: HashMap::new(),
            explanation: String::new(),
        }
    }

    /// Low-confidence `OTHER` intent used when a classification cannot be parsed.
    pub fn fallback(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            ..Self::new(IntentCategory::Other, 0.3)
        }
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_entity(mut self, kind: impl Into<String>, values: Vec<String>) -> Self {
        self.entities.insert(kind.into(), values);
        self
    }

    pub fn entity(&self, kind: &str) -> &[String] {
        self.entities.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_lenient() {
        assert_eq!(IntentCategory::parse("filesystem_read"), IntentCategory::FilesystemRead);
        assert_eq!(IntentCategory::parse(" GIT-OPERATION "), IntentCategory::GitOperation);
        assert_eq!(IntentCategory::parse("launch rockets"), IntentCategory::Other);
    }

    #[test]
    fn test_category_serde_matches_labels() {
        let json = serde_json::to_string(&IntentCategory::ClarificationNeeded).unwrap();
        assert_eq!(json, "\"CLARIFICATION_NEEDED\"");
        assert_eq!(IntentCategory::TerminalCommand.describe(), "terminal command");
    }

    #[test]
    fn test_risk_ordering_and_confirmation() {
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
        assert!(!RiskLevel::Low.requires_confirmation());
        assert!(RiskLevel::Medium.requires_confirmation());
        assert_eq!(RiskLevel::parse_lossy("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::parse_lossy("catastrophic"), RiskLevel::Low);
    }

    #[test]
    fn test_fallback_intent() {
        let intent = Intent::fallback("unparseable");
        assert_eq!(intent.category, IntentCategory::Other);
        assert!((intent.confidence - 0.3).abs() < f64::EPSILON);
        assert!(intent.entity("paths").is_empty());
    }
}
