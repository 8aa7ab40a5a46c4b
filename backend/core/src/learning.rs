use serde::{Deserialize, Serialize};

/// A recurring behavior derived from the action history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pattern {
    /// An ordered run of 2 or 3 actions seen repeatedly.
    Sequence {
        sequence: Vec<String>,
        frequency: u32,
        confidence: f64,
    },
    /// An action that tends to happen at a given hour of day.
    Temporal {
        action: String,
        hour: u32,
        frequency: u32,
        confidence: f64,
    },
}

impl Pattern {
    pub fn frequency(&self) -> u32 {
        match self {
            Self::Sequence { frequency, .. } | Self::Temporal { frequency, .. } => *frequency,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Sequence { confidence, .. } | Self::Temporal { confidence, .. } => *confidence,
        }
    }
}

/// Likely next action after the current one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub action: String,
    pub confidence: f64,
    pub frequency: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    PatternDetector,
    KnowledgeGraph,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatternDetector => "pattern_detector",
            Self::KnowledgeGraph => "knowledge_graph",
        }
    }
}

/// A ranked proactive recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    pub action: String,
    pub confidence: f64,
    pub source: SuggestionSource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Accepted,
    Rejected,
    Modified,
}

impl Feedback {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "modified" => Some(Self::Modified),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_tagged_serialization() {
        let pattern = Pattern::Temporal {
            action: "git_status".into(),
            hour: 9,
            frequency: 4,
            confidence: 0.4,
        };
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["type"], "temporal");
        assert_eq!(pattern.frequency(), 4);
    }

    #[test]
    fn test_feedback_parse() {
        assert_eq!(Feedback::parse("Accepted"), Some(Feedback::Accepted));
        assert_eq!(Feedback::parse("meh"), None);
    }
}
