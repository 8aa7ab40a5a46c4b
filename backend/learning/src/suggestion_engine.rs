//! Turns predictions into ranked suggestions and tracks how users respond.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use hearth_core::{Feedback, Suggestion, SuggestionSource};
use hearth_storage::RelationshipStore;

use crate::ids::suggestion_id;
use crate::pattern_detector::PatternDetector;

/// Pattern-detector predictions below this are not shown.
pub const MIN_PATTERN_CONFIDENCE: f64 = 0.5;
/// Relationship-store query threshold.
pub const MIN_GRAPH_CONFIDENCE: f64 = 0.3;
pub const ACCEPT_DELTA: f64 = 0.1;
pub const REJECT_DELTA: f64 = -0.05;

const HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
struct ShownSuggestion {
    suggestion: Suggestion,
    current_action: String,
    shown_at: DateTime<Utc>,
    context: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackCounts {
    pub accepted: u32,
    pub rejected: u32,
    pub modified: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionStats {
    pub total_shown: u64,
    pub total_accepted: u32,
    pub total_rejected: u32,
    pub acceptance_rate: f64,
    pub unique_suggestions: usize,
}

#[derive(Default)]
struct EngineState {
    history: VecDeque<ShownSuggestion>,
    total_shown: u64,
    feedback: HashMap<String, FeedbackCounts>,
}

pub struct SuggestionEngine {
    detector: Arc<PatternDetector>,
    graph: Option<Arc<dyn RelationshipStore>>,
    state: Mutex<EngineState>,
}

impl SuggestionEngine {
    pub fn new(detector: Arc<PatternDetector>) -> Self {
        Self {
            detector,
            graph: None,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn RelationshipStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Merge detector and graph predictions into at most `max` suggestions,
    /// one per target action, most confident first.
    pub async fn generate_suggestions(
        &self,
        current_action: &str,
        context: &Value,
        max: usize,
    ) -> Vec<Suggestion> {
        let mut candidates: Vec<Suggestion> = self
            .detector
            .get_next_action_prediction(current_action)
            .into_iter()
            .take(max)
            .filter(|p| p.confidence >= MIN_PATTERN_CONFIDENCE)
            .map(|p| Suggestion {
                id: suggestion_id(SuggestionSource::PatternDetector, current_action, &p.action),
                kind: "next_action".to_string(),
                title: format!("Next: {}", p.action),
                description: format!("You often do {} after {}", p.action, current_action),
                action: p.action,
                confidence: p.confidence,
                source: SuggestionSource::PatternDetector,
            })
            .collect();

        if let Some(graph) = &self.graph {
            match graph
                .next_actions(current_action, MIN_GRAPH_CONFIDENCE, max)
                .await
            {
                Ok(predictions) => {
                    candidates.extend(predictions.into_iter().map(|p| Suggestion {
                        id: suggestion_id(
                            SuggestionSource::KnowledgeGraph,
                            current_action,
                            &p.action,
                        ),
                        kind: "related_action".to_string(),
                        title: format!("Next: {}", p.action),
                        description: format!("Related to {}", current_action),
                        action: p.action,
                        confidence: p.confidence,
                        source: SuggestionSource::KnowledgeGraph,
                    }))
                }
                Err(e) => warn!(error = %e, "Relationship store query failed"),
            }
        }

        let suggestions = rank(candidates, max);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        for suggestion in &suggestions {
            state.history.push_back(ShownSuggestion {
                suggestion: suggestion.clone(),
                current_action: current_action.to_string(),
                shown_at: now,
                context: context.clone(),
            });
            state.total_shown += 1;
        }
        while state.history.len() > HISTORY_CAPACITY {
            state.history.pop_front();
        }

        debug!(current_action, count = suggestions.len(), "Suggestions generated");
        suggestions
    }

    /// Count the feedback and, when the suggestion is known, nudge the
    /// underlying relationship. Store failures are logged only.
    pub async fn record_feedback(
        &self,
        suggestion_id: &str,
        feedback: Feedback,
        modification: Option<&str>,
    ) {
        let shown = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let counts = state.feedback.entry(suggestion_id.to_string()).or_default();
            match feedback {
                Feedback::Accepted => counts.accepted += 1,
                Feedback::Rejected => counts.rejected += 1,
                Feedback::Modified => counts.modified += 1,
            }
            state
                .history
                .iter()
                .rev()
                .find(|s| s.suggestion.id == suggestion_id)
                .cloned()
        };

        info!(suggestion_id, ?feedback, modification, "Suggestion feedback recorded");

        let (Some(shown), Some(graph)) = (shown, &self.graph) else {
            return;
        };
        let delta = if feedback == Feedback::Accepted {
            ACCEPT_DELTA
        } else {
            REJECT_DELTA
        };
        if let Err(e) = graph
            .adjust_confidence(&shown.current_action, &shown.suggestion.action, delta)
            .await
        {
            warn!(
                error = %e,
                from = %shown.current_action,
                to = %shown.suggestion.action,
                "Failed to adjust relationship confidence"
            );
        }
    }

    pub fn get_suggestion_stats(&self) -> SuggestionStats {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let total_accepted: u32 = state.feedback.values().map(|c| c.accepted).sum();
        let total_rejected: u32 = state.feedback.values().map(|c| c.rejected).sum();
        let decided = total_accepted + total_rejected;
        SuggestionStats {
            total_shown: state.total_shown,
            total_accepted,
            total_rejected,
            acceptance_rate: if decided == 0 {
                0.0
            } else {
                f64::from(total_accepted) / f64::from(decided)
            },
            unique_suggestions: state.feedback.len(),
        }
    }

    pub fn feedback_for(&self, suggestion_id: &str) -> FeedbackCounts {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .feedback
            .get(suggestion_id)
            .copied()
            .unwrap_or_default()
    }
}

/// Sort by confidence, keep the first (highest) entry per action, truncate.
fn rank(mut candidates: Vec<Suggestion>, max: usize) -> Vec<Suggestion> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut seen = HashSet::new();
    candidates.retain(|s| seen.insert(s.action.clone()));
    candidates.truncate(max);
    candidates
}
