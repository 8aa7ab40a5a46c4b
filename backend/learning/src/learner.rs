use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use hearth_core::{Feedback, Pattern, Suggestion};
use hearth_storage::{InMemoryRelationshipStore, RelationshipStore};

use crate::pattern_detector::PatternDetector;
use crate::suggestion_engine::{SuggestionEngine, SuggestionStats};

/// Defaults used when mining patterns after a turn.
pub const DEFAULT_MIN_FREQUENCY: u32 = 3;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Shared entry point into the learning subsystem: one detector, one
/// relationship store, one suggestion engine.
pub struct Learner {
    detector: Arc<PatternDetector>,
    graph: Arc<dyn RelationshipStore>,
    engine: SuggestionEngine,
    max_suggestions: usize,
}

impl Learner {
    pub fn new(graph: Arc<dyn RelationshipStore>) -> Self {
        let detector = Arc::new(PatternDetector::new());
        let engine = SuggestionEngine::new(detector.clone()).with_graph(graph.clone());
        Self {
            detector,
            graph,
            engine,
            max_suggestions: 3,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRelationshipStore::new()))
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub fn detector(&self) -> &Arc<PatternDetector> {
        &self.detector
    }

    pub fn engine(&self) -> &SuggestionEngine {
        &self.engine
    }

    /// Feed an ordered run of completed actions into the detector and the
    /// relationship store. Graph failures are logged and skipped.
    pub async fn observe(&self, actions: &[String], context: &Value) {
        for action in actions {
            self.detector.record_action(action, context.clone());
        }
        for pair in actions.windows(2) {
            if let Err(e) = self.graph.record_transition(&pair[0], &pair[1]).await {
                warn!(error = %e, from = %pair[0], to = %pair[1], "Failed to record transition");
            }
        }
        debug!(count = actions.len(), "Actions observed");
    }

    pub fn detect_patterns(&self) -> Vec<Pattern> {
        self.detector
            .detect_patterns(DEFAULT_MIN_FREQUENCY, DEFAULT_MIN_CONFIDENCE)
    }

    pub async fn suggest(&self, current_action: &str, context: &Value) -> Vec<Suggestion> {
        self.engine
            .generate_suggestions(current_action, context, self.max_suggestions)
            .await
    }

    pub async fn feedback(&self, suggestion_id: &str, feedback: Feedback, modification: Option<&str>) {
        self.engine
            .record_feedback(suggestion_id, feedback, modification)
            .await;
    }

    pub fn stats(&self) -> SuggestionStats {
        self.engine.get_suggestion_stats()
    }
}
