pub mod ids;
pub mod learner;
pub mod pattern_detector;
pub mod suggestion_engine;

pub use ids::suggestion_id;
pub use learner::Learner;
pub use pattern_detector::{ActionHistoryEntry, PatternDetector};
pub use suggestion_engine::{FeedbackCounts, SuggestionEngine, SuggestionStats};
