//! Mines the action history for repeated sequences and time-of-day habits.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, Timelike};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use hearth_core::{Pattern, Prediction};

/// Most recent actions kept in history.
pub const HISTORY_CAPACITY: usize = 1000;
/// Sequence counts are refreshed from this many trailing entries.
pub const SEQUENCE_WINDOW: usize = 10;
/// Hour-of-day analysis looks at this many trailing timestamps per action.
pub const TEMPORAL_WINDOW: usize = 30;
/// An hour must repeat this often to count as a habit.
pub const MIN_TEMPORAL_OCCURRENCES: u32 = 3;

const MAX_PREDICTIONS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ActionHistoryEntry {
    pub action: String,
    pub context: Value,
    pub timestamp: DateTime<Local>,
}

#[derive(Default)]
struct DetectorState {
    history: VecDeque<ActionHistoryEntry>,
    sequence_counts: HashMap<Vec<String>, u32>,
    temporal: HashMap<String, VecDeque<DateTime<Local>>>,
}

impl DetectorState {
    /// Count every contiguous 2-gram and 3-gram in the trailing window.
    fn update_sequences(&mut self) {
        if self.history.len() < 2 {
            return;
        }
        let start = self.history.len().saturating_sub(SEQUENCE_WINDOW);
        let recent: Vec<&str> = self
            .history
            .iter()
            .skip(start)
            .map(|e| e.action.as_str())
            .collect();

        for n in [2, 3] {
            for gram in recent.windows(n) {
                let key: Vec<String> = gram.iter().map(|s| s.to_string()).collect();
                *self.sequence_counts.entry(key).or_insert(0) += 1;
            }
        }
    }
}

/// Process-wide detector. All reads and writes go through one lock so the
/// evict-then-recount step stays atomic.
#[derive(Default)]
pub struct PatternDetector {
    state: Mutex<DetectorState>,
}

impl PatternDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_action(&self, action: &str, context: Value) {
        self.record_action_at(action, context, Local::now());
    }

    pub fn record_action_at(&self, action: &str, context: Value, timestamp: DateTime<Local>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        state.history.push_back(ActionHistoryEntry {
            action: action.to_string(),
            context,
            timestamp,
        });
        while state.history.len() > HISTORY_CAPACITY {
            state.history.pop_front();
        }

        let log = state.temporal.entry(action.to_string()).or_default();
        log.push_back(timestamp);
        while log.len() > HISTORY_CAPACITY {
            log.pop_front();
        }

        state.update_sequences();
        debug!(action, history = state.history.len(), "Action recorded");
    }

    /// Sequence patterns first (most confident first), then temporal
    /// patterns ordered by action name.
    pub fn detect_patterns(&self, min_frequency: u32, min_confidence: f64) -> Vec<Pattern> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut sequences: Vec<(&Vec<String>, u32, f64)> = state
            .sequence_counts
            .iter()
            .filter(|(_, &count)| count >= min_frequency)
            .map(|(seq, &count)| (seq, count, (f64::from(count) / 10.0).min(1.0)))
            .filter(|(_, _, confidence)| *confidence >= min_confidence)
            .collect();
        sequences.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.0.cmp(b.0))
        });

        let mut patterns: Vec<Pattern> = sequences
            .into_iter()
            .map(|(seq, frequency, confidence)| Pattern::Sequence {
                sequence: seq.clone(),
                frequency,
                confidence,
            })
            .collect();

        let mut actions: Vec<&String> = state.temporal.keys().collect();
        actions.sort();
        for action in actions {
            if let Some(pattern) = temporal_pattern(action, &state.temporal[action]) {
                patterns.push(pattern);
            }
        }

        info!(count = patterns.len(), "Patterns detected");
        patterns
    }

    /// Likely follow-ups to `current_action`, most confident first.
    pub fn get_next_action_prediction(&self, current_action: &str) -> Vec<Prediction> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut predictions: Vec<Prediction> = state
            .sequence_counts
            .iter()
            .filter(|(seq, _)| seq.len() >= 2 && seq[0] == current_action)
            .map(|(seq, &count)| Prediction {
                action: seq[1].clone(),
                confidence: (f64::from(count) / 5.0).min(1.0),
                frequency: count,
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.frequency.cmp(&a.frequency))
                .then_with(|| a.action.cmp(&b.action))
        });
        predictions.truncate(MAX_PREDICTIONS);
        predictions
    }

    pub fn clear_history(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = DetectorState::default();
        info!("Pattern history cleared");
    }

    pub fn history_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .len()
    }

    pub fn recent_actions(&self, limit: usize) -> Vec<ActionHistoryEntry> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let start = state.history.len().saturating_sub(limit);
        state.history.iter().skip(start).cloned().collect()
    }

    pub fn sequence_count(&self, sequence: &[&str]) -> u32 {
        let key: Vec<String> = sequence.iter().map(|s| s.to_string()).collect();
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sequence_counts
            .get(&key)
            .copied()
            .unwrap_or(0)
    }
}

/// Most common hour over the trailing window. Ties go to the hour seen
/// first in that window.
fn temporal_pattern(action: &str, timestamps: &VecDeque<DateTime<Local>>) -> Option<Pattern> {
    if timestamps.len() < MIN_TEMPORAL_OCCURRENCES as usize {
        return None;
    }

    let start = timestamps.len().saturating_sub(TEMPORAL_WINDOW);
    let window: Vec<&DateTime<Local>> = timestamps.iter().skip(start).collect();

    let mut hour_counts: Vec<(u32, u32)> = Vec::new();
    for ts in &window {
        let hour = ts.hour();
        match hour_counts.iter_mut().find(|(h, _)| *h == hour) {
            Some((_, count)) => *count += 1,
            None => hour_counts.push((hour, 1)),
        }
    }

    let mut best: Option<(u32, u32)> = None;
    for &(hour, count) in &hour_counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((hour, count));
        }
    }

    let (hour, frequency) = best?;
    if frequency < MIN_TEMPORAL_OCCURRENCES {
        return None;
    }
    Some(Pattern::Temporal {
        action: action.to_string(),
        hour,
        frequency,
        confidence: f64::from(frequency) / window.len() as f64,
    })
}
