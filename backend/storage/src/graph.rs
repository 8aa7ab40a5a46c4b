//! Weighted "followed by" edges between actions.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hearth_core::Prediction;

/// One observed transition `from -> to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEdge {
    pub from: String,
    pub to: String,
    pub frequency: u32,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

impl ActionEdge {
    fn first(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            frequency: 1,
            confidence: 0.5,
            last_seen: Utc::now(),
        }
    }

    /// Repeat sightings move confidence along a fixed schedule.
    fn bump(&mut self) {
        self.frequency += 1;
        self.confidence = if self.frequency > 10 {
            0.9
        } else if self.frequency > 5 {
            0.7
        } else {
            0.5 + 0.05 * f64::from(self.frequency)
        };
        self.last_seen = Utc::now();
    }
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn record_transition(&self, from: &str, to: &str) -> Result<ActionEdge>;

    /// Successors of `from` with confidence at or above `min_confidence`,
    /// most confident first.
    async fn next_actions(
        &self,
        from: &str,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Prediction>>;

    /// Shift an edge's confidence by `delta`, clamped to `[0, 1]`.
    async fn adjust_confidence(&self, from: &str, to: &str, delta: f64) -> Result<f64>;
}

#[derive(Default)]
pub struct InMemoryRelationshipStore {
    edges: RwLock<HashMap<(String, String), ActionEdge>>,
}

impl InMemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<ActionEdge> {
        self.edges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(from.to_string(), to.to_string()))
            .cloned()
    }
}

#[async_trait]
impl RelationshipStore for InMemoryRelationshipStore {
    async fn record_transition(&self, from: &str, to: &str) -> Result<ActionEdge> {
        let mut edges = self.edges.write().unwrap_or_else(PoisonError::into_inner);
        let edge = edges
            .entry((from.to_string(), to.to_string()))
            .and_modify(ActionEdge::bump)
            .or_insert_with(|| ActionEdge::first(from, to));
        debug!(from, to, frequency = edge.frequency, "Transition recorded");
        Ok(edge.clone())
    }

    async fn next_actions(
        &self,
        from: &str,
        min_confidence: f64,
        limit: usize,
    ) -> Result<Vec<Prediction>> {
        let edges = self.edges.read().unwrap_or_else(PoisonError::into_inner);
        let mut predictions: Vec<Prediction> = edges
            .values()
            .filter(|e| e.from == from && e.confidence >= min_confidence)
            .map(|e| Prediction {
                action: e.to.clone(),
                confidence: e.confidence,
                frequency: e.frequency,
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.frequency.cmp(&a.frequency))
                .then_with(|| a.action.cmp(&b.action))
        });
        predictions.truncate(limit);
        Ok(predictions)
    }

    async fn adjust_confidence(&self, from: &str, to: &str, delta: f64) -> Result<f64> {
        let mut edges = self.edges.write().unwrap_or_else(PoisonError::into_inner);
        let Some(edge) = edges.get_mut(&(from.to_string(), to.to_string())) else {
            bail!("No relationship {} -> {}", from, to);
        };
        edge.confidence = (edge.confidence + delta).clamp(0.0, 1.0);
        Ok(edge.confidence)
    }
}
