//! Collection-scoped vector storage with brute-force cosine search.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

impl VectorPoint {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, payload: Value) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredPoint {
    pub point: VectorPoint,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a point in a collection, creating the collection
    /// on first use.
    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<()>;

    /// Nearest points by cosine similarity, best first. Points scoring
    /// below `score_threshold` are dropped.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    async fn count(&self, collection: &str) -> Result<usize>;
}

/// Cosine similarity; mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, HashMap<String, VectorPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(point.id.clone(), point);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let threshold = score_threshold.unwrap_or(f32::MIN);
        let mut results: Vec<ScoredPoint> = points
            .values()
            .map(|point| ScoredPoint {
                score: cosine_similarity(query, &point.vector),
                point: point.clone(),
            })
            .filter(|r| r.score >= threshold)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.point.id.cmp(&b.point.id))
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get_mut(collection)
            .and_then(|points| points.remove(id))
            .is_some())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections.get(collection).map_or(0, HashMap::len))
    }
}
