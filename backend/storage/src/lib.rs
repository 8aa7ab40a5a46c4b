//! Storage collaborators used by the pipeline and the learning subsystem.
//!
//! Each store is a trait with an in-process implementation; the action log
//! also has a durable SQLite backend.

pub mod action_log;
pub mod graph;
pub mod preferences;
pub mod vector;

pub use action_log::{ActionLog, InMemoryActionLog, SqliteActionLog};
pub use graph::{ActionEdge, InMemoryRelationshipStore, RelationshipStore};
pub use preferences::{InMemoryPreferenceStore, PreferenceStore};
pub use vector::{InMemoryVectorStore, ScoredPoint, VectorPoint, VectorStore, cosine_similarity};
