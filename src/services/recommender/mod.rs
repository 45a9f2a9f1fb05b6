//! The three recommendation strategies and the fusion step that merges them.
//!
//! Everything in here is synchronous CPU work over data the caller has already
//! loaded from the store.

pub mod collaborative;
pub mod content;
pub mod hybrid;

use thiserror::Error;

use crate::models::Candidate;

pub use collaborative::{pearson, InteractionMatrix};
pub use content::{cosine_similarity, ContentScorer, TfIdfVectorizer};
pub use hybrid::{fuse, FusionResult};

/// Recoverable failures of a single strategy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecommenderError {
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("meal catalog is empty")]
    EmptyCatalog,
}

/// What one strategy hands to fusion
pub type StrategyOutput = Result<Vec<Candidate>, RecommenderError>;
