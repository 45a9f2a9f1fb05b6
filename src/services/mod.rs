pub mod catalog;
pub mod extraction;
pub mod interactions;
pub mod profile;
pub mod propagation;
pub mod recommendation_cache;
pub mod recommendations;
pub mod recommender;

pub use catalog::Catalog;
pub use extraction::{DiseaseExtractor, OpenAiExtractor};
pub use propagation::{PropagationHandle, PropagationQueue};
pub use recommendation_cache::RecommendationCache;
pub use recommendations::{RecommendationService, RecommenderSettings};
