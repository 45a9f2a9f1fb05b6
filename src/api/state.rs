use std::sync::Arc;

use crate::{
    db::Store,
    services::{Catalog, DiseaseExtractor, PropagationQueue, RecommendationService},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub recommendations: RecommendationService,
    pub propagation: PropagationQueue,
    pub extractor: Arc<dyn DiseaseExtractor>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        recommendations: RecommendationService,
        propagation: PropagationQueue,
        extractor: Arc<dyn DiseaseExtractor>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            store,
            recommendations,
            propagation,
            extractor,
            catalog,
        }
    }
}
