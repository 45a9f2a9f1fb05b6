use std::sync::Arc;

use crate::{
    config::Config,
    db::Store,
    error::{AppError, AppResult},
    models::{FusedMeal, RecommendationSet, RecommendationSource, User},
    services::{
        recommendation_cache::RecommendationCache,
        recommender::{content, fuse, FusionResult, InteractionMatrix},
    },
};

/// Tuning knobs for the hybrid pipeline
#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    /// Candidates each strategy contributes before fusion
    pub top_n: usize,
    /// How long a stored set counts as fresh
    pub freshness: chrono::Duration,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            top_n: 5,
            freshness: chrono::Duration::hours(24),
        }
    }
}

impl From<&Config> for RecommenderSettings {
    fn from(config: &Config) -> Self {
        Self {
            top_n: config.recommendation_top_n,
            freshness: config.recommendation_ttl(),
        }
    }
}

/// Runs the hybrid recommender and keeps each user's stored set current
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn Store>,
    cache: RecommendationCache,
    settings: RecommenderSettings,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn Store>, settings: RecommenderSettings) -> Self {
        Self {
            cache: RecommendationCache::new(store.clone()),
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    pub async fn require_user(&self, user_id: i64) -> AppResult<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    /// Ids of every user sharing the given disease label
    pub async fn peers(&self, disease: &str) -> AppResult<Vec<i64>> {
        self.store.users_with_disease(disease).await
    }

    /// Computes a fresh fused set for `user` from the current catalog and interactions
    ///
    /// Strategy failures degrade that strategy only. An empty result is a valid answer.
    pub async fn compute(&self, user: &User, top_n: usize) -> AppResult<Vec<FusedMeal>> {
        let meals = self.store.list_meals().await?;
        let interactions = self.store.list_interactions().await?;

        let content = content::recommend(user, &meals, top_n);
        let matrix = InteractionMatrix::from_interactions(&interactions);
        let user_based = matrix.user_based(user.user_id, top_n);
        let item_based = matrix.item_based(user.user_id, top_n);

        match fuse(&meals, content, user_based, item_based) {
            FusionResult::Meals(fused) => {
                tracing::info!(
                    user_id = user.user_id,
                    top_n,
                    catalog = meals.len(),
                    interactions = interactions.len(),
                    recommendations = fused.len(),
                    "Computed hybrid recommendations"
                );
                Ok(fused)
            }
            FusionResult::NoRecommendations => {
                tracing::info!(user_id = user.user_id, "No recommendations available");
                Ok(Vec::new())
            }
        }
    }

    /// Cached set when fresh, otherwise a recomputed one
    ///
    /// `refresh` skips the cache. A cache read error falls back to recomputation.
    pub async fn recommend(
        &self,
        user_id: i64,
        top_n: Option<usize>,
        refresh: bool,
    ) -> AppResult<RecommendationSet> {
        let user = self.require_user(user_id).await?;

        match self.cache.get(user_id, self.settings.freshness, refresh).await {
            Ok(Some(entries)) => {
                return Ok(RecommendationSet::new(
                    user_id,
                    RecommendationSource::Cache,
                    true,
                    entries.into_iter().map(Into::into).collect(),
                ));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Recommendation cache read failed, recomputing");
            }
        }

        self.refresh_user(&user, top_n).await
    }

    /// Recomputes and stores the set for `user_id`, bypassing the cache
    pub async fn refresh(&self, user_id: i64, top_n: Option<usize>) -> AppResult<RecommendationSet> {
        let user = self.require_user(user_id).await?;
        self.refresh_user(&user, top_n).await
    }

    /// Recomputes and stores the set for an already loaded user
    ///
    /// A failed write is logged and the computed set is still returned, marked unpersisted.
    pub async fn refresh_user(
        &self,
        user: &User,
        top_n: Option<usize>,
    ) -> AppResult<RecommendationSet> {
        let top_n = top_n.unwrap_or(self.settings.top_n);
        let fused = self.compute(user, top_n).await?;

        let persisted = match self.cache.replace(user.user_id, &fused).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = user.user_id,
                    "Serving recommendations that could not be stored"
                );
                false
            }
        };

        Ok(RecommendationSet::new(
            user.user_id,
            RecommendationSource::Computed,
            persisted,
            fused.into_iter().map(Into::into).collect(),
        ))
    }

    /// Recomputes and stores with default settings, surfacing write failures
    ///
    /// Returns the number of stored entries.
    pub async fn recompute_and_store(&self, user_id: i64) -> AppResult<usize> {
        let user = self.require_user(user_id).await?;
        let fused = self.compute(&user, self.settings.top_n).await?;
        self.cache.replace(user_id, &fused).await?;
        Ok(fused.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{store::MockStore, MemoryStore};
    use crate::models::{InteractionAction, Meal};
    use chrono::Utc;

    fn user(user_id: i64, disease: &str, diet: &str) -> User {
        User {
            user_id,
            username: format!("user{}", user_id),
            height: None,
            weight: None,
            disease: Some(disease.to_string()),
            diet: Some(diet.to_string()),
        }
    }

    fn meal(meal_id: i64, name: &str, nutrient: &str, disease: &str, diet: &str) -> Meal {
        Meal {
            meal_id,
            name: name.to_string(),
            nutrient: nutrient.to_string(),
            disease: disease.to_string(),
            diet: diet.to_string(),
        }
    }

    fn catalog() -> Vec<Meal> {
        vec![
            meal(1, "Oat Bowl", "fiber", "Diabetes", "low_sugar"),
            meal(2, "Spinach Stew", "iron", "Anemia", "iron_rich"),
            meal(3, "Grilled Fish", "omega3", "Hypertension", "dash"),
            meal(4, "Lentil Curry", "iron protein", "Anemia", "vegetarian"),
        ]
    }

    async fn memory_service() -> (MemoryStore, RecommendationService) {
        let store = MemoryStore::new();
        for m in catalog() {
            store.insert_meal(m).await;
        }
        store.insert_user(user(7, "Anemia", "iron_rich")).await;
        let service = RecommendationService::new(Arc::new(store.clone()), RecommenderSettings::default());
        (store, service)
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let (_store, service) = memory_service().await;

        let first = service.recommend(7, None, false).await.unwrap();
        assert_eq!(first.source, RecommendationSource::Computed);
        assert!(first.persisted);
        assert!(!first.recommendations.is_empty());

        let second = service.recommend(7, None, false).await.unwrap();
        assert_eq!(second.source, RecommendationSource::Cache);
        assert_eq!(second.recommendations, first.recommendations);
    }

    #[tokio::test]
    async fn test_refresh_flag_recomputes() {
        let (_store, service) = memory_service().await;
        service.recommend(7, None, false).await.unwrap();

        let refreshed = service.recommend(7, None, true).await.unwrap();
        assert_eq!(refreshed.source, RecommendationSource::Computed);
    }

    #[tokio::test]
    async fn test_content_ranking_prefers_matching_profile() {
        let (_store, service) = memory_service().await;
        let set = service.refresh(7, Some(1)).await.unwrap();

        assert_eq!(set.recommendations.len(), 1);
        assert_eq!(set.recommendations[0].meal.meal_id, 2);
        assert_eq!(set.recommendations[0].reason, "content");
    }

    #[tokio::test]
    async fn test_collaborative_signal_is_fused_in() {
        let (store, service) = memory_service().await;
        store.insert_user(user(8, "Anemia", "vegetarian")).await;
        let now = Utc::now();
        for (user_id, meal_id) in [(7, 2), (8, 2), (8, 3)] {
            store
                .upsert_interaction(user_id, meal_id, InteractionAction::Like.effect(), now)
                .await
                .unwrap();
        }

        let set = service.refresh(7, Some(1)).await.unwrap();
        let reasons: Vec<&str> = set.recommendations.iter().map(|r| r.reason.as_str()).collect();
        assert!(reasons.iter().any(|r| r.contains("user_based") || r.contains("item_based")));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (_store, service) = memory_service().await;
        let result = service.recommend(404, None, false).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_catalog_yields_message() {
        let store = MemoryStore::new();
        store.insert_user(user(7, "Anemia", "iron_rich")).await;
        let service = RecommendationService::new(Arc::new(store), RecommenderSettings::default());

        let set = service.recommend(7, None, false).await.unwrap();
        assert!(set.recommendations.is_empty());
        assert!(set.message.is_some());
    }

    #[tokio::test]
    async fn test_persistence_failure_still_serves_computed_set() {
        let mut store = MockStore::new();
        store
            .expect_find_user()
            .returning(|id| Ok(Some(user(id, "Anemia", "iron_rich"))));
        store
            .expect_recommendations_since()
            .returning(|_, _| Ok(vec![]));
        store.expect_list_meals().returning(|| Ok(catalog()));
        store.expect_list_interactions().returning(|| Ok(vec![]));
        store
            .expect_replace_recommendations()
            .times(1)
            .returning(|_, _, _| Err(AppError::Persistence("disk full".to_string())));

        let service = RecommendationService::new(Arc::new(store), RecommenderSettings::default());
        let set = service.recommend(7, None, false).await.unwrap();

        assert_eq!(set.source, RecommendationSource::Computed);
        assert!(!set.persisted);
        assert!(!set.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_cache_read_failure_falls_back_to_compute() {
        let mut store = MockStore::new();
        store
            .expect_find_user()
            .returning(|id| Ok(Some(user(id, "Anemia", "iron_rich"))));
        store
            .expect_recommendations_since()
            .returning(|_, _| Err(AppError::Internal("connection reset".to_string())));
        store.expect_list_meals().returning(|| Ok(catalog()));
        store.expect_list_interactions().returning(|| Ok(vec![]));
        store
            .expect_replace_recommendations()
            .returning(|_, _, _| Ok(()));

        let service = RecommendationService::new(Arc::new(store), RecommenderSettings::default());
        let set = service.recommend(7, None, false).await.unwrap();
        assert_eq!(set.source, RecommendationSource::Computed);
        assert!(set.persisted);
    }

    #[tokio::test]
    async fn test_recompute_and_store_surfaces_write_failure() {
        let (store, service) = memory_service().await;
        store.fail_recommendation_writes(7).await;

        let result = service.recompute_and_store(7).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
    }
}
