use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{
        Interaction, InteractionEffect, Meal, NewRecommendation, ProfileChanges,
        StoredRecommendation, User,
    },
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    meals: Vec<Meal>,
    interactions: Vec<Interaction>,
    recommendations: HashMap<i64, Vec<StoredRecommendation>>,
    /// Users whose recommendation writes fail; set only through the test hook below
    failing_writes: HashSet<i64>,
}

/// In-process store with the same semantics as the Postgres store
///
/// Recommendation writes are staged and swapped in whole, so a failed write never
/// leaves a partial set behind.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.inner.write().await.users.insert(user.user_id, user);
    }

    pub async fn insert_meal(&self, meal: Meal) {
        let mut state = self.inner.write().await;
        state.meals.retain(|m| m.meal_id != meal.meal_id);
        state.meals.push(meal);
        state.meals.sort_by_key(|m| m.meal_id);
    }

    /// Test hook: makes every later recommendation write for `user_id` fail after
    /// staging, so rollback paths can be exercised without a database
    ///
    /// Nothing in the server calls this. The failure is permanent for the store's
    /// lifetime.
    pub async fn fail_recommendation_writes(&self, user_id: i64) {
        self.inner.write().await.failing_writes.insert(user_id);
    }

    /// All stored recommendations for the user, regardless of age
    pub async fn stored_recommendations(&self, user_id: i64) -> Vec<StoredRecommendation> {
        self.inner
            .read()
            .await
            .recommendations
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, user_id: i64) -> AppResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn users_with_disease(&self, disease: &str) -> AppResult<Vec<i64>> {
        let wanted = disease.trim().to_lowercase();
        let state = self.inner.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.disease_label().as_deref() == Some(wanted.as_str()))
            .map(|u| u.user_id)
            .collect())
    }

    async fn update_profile(
        &self,
        user_id: i64,
        changes: &ProfileChanges,
    ) -> AppResult<Option<User>> {
        let mut state = self.inner.write().await;
        Ok(state.users.get_mut(&user_id).map(|user| {
            user.disease = Some(changes.disease.clone());
            user.diet = Some(changes.diet.clone());
            user.height = changes.height.or(user.height);
            user.weight = changes.weight.or(user.weight);
            user.clone()
        }))
    }

    async fn list_meals(&self) -> AppResult<Vec<Meal>> {
        Ok(self.inner.read().await.meals.clone())
    }

    async fn find_meal(&self, meal_id: i64) -> AppResult<Option<Meal>> {
        let state = self.inner.read().await;
        Ok(state.meals.iter().find(|m| m.meal_id == meal_id).cloned())
    }

    async fn list_interactions(&self) -> AppResult<Vec<Interaction>> {
        Ok(self.inner.read().await.interactions.clone())
    }

    async fn upsert_interaction(
        &self,
        user_id: i64,
        meal_id: i64,
        effect: InteractionEffect,
        at: DateTime<Utc>,
    ) -> AppResult<Interaction> {
        let mut state = self.inner.write().await;
        let existing = state
            .interactions
            .iter()
            .position(|row| row.user_id == user_id && row.meal_id == meal_id);

        let row = match existing {
            Some(idx) => {
                let row = &mut state.interactions[idx];
                row.apply(effect, at);
                row.clone()
            }
            None => {
                let mut row = Interaction::new(user_id, meal_id, at);
                row.apply(effect, at);
                state.interactions.push(row.clone());
                row
            }
        };
        Ok(row)
    }

    async fn recommendations_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<StoredRecommendation>> {
        let state = self.inner.read().await;
        Ok(state
            .recommendations
            .get(&user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.created_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn replace_recommendations(
        &self,
        user_id: i64,
        entries: &[NewRecommendation],
        created_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.inner.write().await;

        let mut staged = Vec::with_capacity(entries.len());
        for entry in entries {
            let meal = state
                .meals
                .iter()
                .find(|m| m.meal_id == entry.meal_id)
                .cloned()
                .ok_or_else(|| {
                    AppError::Persistence(format!("meal {} does not exist", entry.meal_id))
                })?;
            staged.push(StoredRecommendation {
                user_id,
                meal,
                reason: entry.reason.clone(),
                created_at,
            });
        }

        if state.failing_writes.contains(&user_id) {
            return Err(AppError::Persistence(format!(
                "write of {} recommendations for user {} aborted",
                staged.len(),
                user_id
            )));
        }

        state.recommendations.insert(user_id, staged);
        Ok(())
    }
}
