use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        Interaction, InteractionEffect, Meal, NewRecommendation, ProfileChanges,
        StoredRecommendation, User,
    },
};

/// Persistence contract for users, meals, interactions and stored recommendations
///
/// Implementations must keep at most one interaction row per (user, meal) pair and
/// must make `replace_recommendations` all-or-nothing for the given user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, user_id: i64) -> AppResult<Option<User>>;

    /// Ids of every user whose disease label matches `disease` case-insensitively
    async fn users_with_disease(&self, disease: &str) -> AppResult<Vec<i64>>;

    /// Applies `changes` to the user and returns the updated row; `None` if absent
    async fn update_profile(
        &self,
        user_id: i64,
        changes: &ProfileChanges,
    ) -> AppResult<Option<User>>;

    /// The full meal catalog in stable catalog order
    async fn list_meals(&self) -> AppResult<Vec<Meal>>;

    async fn find_meal(&self, meal_id: i64) -> AppResult<Option<Meal>>;

    /// Every interaction row, in insertion order
    async fn list_interactions(&self) -> AppResult<Vec<Interaction>>;

    /// Creates or updates the row for (user, meal), applying `effect` at time `at`
    async fn upsert_interaction(
        &self,
        user_id: i64,
        meal_id: i64,
        effect: InteractionEffect,
        at: DateTime<Utc>,
    ) -> AppResult<Interaction>;

    /// Stored recommendations for the user created at or after `since`
    async fn recommendations_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<StoredRecommendation>>;

    /// Deletes every stored recommendation for the user and inserts `entries`
    /// stamped with `created_at`, atomically.
    async fn replace_recommendations(
        &self,
        user_id: i64,
        entries: &[NewRecommendation],
        created_at: DateTime<Utc>,
    ) -> AppResult<()>;
}
