use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{
        Interaction, InteractionEffect, Meal, NewRecommendation, ProfileChanges,
        StoredRecommendation, User,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct StoredRecommendationRow {
    user_id: i64,
    meal_id: i64,
    name: String,
    nutrient: String,
    disease: String,
    diet: String,
    reason: String,
    created_at: DateTime<Utc>,
}

impl From<StoredRecommendationRow> for StoredRecommendation {
    fn from(row: StoredRecommendationRow) -> Self {
        Self {
            user_id: row.user_id,
            meal: Meal {
                meal_id: row.meal_id,
                name: row.name,
                nutrient: row.nutrient,
                disease: row.disease,
                diet: row.diet,
            },
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

fn persistence(e: sqlx::Error) -> AppError {
    AppError::Persistence(e.to_string())
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, user_id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, height, weight, disease, diet
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn users_with_disease(&self, disease: &str) -> AppResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id
            FROM users
            WHERE LOWER(TRIM(disease)) = LOWER(TRIM($1))
            ORDER BY user_id
            "#,
        )
        .bind(disease)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn update_profile(
        &self,
        user_id: i64,
        changes: &ProfileChanges,
    ) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET disease = $2,
                diet = $3,
                height = COALESCE($4, height),
                weight = COALESCE($5, weight)
            WHERE user_id = $1
            RETURNING user_id, username, height, weight, disease, diet
            "#,
        )
        .bind(user_id)
        .bind(&changes.disease)
        .bind(&changes.diet)
        .bind(changes.height)
        .bind(changes.weight)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_meals(&self) -> AppResult<Vec<Meal>> {
        let meals = sqlx::query_as::<_, Meal>(
            r#"
            SELECT meal_id, name, nutrient, disease, diet
            FROM meals
            ORDER BY meal_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(meals)
    }

    async fn find_meal(&self, meal_id: i64) -> AppResult<Option<Meal>> {
        let meal = sqlx::query_as::<_, Meal>(
            r#"
            SELECT meal_id, name, nutrient, disease, diet
            FROM meals
            WHERE meal_id = $1
            "#,
        )
        .bind(meal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(meal)
    }

    async fn list_interactions(&self) -> AppResult<Vec<Interaction>> {
        let rows = sqlx::query_as::<_, Interaction>(
            r#"
            SELECT user_id, meal_id, liked, purchased, rated, updated_at
            FROM interactions
            ORDER BY interaction_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_interaction(
        &self,
        user_id: i64,
        meal_id: i64,
        effect: InteractionEffect,
        at: DateTime<Utc>,
    ) -> AppResult<Interaction> {
        // NULL flags keep the stored value on update and default to FALSE on insert
        let row = sqlx::query_as::<_, Interaction>(
            r#"
            INSERT INTO interactions (user_id, meal_id, liked, purchased, rated, updated_at)
            VALUES ($1, $2, COALESCE($3, FALSE), COALESCE($4, FALSE), COALESCE($5, FALSE), $6)
            ON CONFLICT (user_id, meal_id) DO UPDATE SET
                liked = COALESCE($3, interactions.liked),
                purchased = COALESCE($4, interactions.purchased),
                rated = COALESCE($5, interactions.rated),
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, meal_id, liked, purchased, rated, updated_at
            "#,
        )
        .bind(user_id)
        .bind(meal_id)
        .bind(effect.liked)
        .bind(effect.purchased)
        .bind(effect.rated)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn recommendations_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<StoredRecommendation>> {
        let rows = sqlx::query_as::<_, StoredRecommendationRow>(
            r#"
            SELECT r.user_id, m.meal_id, m.name, m.nutrient, m.disease, m.diet,
                   r.reason, r.created_at
            FROM recommendations r
            JOIN meals m ON m.meal_id = r.meal_id
            WHERE r.user_id = $1 AND r.created_at >= $2
            ORDER BY r.position
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StoredRecommendation::from).collect())
    }

    async fn replace_recommendations(
        &self,
        user_id: i64,
        entries: &[NewRecommendation],
        created_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let outcome: Result<(), sqlx::Error> = async {
            sqlx::query("DELETE FROM recommendations WHERE user_id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

            for (position, entry) in entries.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO recommendations (user_id, meal_id, reason, position, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(user_id)
                .bind(entry.meal_id)
                .bind(&entry.reason)
                .bind(position as i32)
                .bind(created_at)
                .execute(&mut *tx)
                .await?;
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => tx.commit().await.map_err(persistence),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, user_id, "Rollback of recommendation replace failed");
                }
                Err(persistence(e))
            }
        }
    }
}
