use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{Interaction, InteractionAction, RecommendationSet},
    services::{
        propagation::{PropagationJob, PropagationQueue},
        recommendations::RecommendationService,
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionRequest {
    pub user_id: i64,
    pub meal_id: i64,
    /// One of like, dislike, buy or rate
    pub action: String,
    /// Required when `action` is rate
    #[serde(default)]
    pub rating: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub interaction: Interaction,
    /// The acting user's freshly recomputed set
    pub recommendations: RecommendationSet,
    /// Whether peers sharing the user's disease were queued for refresh
    pub propagation_queued: bool,
}

/// Records an interaction and refreshes the recommendations it affects
///
/// The acting user is recomputed before returning; peers with the same disease
/// label are refreshed in the background.
pub async fn record_interaction(
    store: &dyn Store,
    recommendations: &RecommendationService,
    propagation: &PropagationQueue,
    request: InteractionRequest,
) -> AppResult<InteractionResponse> {
    let action = InteractionAction::parse(&request.action, request.rating)?;

    let user = store
        .find_user(request.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", request.user_id)))?;
    store
        .find_meal(request.meal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Meal {} not found", request.meal_id)))?;

    let interaction = store
        .upsert_interaction(user.user_id, request.meal_id, action.effect(), Utc::now())
        .await?;

    tracing::info!(
        user_id = user.user_id,
        meal_id = request.meal_id,
        %action,
        "Interaction recorded"
    );

    let recommendations = recommendations.refresh_user(&user, None).await?;

    let propagation_queued = match user.disease_label() {
        Some(disease) => propagation.enqueue(PropagationJob {
            origin_user_id: user.user_id,
            disease,
        }),
        None => {
            tracing::debug!(user_id = user.user_id, "No disease label, skipping propagation");
            false
        }
    };

    Ok(InteractionResponse {
        interaction,
        recommendations,
        propagation_queued,
    })
}
