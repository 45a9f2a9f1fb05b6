use serde::{Deserialize, Serialize};

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{ProfileChanges, RecommendationSet, User},
    services::{
        catalog::Catalog,
        extraction::DiseaseExtractor,
        propagation::{PropagationJob, PropagationQueue},
        recommendations::RecommendationService,
    },
};

pub const NO_DISEASES_DETECTED: &str = "No diseases detected";

#[derive(Debug, Clone, Deserialize)]
pub struct DiseaseHistoryRequest {
    pub history: String,
    /// Optional image of a medical report
    #[serde(default)]
    pub img_url: Option<String>,
    /// Height in centimetres; the stored value is kept when absent
    #[serde(default)]
    pub height: Option<f64>,
    /// Weight in kilograms; the stored value is kept when absent
    #[serde(default)]
    pub weight: Option<f64>,
}

fn validate_measurement(name: &str, value: Option<f64>) -> AppResult<()> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(AppError::InvalidInput(format!(
            "{} must be a positive number",
            name
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParsedDiseaseHistory {
    pub diseases: Vec<String>,
    pub recommended_diet: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdate {
    pub user: User,
    pub diseases: Vec<String>,
    pub recommended_diet: String,
    pub recommendations: RecommendationSet,
    pub propagation_queued: bool,
}

/// Extracts diseases from a history and looks up the matching diet
pub async fn parse_disease_history(
    extractor: &dyn DiseaseExtractor,
    catalog: &Catalog,
    request: &DiseaseHistoryRequest,
) -> AppResult<ParsedDiseaseHistory> {
    if request.history.trim().is_empty() && request.img_url.is_none() {
        return Err(AppError::InvalidInput(
            "history must not be empty".to_string(),
        ));
    }

    let diseases = extractor
        .extract(&request.history, request.img_url.as_deref())
        .await;
    if diseases.is_empty() {
        return Err(AppError::InvalidInput(NO_DISEASES_DETECTED.to_string()));
    }

    let recommended_diet = catalog.recommend_diet(&diseases);
    tracing::info!(
        extractor = extractor.name(),
        diseases = ?diseases,
        %recommended_diet,
        "Parsed disease history"
    );

    Ok(ParsedDiseaseHistory {
        diseases,
        recommended_diet,
    })
}

/// Stores the diseases and diet found in a user's history, then refreshes
/// recommendations for the user and for peers sharing the new disease label
pub async fn apply_disease_history(
    store: &dyn Store,
    extractor: &dyn DiseaseExtractor,
    catalog: &Catalog,
    recommendations: &RecommendationService,
    propagation: &PropagationQueue,
    user_id: i64,
    request: &DiseaseHistoryRequest,
) -> AppResult<ProfileUpdate> {
    validate_measurement("height", request.height)?;
    validate_measurement("weight", request.weight)?;
    recommendations.require_user(user_id).await?;

    let parsed = parse_disease_history(extractor, catalog, request).await?;
    let changes = ProfileChanges {
        disease: parsed.diseases.join(" "),
        diet: parsed.recommended_diet.clone(),
        height: request.height,
        weight: request.weight,
    };

    let user = store
        .update_profile(user_id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    tracing::info!(user_id, disease = %changes.disease, "Profile updated");

    let refreshed = recommendations.refresh_user(&user, None).await?;
    let propagation_queued = user
        .disease_label()
        .map(|disease| {
            propagation.enqueue(PropagationJob {
                origin_user_id: user_id,
                disease,
            })
        })
        .unwrap_or(false);

    Ok(ProfileUpdate {
        user,
        diseases: parsed.diseases,
        recommended_diet: parsed.recommended_diet,
        recommendations: refreshed,
        propagation_queued,
    })
}
