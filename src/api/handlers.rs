use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::RecommendationSet,
    services::{
        interactions::{self, InteractionRequest, InteractionResponse},
        profile::{self, DiseaseHistoryRequest, ParsedDiseaseHistory, ProfileUpdate},
    },
};

use super::{
    extract::{ApiJson, ApiPath, ApiQuery},
    AppState,
};

const MAX_TOP_N: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default)]
    pub refresh: bool,
    pub top_n: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    pub top_n: Option<usize>,
}

fn validate_top_n(top_n: Option<usize>) -> AppResult<Option<usize>> {
    match top_n {
        Some(n) if n == 0 || n > MAX_TOP_N => Err(AppError::InvalidInput(format!(
            "top_n must be between 1 and {}",
            MAX_TOP_N
        ))),
        other => Ok(other),
    }
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Recommendations for a user, served from the stored set while it is fresh
pub async fn get_recommendations(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<RecommendationQuery>,
) -> AppResult<Json<RecommendationSet>> {
    let top_n = validate_top_n(query.top_n)?;
    let set = state
        .recommendations
        .recommend(user_id, top_n, query.refresh)
        .await?;
    Ok(Json(set))
}

/// Forces a recomputation of a user's recommendations
pub async fn refresh_recommendations(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<RefreshQuery>,
) -> AppResult<Json<RecommendationSet>> {
    let top_n = validate_top_n(query.top_n)?;
    let set = state.recommendations.refresh(user_id, top_n).await?;
    Ok(Json(set))
}

/// Records a like, dislike, buy or rate event
pub async fn record_interaction(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<InteractionRequest>,
) -> AppResult<(StatusCode, Json<InteractionResponse>)> {
    let response = interactions::record_interaction(
        state.store.as_ref(),
        &state.recommendations,
        &state.propagation,
        request,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Extracts diseases from a medical history without touching any profile
pub async fn parse_disease_history(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DiseaseHistoryRequest>,
) -> AppResult<Json<ParsedDiseaseHistory>> {
    let parsed =
        profile::parse_disease_history(state.extractor.as_ref(), &state.catalog, &request).await?;
    Ok(Json(parsed))
}

/// Extracts diseases from a medical history and stores them on the user's profile
pub async fn update_disease_history(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(request): ApiJson<DiseaseHistoryRequest>,
) -> AppResult<Json<ProfileUpdate>> {
    let update = profile::apply_disease_history(
        state.store.as_ref(),
        state.extractor.as_ref(),
        &state.catalog,
        &state.recommendations,
        &state.propagation,
        user_id,
        &request,
    )
    .await?;
    Ok(Json(update))
}
