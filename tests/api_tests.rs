use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use nutribuddy_api::{
    api::{create_router, AppState},
    db::{MemoryStore, Store},
    models::{Meal, User},
    services::{
        Catalog, DiseaseExtractor, PropagationHandle, PropagationQueue, RecommendationService,
        RecommenderSettings,
    },
};

/// Recognizes vocabulary words that appear verbatim in the history
struct KeywordExtractor {
    catalog: Arc<Catalog>,
}

#[async_trait::async_trait]
impl DiseaseExtractor for KeywordExtractor {
    async fn extract(&self, history: &str, _image_url: Option<&str>) -> Vec<String> {
        let history = history.to_lowercase();
        self.catalog
            .vocabulary()
            .iter()
            .filter(|label| history.contains(&label.to_lowercase()))
            .cloned()
            .collect()
    }

    fn name(&self) -> &'static str {
        "keyword"
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

fn user(user_id: i64, disease: Option<&str>, diet: Option<&str>) -> User {
    User {
        user_id,
        username: format!("user{}", user_id),
        height: Some(172.0),
        weight: Some(68.5),
        disease: disease.map(str::to_string),
        diet: diet.map(str::to_string),
    }
}

struct TestApp {
    server: TestServer,
    store: MemoryStore,
    workers: PropagationHandle,
}

async fn create_test_app() -> TestApp {
    let store = MemoryStore::new();
    for m in [
        meal(1, "Oat Bowl", "fiber", "Diabetes", "Low_Sugar"),
        meal(2, "Spinach Stew", "iron", "Anemia", "Iron_Rich"),
        meal(3, "Grilled Salmon", "omega3", "Hypertension", "DASH"),
        meal(42, "Lentil Soup", "iron protein", "Anemia", "Vegetarian"),
    ] {
        store.insert_meal(m).await;
    }
    store.insert_user(user(7, Some("Anemia"), Some("Iron_Rich"))).await;
    store.insert_user(user(8, Some("Anemia"), Some("Vegetarian"))).await;
    store.insert_user(user(9, None, None)).await;

    let catalog = Arc::new(Catalog::new(
        ["Diabetes", "Hypertension", "Anemia"].map(String::from),
        [
            ("Diabetes".to_string(), "Low_Sugar".to_string()),
            ("Hypertension".to_string(), "DASH".to_string()),
            ("Anemia".to_string(), "Iron_Rich".to_string()),
        ],
    ));
    let extractor = Arc::new(KeywordExtractor {
        catalog: catalog.clone(),
    });

    let shared: Arc<MemoryStore> = Arc::new(store.clone());
    let service = RecommendationService::new(shared.clone(), RecommenderSettings::default());
    let (queue, workers) = PropagationQueue::start(service.clone(), 2, 16);

    let state = AppState::new(shared, service, queue, extractor, catalog);
    let server = TestServer::new(create_router(state)).unwrap();

    TestApp {
        server,
        store,
        workers,
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_recommendations_are_cached_after_first_request() {
    let app = create_test_app().await;

    let response = app.server.get("/api/v1/recommendations/7").await;
    response.assert_status_ok();
    let first: Value = response.json();
    assert_eq!(first["source"], "computed");
    assert_eq!(first["persisted"], true);
    assert_eq!(first["recommendations"][0]["meal_id"], 2);
    assert_eq!(first["recommendations"][0]["reason"], "content");

    let response = app.server.get("/api/v1/recommendations/7").await;
    let second: Value = response.json();
    assert_eq!(second["source"], "cache");
    assert_eq!(second["recommendations"], first["recommendations"]);

    let response = app
        .server
        .get("/api/v1/recommendations/7")
        .add_query_param("refresh", true)
        .await;
    let refreshed: Value = response.json();
    assert_eq!(refreshed["source"], "computed");
}

#[tokio::test]
async fn test_recommendations_for_unknown_user() {
    let app = create_test_app().await;
    let response = app.server.get("/api/v1/recommendations/404").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_top_n_out_of_range_is_rejected() {
    let app = create_test_app().await;
    for top_n in [0, 51] {
        let response = app
            .server
            .get("/api/v1/recommendations/7")
            .add_query_param("top_n", top_n)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_refresh_endpoint_limits_candidates() {
    let app = create_test_app().await;
    let response = app
        .server
        .post("/api/v1/recommendations/7/refresh")
        .add_query_param("top_n", 1)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 1);
    assert_eq!(app.store.stored_recommendations(7).await.len(), 1);
}

#[tokio::test]
async fn test_rate_interaction_creates_one_row_and_refreshes() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/v1/interactions")
        .json(&json!({ "user_id": 7, "meal_id": 42, "action": "rate", "rating": 4 }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["interaction"]["rated"], true);
    assert_eq!(body["interaction"]["liked"], false);
    assert_eq!(body["interaction"]["purchased"], false);
    assert_eq!(body["recommendations"]["source"], "computed");
    assert_eq!(body["propagation_queued"], true);

    app.server
        .post("/api/v1/interactions")
        .json(&json!({ "user_id": 7, "meal_id": 42, "action": "like" }))
        .await
        .assert_status(StatusCode::CREATED);

    let rows = app.store.list_interactions().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].rated && rows[0].liked);

    app.workers.shutdown().await;
    assert!(!app.store.stored_recommendations(8).await.is_empty());
    assert!(app.store.stored_recommendations(9).await.is_empty());
}

#[tokio::test]
async fn test_invalid_interactions_are_rejected() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/v1/interactions")
        .json(&json!({ "user_id": 7, "meal_id": 42, "action": "share" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/v1/interactions")
        .json(&json!({ "user_id": 7, "meal_id": 42, "action": "rate" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/v1/interactions")
        .json(&json!({ "user_id": 7, "meal_id": 999, "action": "like" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_parse_disease_history() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/v1/llm/parse-disease-history")
        .json(&json!({ "history": "Diagnosed with diabetes and hypertension in 2019" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["diseases"], json!(["Diabetes", "Hypertension"]));
    assert_eq!(body["recommended_diet"], "DASH, Low_Sugar");

    let response = app
        .server
        .post("/api/v1/llm/parse-disease-history")
        .json(&json!({ "history": "Routine checkup, nothing notable" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "No diseases detected");
}

#[tokio::test]
async fn test_disease_history_updates_profile() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/v1/users/9/disease-history")
        .json(&json!({ "history": "Recent bloodwork shows anemia" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["user"]["disease"], "Anemia");
    assert_eq!(body["user"]["diet"], "Iron_Rich");
    assert_eq!(body["recommendations"]["recommendations"][0]["meal_id"], 2);
    assert_eq!(body["propagation_queued"], true);

    app.workers.shutdown().await;
    for peer in [7, 8, 9] {
        assert!(!app.store.stored_recommendations(peer).await.is_empty());
    }
}

#[tokio::test]
async fn test_disease_history_updates_height_and_weight() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/v1/users/9/disease-history")
        .json(&json!({ "history": "Diagnosed with hypertension", "height": 181.0, "weight": 77.5 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["height"], 181.0);
    assert_eq!(body["user"]["weight"], 77.5);

    // Omitted measurements keep their stored values
    let response = app
        .server
        .post("/api/v1/users/9/disease-history")
        .json(&json!({ "history": "Diagnosed with hypertension", "weight": 79.0 }))
        .await;
    response.assert_status_ok();
    let stored = app.store.find_user(9).await.unwrap().unwrap();
    assert_eq!(stored.height, Some(181.0));
    assert_eq!(stored.weight, Some(79.0));

    let response = app
        .server
        .post("/api/v1/users/9/disease-history")
        .json(&json!({ "history": "Diagnosed with hypertension", "height": 0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_query_gets_json_error() {
    let app = create_test_app().await;

    for (name, value) in [("top_n", "abc"), ("refresh", "maybe")] {
        let response = app
            .server
            .get("/api/v1/recommendations/7")
            .add_query_param(name, value)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].is_string(), "no JSON error for {}={}", name, value);
    }

    let response = app
        .server
        .post("/api/v1/recommendations/7/refresh")
        .add_query_param("top_n", "-1")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn test_malformed_json_body_gets_json_error() {
    let app = create_test_app().await;

    let response = app
        .server
        .post("/api/v1/interactions")
        .json(&json!({ "user_id": "seven", "meal_id": 42, "action": "like" }))
        .await;
    let status = response.status_code();
    assert!(status.is_client_error(), "unexpected status {}", status);
    assert!(response.json::<Value>()["error"].is_string());
}
