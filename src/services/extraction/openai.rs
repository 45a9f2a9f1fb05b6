//! OpenAI-compatible chat-completions extractor
//!
//! The prompt lists the whole vocabulary and asks for a comma-separated answer.
//! The answer is filtered through the catalog, so a chatty or hallucinating model
//! can only ever yield known labels.
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    services::{catalog::Catalog, extraction::DiseaseExtractor},
};

const EXTRACTION_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiExtractor {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    model: String,
    timeout: Duration,
    catalog: Arc<Catalog>,
    cache: Option<Cache>,
}

impl OpenAiExtractor {
    pub fn new(
        catalog: Arc<Catalog>,
        api_key: Option<String>,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            timeout,
            catalog,
            cache: None,
        }
    }

    /// Caches successful extractions in Redis
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn prompt(&self, history: &str) -> String {
        format!(
            "Extract diseases from the following medical history:\n\n{}\n\n\
             Return ONLY diseases in this list: {}.\n\
             Return diseases as a comma-separated format.",
            history,
            self.catalog.vocabulary().join(", ")
        )
    }

    fn request_body(&self, history: &str, image_url: Option<&str>) -> Value {
        let mut content = vec![json!({ "type": "text", "text": self.prompt(history) })];
        if let Some(url) = image_url {
            content.push(json!({ "type": "image_url", "image_url": { "url": url } }));
        }

        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
        })
    }

    async fn call_model(
        &self,
        api_key: &str,
        history: &str,
        image_url: Option<&str>,
    ) -> AppResult<String> {
        let url = format!("{}/v1/chat/completions", self.api_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.request_body(history, image_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Chat completions API returned status {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletion = response.json().await?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    /// One bounded model call, with the answer filtered to vocabulary labels
    async fn try_extract(&self, history: &str, image_url: Option<&str>) -> AppResult<Vec<String>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::ExternalApi("no API key configured for disease extraction".to_string())
        })?;

        let raw = tokio::time::timeout(self.timeout, self.call_model(api_key, history, image_url))
            .await
            .map_err(|_| AppError::CollaboratorTimeout(self.timeout))??;

        Ok(self.catalog.filter_labels(&raw))
    }

    /// Cache lookup under the same bound as the model call; expiry counts as a miss
    async fn cached(&self, key: &CacheKey) -> Option<Vec<String>> {
        let cache = self.cache.as_ref()?;
        match tokio::time::timeout(self.timeout, cache.get_json::<Vec<String>>(key)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Extraction cache read failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Extraction cache read timed out"
                );
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl DiseaseExtractor for OpenAiExtractor {
    async fn extract(&self, history: &str, image_url: Option<&str>) -> Vec<String> {
        if history.trim().is_empty() && image_url.is_none() {
            return Vec::new();
        }

        let key = CacheKey::disease_extraction(history, image_url);
        if let Some(hit) = self.cached(&key).await {
            tracing::debug!(%key, "Extraction cache hit");
            // The vocabulary may have changed since the entry was written
            return hit
                .iter()
                .filter_map(|label| self.catalog.canonical(label))
                .map(str::to_string)
                .collect();
        }

        match self.try_extract(history, image_url).await {
            Ok(diseases) => {
                tracing::info!(count = diseases.len(), "Diseases extracted");
                if let (Some(cache), false) = (&self.cache, diseases.is_empty()) {
                    cache.put_json(&key, &diseases, EXTRACTION_CACHE_TTL);
                }
                diseases
            }
            Err(AppError::CollaboratorTimeout(limit)) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "Disease extraction timed out");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(error = %e, extractor = self.name(), "Disease extraction failed");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
