//! Disease extraction collaborators
//!
//! An extractor turns a free-text medical history (and optionally an image of a
//! report) into disease labels from the controlled vocabulary. Extraction never
//! fails from the caller's point of view: timeouts, transport errors and
//! unparseable model output all come back as an empty list.
pub mod openai;

pub use openai::OpenAiExtractor;

#[async_trait::async_trait]
pub trait DiseaseExtractor: Send + Sync {
    /// Recognized disease labels, drawn only from the vocabulary
    async fn extract(&self, history: &str, image_url: Option<&str>) -> Vec<String>;

    /// Extractor name for logging and debugging
    fn name(&self) -> &'static str;
}
