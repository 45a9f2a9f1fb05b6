use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

pub const NO_DIET_RECOMMENDATION: &str = "No specific diet recommendation available.";

#[derive(Debug, Clone, Deserialize)]
struct DietMapping {
    disease: String,
    diet: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    vocabulary: Vec<String>,
    diet_map: Vec<DietMapping>,
}

/// Disease vocabulary and disease → diet table
///
/// Loaded once at startup and shared read-only for the life of the process.
#[derive(Debug, Clone)]
pub struct Catalog {
    vocabulary: Vec<String>,
    canonical: HashMap<String, String>,
    diet_map: Vec<DietMapping>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog file {}", path.display()))?;
        let catalog = Self::from_json(&raw)
            .with_context(|| format!("parse catalog file {}", path.display()))?;

        tracing::info!(
            vocabulary = catalog.vocabulary.len(),
            diet_rows = catalog.diet_map.len(),
            "Loaded disease catalog"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.vocabulary, file.diet_map.into_iter().map(|m| (m.disease, m.diet))))
    }

    pub fn new(
        vocabulary: impl IntoIterator<Item = String>,
        diet_map: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let vocabulary: Vec<String> = vocabulary
            .into_iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty() && seen.insert(label.to_lowercase()))
            .collect();
        let canonical = vocabulary
            .iter()
            .map(|label| (label.to_lowercase(), label.clone()))
            .collect();
        let diet_map = diet_map
            .into_iter()
            .map(|(disease, diet)| DietMapping { disease, diet })
            .collect();

        Self {
            vocabulary,
            canonical,
            diet_map,
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Vocabulary spelling of `label`, matched case-insensitively
    pub fn canonical(&self, label: &str) -> Option<&str> {
        self.canonical
            .get(&label.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Parses comma- or newline-separated model output into vocabulary labels
    ///
    /// Anything outside the vocabulary is discarded; duplicates collapse.
    pub fn filter_labels(&self, raw: &str) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for piece in raw.split([',', '\n', ';']) {
            let piece = piece.trim().trim_matches(|c: char| c == '.' || c == '"' || c == '-');
            if let Some(label) = self.canonical(piece) {
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
        }
        labels
    }

    /// Diet recommendation for a set of diseases
    ///
    /// Every table row whose disease column contains one of the labels
    /// (case-insensitive) contributes its diet. Distinct diets are joined with ", ".
    pub fn recommend_diet(&self, diseases: &[String]) -> String {
        let mut diets = BTreeSet::new();
        for disease in diseases {
            let needle = disease.trim().to_lowercase();
            if needle.is_empty() {
                continue;
            }
            diets.extend(
                self.diet_map
                    .iter()
                    .filter(|row| row.disease.to_lowercase().contains(&needle))
                    .map(|row| row.diet.clone()),
            );
        }

        if diets.is_empty() {
            NO_DIET_RECOMMENDATION.to_string()
        } else {
            diets.into_iter().collect::<Vec<_>>().join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json(
            r#"{
                "vocabulary": ["Diabetes", "Hypertension", "Anemia", "diabetes"],
                "diet_map": [
                    {"disease": "Diabetes", "diet": "Low_Sugar"},
                    {"disease": "Diabetes Hypertension", "diet": "DASH"},
                    {"disease": "Anemia", "diet": "Iron_Rich"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_vocabulary_deduplicates_case_insensitively() {
        assert_eq!(catalog().vocabulary(), ["Diabetes", "Hypertension", "Anemia"]);
    }

    #[test]
    fn test_filter_labels_keeps_only_vocabulary() {
        let labels = catalog().filter_labels("diabetes, Asthma,  HYPERTENSION.\nDiabetes, ");
        assert_eq!(labels, vec!["Diabetes", "Hypertension"]);
    }

    #[test]
    fn test_filter_labels_on_garbage_is_empty() {
        assert!(catalog().filter_labels("I cannot help with that").is_empty());
        assert!(catalog().filter_labels("").is_empty());
    }

    #[test]
    fn test_recommend_diet_matches_substrings() {
        let diet = catalog().recommend_diet(&["diabetes".to_string()]);
        assert_eq!(diet, "DASH, Low_Sugar");

        let diet = catalog().recommend_diet(&["Anemia".to_string(), "Hypertension".to_string()]);
        assert_eq!(diet, "DASH, Iron_Rich");
    }

    #[test]
    fn test_recommend_diet_without_match() {
        assert_eq!(catalog().recommend_diet(&[]), NO_DIET_RECOMMENDATION);
        assert_eq!(
            catalog().recommend_diet(&["Gout".to_string()]),
            NO_DIET_RECOMMENDATION
        );
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let raw = include_str!("../../data/catalog.json");
        let catalog = Catalog::from_json(raw).unwrap();
        assert!(!catalog.vocabulary().is_empty());
        assert_ne!(
            catalog.recommend_diet(&["Diabetes".to_string()]),
            NO_DIET_RECOMMENDATION
        );
    }
}
