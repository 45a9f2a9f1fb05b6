use std::collections::{BTreeSet, HashMap};

use crate::models::{Candidate, Meal, User};

use super::{RecommenderError, StrategyOutput};

/// Lowercased word tokens of at least two characters
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
}

/// TF-IDF vectorizer with smoothed idf and L2-normalised rows
#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    /// Learns the vocabulary and document frequencies of `documents`
    ///
    /// Terms are indexed in lexical order; idf is `ln((1 + n) / (1 + df)) + 1`.
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let n_docs = documents.len() as f64;

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let terms: BTreeSet<String> = tokenize(doc.as_ref()).collect();
            for term in terms {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let terms: BTreeSet<&String> = doc_freq.keys().collect();
        let vocabulary: HashMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();

        let mut idf = vec![0.0; vocabulary.len()];
        for (term, &idx) in &vocabulary {
            let df = doc_freq[term] as f64;
            idf[idx] = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
        }

        Self { vocabulary, idf }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vectorizes one document against the learned vocabulary.
    /// Unknown terms are ignored; a document with no known terms is the zero vector.
    pub fn transform(&self, document: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for term in tokenize(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                vector[idx] += 1.0;
            }
        }

        for (value, idf) in vector.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

/// Cosine similarity; zero vectors are orthogonal to everything
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Ranks catalog meals by similarity to a user's diet and disease labels
pub struct ContentScorer<'a> {
    catalog: &'a [Meal],
    vectorizer: TfIdfVectorizer,
    meal_vectors: Vec<Vec<f64>>,
}

impl<'a> ContentScorer<'a> {
    /// Fits the TF-IDF space over the whole catalog
    pub fn fit(catalog: &'a [Meal]) -> Result<Self, RecommenderError> {
        if catalog.is_empty() {
            return Err(RecommenderError::EmptyCatalog);
        }

        let documents: Vec<String> = catalog.iter().map(Meal::feature_text).collect();
        let vectorizer = TfIdfVectorizer::fit(&documents);
        let meal_vectors = documents.iter().map(|d| vectorizer.transform(d)).collect();

        Ok(Self {
            catalog,
            vectorizer,
            meal_vectors,
        })
    }

    /// Similarity of every catalog meal to the user, in catalog order
    pub fn similarities(&self, user: &User) -> Vec<f64> {
        let user_vector = self.vectorizer.transform(&user.profile_text());
        self.meal_vectors
            .iter()
            .map(|meal_vector| cosine_similarity(&user_vector, meal_vector))
            .collect()
    }

    /// Top `top_n` meals by descending similarity; ties keep catalog order
    pub fn rank(&self, user: &User, top_n: usize) -> Vec<Candidate> {
        let mut scored: Vec<(usize, f64)> = self.similarities(user).into_iter().enumerate().collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(top_n)
            .map(|(idx, _)| Candidate::Full(self.catalog[idx].clone()))
            .collect()
    }
}

/// Content-based strategy entry point
pub fn recommend(user: &User, catalog: &[Meal], top_n: usize) -> StrategyOutput {
    let scorer = ContentScorer::fit(catalog)?;
    tracing::debug!(
        user_id = user.user_id,
        vocabulary = scorer.vectorizer.vocabulary_size(),
        "Scoring meals by content similarity"
    );
    Ok(scorer.rank(user, top_n))
}
