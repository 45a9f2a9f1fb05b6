use serde::{Deserialize, Serialize};

/// A user profile as seen by the recommender
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    /// Disease label(s) from the controlled vocabulary
    pub disease: Option<String>,
    /// Diet-preference label(s)
    pub diet: Option<String>,
}

impl User {
    /// Text the content scorer vectorizes for this user's profile.
    /// Missing labels contribute nothing.
    pub fn profile_text(&self) -> String {
        format!(
            "{} {}",
            self.diet.as_deref().unwrap_or_default(),
            self.disease.as_deref().unwrap_or_default()
        )
    }

    /// Normalized disease label used to find peers, if the user has one
    pub fn disease_label(&self) -> Option<String> {
        self.disease
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_lowercase)
    }
}

/// Profile fields written after a medical history is parsed
///
/// The labels always overwrite. `height` and `weight` overwrite only when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileChanges {
    pub disease: String,
    pub diet: String,
    pub height: Option<f64>,
    pub weight: Option<f64>,
}
