use serde::{Deserialize, Serialize};

/// A catalog meal, used both as a recommendation candidate and as a content-feature source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Meal {
    pub meal_id: i64,
    pub name: String,
    /// Free-text nutrient descriptor (e.g. "high_fiber low_sugar")
    pub nutrient: String,
    /// Disease(s) the meal is suited for
    pub disease: String,
    /// Diet category (e.g. "vegan", "low_sodium")
    pub diet: String,
}

/// Descriptive fields that decide whether two meal records are the same record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MealFingerprint<'a> {
    name: &'a str,
    nutrient: &'a str,
    disease: &'a str,
    diet: &'a str,
}

impl Meal {
    pub fn fingerprint(&self) -> MealFingerprint<'_> {
        MealFingerprint {
            name: &self.name,
            nutrient: &self.nutrient,
            disease: &self.disease,
            diet: &self.diet,
        }
    }

    /// Text the content scorer vectorizes for this meal
    pub fn feature_text(&self) -> String {
        format!("{} {}", self.nutrient, self.disease)
    }
}
