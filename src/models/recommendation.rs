use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Meal;

/// The strategy that produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Content,
    UserBased,
    ItemBased,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Content => write!(f, "content"),
            Strategy::UserBased => write!(f, "user_based"),
            Strategy::ItemBased => write!(f, "item_based"),
        }
    }
}

/// A recommendation candidate, either a bare id or a hydrated record
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    ById(i64),
    Full(Meal),
}

/// A deduplicated meal produced by fusion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedMeal {
    #[serde(flatten)]
    pub meal: Meal,
    /// Every strategy that proposed this meal, in fusion order
    pub strategies: Vec<Strategy>,
}

impl FusedMeal {
    /// Stored reason, e.g. "content+item_based"
    pub fn reason(&self) -> String {
        self.strategies
            .iter()
            .map(Strategy::to_string)
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// A cache entry as persisted by the store, joined with its meal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecommendation {
    pub user_id: i64,
    #[serde(flatten)]
    pub meal: Meal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// An entry to write on replace
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecommendation {
    pub meal_id: i64,
    pub reason: String,
}

impl From<&FusedMeal> for NewRecommendation {
    fn from(fused: &FusedMeal) -> Self {
        Self {
            meal_id: fused.meal.meal_id,
            reason: fused.reason(),
        }
    }
}

/// One recommended meal as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedMeal {
    #[serde(flatten)]
    pub meal: Meal,
    pub reason: String,
}

impl From<FusedMeal> for RecommendedMeal {
    fn from(fused: FusedMeal) -> Self {
        let reason = fused.reason();
        Self {
            meal: fused.meal,
            reason,
        }
    }
}

impl From<StoredRecommendation> for RecommendedMeal {
    fn from(stored: StoredRecommendation) -> Self {
        Self {
            meal: stored.meal,
            reason: stored.reason,
        }
    }
}

/// Where a recommendation set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Cache,
    Computed,
}

/// Response body for recommendation reads and refreshes
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationSet {
    pub user_id: i64,
    pub source: RecommendationSource,
    /// False when a freshly computed set could not be written back
    pub persisted: bool,
    pub recommendations: Vec<RecommendedMeal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub const NO_RECOMMENDATIONS_MESSAGE: &str = "No recommendations available";

impl RecommendationSet {
    pub fn new(
        user_id: i64,
        source: RecommendationSource,
        persisted: bool,
        recommendations: Vec<RecommendedMeal>,
    ) -> Self {
        let message = recommendations
            .is_empty()
            .then(|| NO_RECOMMENDATIONS_MESSAGE.to_string());
        Self {
            user_id,
            source,
            persisted,
            recommendations,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meal() -> Meal {
        Meal {
            meal_id: 42,
            name: "Lentil Soup".to_string(),
            nutrient: "high_protein".to_string(),
            disease: "Anemia".to_string(),
            diet: "vegetarian".to_string(),
        }
    }

    #[test]
    fn test_reason_joins_strategies() {
        let fused = FusedMeal {
            meal: meal(),
            strategies: vec![Strategy::Content, Strategy::ItemBased],
        };
        assert_eq!(fused.reason(), "content+item_based");
    }

    #[test]
    fn test_recommended_meal_serializes_flat() {
        let recommended = RecommendedMeal {
            meal: meal(),
            reason: "content".to_string(),
        };
        let json = serde_json::to_value(&recommended).unwrap();
        assert_eq!(json["meal_id"], 42);
        assert_eq!(json["name"], "Lentil Soup");
        assert_eq!(json["reason"], "content");
    }

    #[test]
    fn test_empty_set_carries_message() {
        let set = RecommendationSet::new(7, RecommendationSource::Computed, true, vec![]);
        assert_eq!(set.message.as_deref(), Some(NO_RECOMMENDATIONS_MESSAGE));

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["source"], "computed");
    }
}
