//! Domain records shared by the store, the recommender and the HTTP layer.

pub mod interaction;
pub mod meal;
pub mod recommendation;
pub mod user;

pub use interaction::{Interaction, InteractionAction, InteractionEffect};
pub use meal::{Meal, MealFingerprint};
pub use recommendation::{
    Candidate, FusedMeal, NewRecommendation, RecommendationSet, RecommendationSource,
    RecommendedMeal, Strategy, StoredRecommendation, NO_RECOMMENDATIONS_MESSAGE,
};
pub use user::{ProfileChanges, User};
