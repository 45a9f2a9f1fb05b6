use std::collections::HashMap;

use crate::models::{Candidate, FusedMeal, Meal, MealFingerprint, Strategy};

use super::{RecommenderError, StrategyOutput};

/// Outcome of merging the three strategies
#[derive(Debug, Clone, PartialEq)]
pub enum FusionResult {
    Meals(Vec<FusedMeal>),
    /// Every strategy failed or came back empty
    NoRecommendations,
}

impl FusionResult {
    pub fn into_meals(self) -> Vec<FusedMeal> {
        match self {
            FusionResult::Meals(meals) => meals,
            FusionResult::NoRecommendations => Vec::new(),
        }
    }
}

fn log_degraded(strategy: Strategy, error: &RecommenderError) {
    match error {
        RecommenderError::UserNotFound(_) => {
            tracing::debug!(%strategy, error = %error, "Strategy has no signal for user")
        }
        RecommenderError::EmptyCatalog => {
            tracing::warn!(%strategy, error = %error, "Strategy degraded")
        }
    }
}

/// Resolves candidates to full records, dropping ids missing from the catalog
fn hydrate(
    strategy: Strategy,
    candidates: Vec<Candidate>,
    catalog: &HashMap<i64, &Meal>,
) -> Vec<(Strategy, Meal)> {
    candidates
        .into_iter()
        .filter_map(|candidate| match candidate {
            Candidate::Full(meal) => Some(meal),
            Candidate::ById(meal_id) => match catalog.get(&meal_id) {
                Some(meal) => Some((*meal).clone()),
                None => {
                    tracing::debug!(%strategy, meal_id, "Dropping candidate missing from catalog");
                    None
                }
            },
        })
        .map(|meal| (strategy, meal))
        .collect()
}

/// Merges content, user-based and item-based candidates into one deduplicated list
///
/// Failed strategies are skipped. Bare ids are hydrated against `catalog` before
/// deduplication, and records with the same (name, nutrient, disease, diet) collapse
/// into one entry that remembers every strategy that proposed it. Output follows
/// first-seen order.
pub fn fuse(
    catalog: &[Meal],
    content: StrategyOutput,
    user_based: StrategyOutput,
    item_based: StrategyOutput,
) -> FusionResult {
    let by_id: HashMap<i64, &Meal> = catalog.iter().map(|m| (m.meal_id, m)).collect();

    let hydrated: Vec<(Strategy, Meal)> = [
        (Strategy::Content, content),
        (Strategy::UserBased, user_based),
        (Strategy::ItemBased, item_based),
    ]
    .into_iter()
    .filter_map(|(strategy, output)| match output {
        Ok(candidates) => Some(hydrate(strategy, candidates, &by_id)),
        Err(e) => {
            log_degraded(strategy, &e);
            None
        }
    })
    .flatten()
    .collect();

    let mut positions: HashMap<MealFingerprint<'_>, usize> = HashMap::new();
    let mut fused: Vec<FusedMeal> = Vec::new();

    for (strategy, meal) in &hydrated {
        match positions.get(&meal.fingerprint()) {
            Some(&idx) => {
                let entry = &mut fused[idx];
                if !entry.strategies.contains(strategy) {
                    entry.strategies.push(*strategy);
                }
            }
            None => {
                positions.insert(meal.fingerprint(), fused.len());
                fused.push(FusedMeal {
                    meal: meal.clone(),
                    strategies: vec![*strategy],
                });
            }
        }
    }

    if fused.is_empty() {
        FusionResult::NoRecommendations
    } else {
        FusionResult::Meals(fused)
    }
}
