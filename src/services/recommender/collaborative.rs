use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{Candidate, Interaction};

use super::{RecommenderError, StrategyOutput};

/// Pearson correlation of two equal-length vectors
///
/// Zero-variance inputs and non-finite results correlate at 0, so rankings
/// never see NaN.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }

    let r = cov / (var_a * var_b).sqrt();
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Indices of `scores` sorted by descending score; ties keep index order
fn rank_descending(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

/// Distinct ids in first-seen order, at most `limit` of them
fn union_in_order(ids: impl IntoIterator<Item = i64>, limit: usize) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .take(limit)
        .collect()
}

/// User × meal matrix built from interaction rows
///
/// Rows and columns follow ascending user and meal ids. A cell holds 1.0 when the
/// user rated the meal and 0.0 otherwise, including for pairs with no row.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    users: Vec<i64>,
    meals: Vec<i64>,
    user_index: HashMap<i64, usize>,
    cells: Vec<Vec<f64>>,
    /// Meals each user interacted with, in row order
    history: Vec<Vec<i64>>,
}

impl InteractionMatrix {
    pub fn from_interactions(rows: &[Interaction]) -> Self {
        let users: Vec<i64> = rows
            .iter()
            .map(|r| r.user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let meals: Vec<i64> = rows
            .iter()
            .map(|r| r.meal_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let user_index: HashMap<i64, usize> =
            users.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let meal_index: HashMap<i64, usize> =
            meals.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut cells = vec![vec![0.0; meals.len()]; users.len()];
        let mut history: Vec<Vec<i64>> = vec![Vec::new(); users.len()];

        for row in rows {
            let u = user_index[&row.user_id];
            let m = meal_index[&row.meal_id];
            cells[u][m] = if row.rated { 1.0 } else { 0.0 };
            if !history[u].contains(&row.meal_id) {
                history[u].push(row.meal_id);
            }
        }

        Self {
            users,
            meals,
            user_index,
            cells,
            history,
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn meal_count(&self) -> usize {
        self.meals.len()
    }

    fn row_of(&self, user_id: i64) -> Result<usize, RecommenderError> {
        self.user_index
            .get(&user_id)
            .copied()
            .ok_or(RecommenderError::UserNotFound(user_id))
    }

    fn column(&self, meal_idx: usize) -> Vec<f64> {
        self.cells.iter().map(|row| row[meal_idx]).collect()
    }

    /// Correlation of the target user's row with every user row, in row order
    pub fn user_correlations(&self, user_id: i64) -> Result<Vec<f64>, RecommenderError> {
        let target = self.row_of(user_id)?;
        Ok(self
            .cells
            .iter()
            .map(|row| pearson(&self.cells[target], row))
            .collect())
    }

    /// User-based collaborative filtering
    ///
    /// Finds the `top_n` users most correlated with the target and returns up to
    /// `top_n` of the meals they interacted with, in discovery order.
    pub fn user_based(&self, user_id: i64, top_n: usize) -> StrategyOutput {
        let target = self.row_of(user_id)?;
        let correlations = self.user_correlations(user_id)?;

        let neighbours = rank_descending(&correlations)
            .into_iter()
            .filter(|&idx| idx != target)
            .take(top_n);

        let meals = neighbours.flat_map(|idx| self.history[idx].iter().copied());
        Ok(union_in_order(meals, top_n)
            .into_iter()
            .map(Candidate::ById)
            .collect())
    }

    /// Item-based collaborative filtering
    ///
    /// For every meal the target interacted with, takes its `top_n` most correlated
    /// other meals; returns up to `top_n` of their union in discovery order.
    pub fn item_based(&self, user_id: i64, top_n: usize) -> StrategyOutput {
        let target = self.row_of(user_id)?;
        let columns: Vec<Vec<f64>> = (0..self.meals.len()).map(|m| self.column(m)).collect();
        let meal_index: HashMap<i64, usize> = self
            .meals
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut discovered = Vec::new();
        for meal_id in &self.history[target] {
            let own = meal_index[meal_id];
            let correlations: Vec<f64> = columns
                .iter()
                .map(|column| pearson(&columns[own], column))
                .collect();

            discovered.extend(
                rank_descending(&correlations)
                    .into_iter()
                    .filter(|&idx| idx != own)
                    .take(top_n)
                    .map(|idx| self.meals[idx]),
            );
        }

        Ok(union_in_order(discovered, top_n)
            .into_iter()
            .map(Candidate::ById)
            .collect())
    }
}
