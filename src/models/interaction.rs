use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The single interaction row for a (user, meal) pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Interaction {
    pub user_id: i64,
    pub meal_id: i64,
    pub liked: bool,
    pub purchased: bool,
    pub rated: bool,
    /// Time of the latest event applied to this row
    pub updated_at: DateTime<Utc>,
}

/// Action carried by an interaction event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionAction {
    Like,
    Dislike,
    Buy,
    /// Rating value, validated to 1..=5
    Rate(u8),
}

/// Flag changes an action applies; `None` leaves the stored flag untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionEffect {
    pub liked: Option<bool>,
    pub purchased: Option<bool>,
    pub rated: Option<bool>,
}

impl InteractionAction {
    /// Parses a wire action name and its optional rating
    pub fn parse(action: &str, rating: Option<i32>) -> Result<Self, AppError> {
        match action.trim().to_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            "buy" => Ok(Self::Buy),
            "rate" => {
                let rating = rating.ok_or_else(|| {
                    AppError::InvalidInput("action 'rate' requires a rating".to_string())
                })?;
                if !(1..=5).contains(&rating) {
                    return Err(AppError::InvalidInput(format!(
                        "rating must be between 1 and 5, got {}",
                        rating
                    )));
                }
                Ok(Self::Rate(rating as u8))
            }
            other => Err(AppError::InvalidInput(format!(
                "unknown action '{}': expected like, dislike, buy or rate",
                other
            ))),
        }
    }

    pub fn effect(&self) -> InteractionEffect {
        match self {
            Self::Like => InteractionEffect {
                liked: Some(true),
                ..Default::default()
            },
            Self::Dislike => InteractionEffect {
                liked: Some(false),
                ..Default::default()
            },
            Self::Buy => InteractionEffect {
                purchased: Some(true),
                ..Default::default()
            },
            Self::Rate(_) => InteractionEffect {
                rated: Some(true),
                ..Default::default()
            },
        }
    }
}

impl FromStr for InteractionAction {
    type Err = AppError;

    /// Parses an action that carries no rating
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

impl Display for InteractionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Dislike => write!(f, "dislike"),
            Self::Buy => write!(f, "buy"),
            Self::Rate(rating) => write!(f, "rate({})", rating),
        }
    }
}

impl Interaction {
    /// A fresh row for a pair with no prior interaction
    pub fn new(user_id: i64, meal_id: i64, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            meal_id,
            liked: false,
            purchased: false,
            rated: false,
            updated_at: at,
        }
    }

    pub fn apply(&mut self, effect: InteractionEffect, at: DateTime<Utc>) {
        if let Some(liked) = effect.liked {
            self.liked = liked;
        }
        if let Some(purchased) = effect.purchased {
            self.purchased = purchased;
        }
        if let Some(rated) = effect.rated {
            self.rated = rated;
        }
        self.updated_at = at;
    }
}
