//! Post-quiz rating.
//!
//! One rating may be submitted per completed attempt. While a submission is
//! pending or after it succeeded, further submissions are rejected; a failed
//! submission opens the rating again.

use serde::{Deserialize, Serialize};

use crate::error::{DictError, Result};

/// Lowest accepted rating.
pub const MIN_RATING: u8 = 1;

/// Highest accepted rating.
pub const MAX_RATING: u8 = 5;

/// How the rating choices are presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingScale {
    /// One to five stars.
    #[default]
    Stars,
    /// Five faces from unhappy to delighted.
    Emoji,
}

impl RatingScale {
    /// Symbol shown for a rating on this scale.
    #[must_use]
    pub const fn symbol(&self, rating: u8) -> &'static str {
        match (self, rating) {
            (Self::Stars, 1) => "★☆☆☆☆",
            (Self::Stars, 2) => "★★☆☆☆",
            (Self::Stars, 3) => "★★★☆☆",
            (Self::Stars, 4) => "★★★★☆",
            (Self::Stars, 5) => "★★★★★",
            (Self::Emoji, 1) => "😞",
            (Self::Emoji, 2) => "😕",
            (Self::Emoji, 3) => "😐",
            (Self::Emoji, 4) => "🙂",
            (Self::Emoji, 5) => "😍",
            _ => "?",
        }
    }
}

/// Checks that a rating is within 1..=5.
pub fn validate_rating(rating: u8) -> Result<u8> {
    if rating >= MIN_RATING && rating <= MAX_RATING {
        Ok(rating)
    } else {
        Err(DictError::InvalidRating { rating })
    }
}

/// Where the rating of the current attempt stands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RatingState {
    /// The attempt is not completed yet.
    #[default]
    Unavailable,
    /// The user may rate.
    Open,
    /// A submission is in flight.
    Pending {
        /// The submitted rating.
        rating: u8,
    },
    /// The rating was stored.
    Submitted {
        /// The stored rating.
        rating: u8,
    },
    /// The last submission failed; the user may rate again.
    Failed {
        /// The rating that failed to store.
        rating: u8,
        /// Why it failed.
        message: String,
    },
}

impl RatingState {
    /// Returns `true` if a new submission is accepted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::Failed { .. })
    }

    /// Moves to `Pending` for a new submission.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::RatingAlreadySubmitted`] if a submission is
    /// pending or stored, and `InvalidTransition` before completion.
    pub fn begin(&mut self, rating: u8) -> Result<()> {
        let rating = validate_rating(rating)?;
        match self {
            Self::Open | Self::Failed { .. } => {
                *self = Self::Pending { rating };
                Ok(())
            }
            Self::Pending { .. } | Self::Submitted { .. } => Err(DictError::RatingAlreadySubmitted),
            Self::Unavailable => Err(DictError::invalid_transition("in_progress", "rated")),
        }
    }

    /// Records a successful submission. Ignored unless pending.
    pub fn succeed(&mut self) -> bool {
        if let Self::Pending { rating } = *self {
            *self = Self::Submitted { rating };
            true
        } else {
            false
        }
    }

    /// Records a failed submission and re-opens the rating. Ignored unless pending.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if let Self::Pending { rating } = *self {
            *self = Self::Failed {
                rating,
                message: message.into(),
            };
            true
        } else {
            false
        }
    }
}
