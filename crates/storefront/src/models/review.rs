//! Product reviews and their aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marketstall_core::{ProductId, ReviewId, UserId};

use crate::db::{Entity, Kind};

/// Ratings run from 1 to 5 inclusive.
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub author_name: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Review {
    const KIND: Kind = Kind::Review;

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }
}

/// Aggregate of a product's reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub count: usize,
    /// Mean rating rounded to two decimals, absent with no reviews.
    pub average: Option<f64>,
    /// Number of reviews per star, index 0 is one star.
    pub histogram: [usize; 5],
}

impl ReviewSummary {
    #[must_use]
    pub fn from_reviews(reviews: &[Review]) -> Self {
        let mut histogram = [0_usize; 5];
        let mut total = 0_u64;
        for review in reviews {
            let stars = review.rating.clamp(1, 5);
            if let Some(bucket) = histogram.get_mut(usize::from(stars - 1)) {
                *bucket += 1;
            }
            total += u64::from(stars);
        }

        let count = reviews.len();
        #[allow(clippy::cast_precision_loss)]
        let average = (count > 0).then(|| {
            let mean = total as f64 / count as f64;
            (mean * 100.0).round() / 100.0
        });

        Self {
            count,
            average,
            histogram,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn review(rating: u8) -> Review {
        Review {
            id: ReviewId::generate(),
            product_id: ProductId::generate(),
            user_id: UserId::generate(),
            author_name: "R".to_owned(),
            rating,
            comment: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = ReviewSummary::from_reviews(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, None);
        assert_eq!(summary.histogram, [0; 5]);
    }

    #[test]
    fn test_summary_average_and_histogram() {
        let summary = ReviewSummary::from_reviews(&[review(5), review(4), review(4)]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.average, Some(4.33));
        assert_eq!(summary.histogram, [0, 0, 0, 2, 1]);
    }
}
