use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LockPoisoned;
use crate::models::{Review, SentimentScore};

#[derive(Debug, Clone)]
struct StoredReview {
    review: Review,
    processed: bool,
}

/// In-memory review store. Reviews are immutable once stored; only the
/// processed flag changes.
#[derive(Default)]
pub struct ReviewStore {
    reviews: RwLock<BTreeMap<Uuid, StoredReview>>,
}

impl ReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a review with the same id is already stored.
    pub fn insert(&self, review: Review) -> Result<bool, LockPoisoned> {
        let mut reviews = self.reviews.write().map_err(|_| LockPoisoned)?;
        if reviews.contains_key(&review.id) {
            return Ok(false);
        }
        reviews.insert(
            review.id,
            StoredReview {
                review,
                processed: false,
            },
        );
        Ok(true)
    }

    /// Oldest unprocessed reviews first.
    pub fn unprocessed(&self, limit: usize) -> Result<Vec<Review>, LockPoisoned> {
        let reviews = self.reviews.read().map_err(|_| LockPoisoned)?;
        let mut pending: Vec<Review> = reviews
            .values()
            .filter(|stored| !stored.processed)
            .map(|stored| stored.review.clone())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    pub fn mark_processed(&self, id: &Uuid) -> Result<(), LockPoisoned> {
        let mut reviews = self.reviews.write().map_err(|_| LockPoisoned)?;
        if let Some(stored) = reviews.get_mut(id) {
            stored.processed = true;
        }
        Ok(())
    }

    pub fn is_processed(&self, id: &Uuid) -> Result<bool, LockPoisoned> {
        let reviews = self.reviews.read().map_err(|_| LockPoisoned)?;
        Ok(reviews.get(id).is_some_and(|stored| stored.processed))
    }

    /// Reviews for a facility within `[start, end]`, oldest first.
    pub fn for_facility(
        &self,
        facility_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Review>, LockPoisoned> {
        let reviews = self.reviews.read().map_err(|_| LockPoisoned)?;
        let mut matching: Vec<Review> = reviews
            .values()
            .map(|stored| &stored.review)
            .filter(|review| {
                review.facility_id == facility_id
                    && review.created_at >= start
                    && review.created_at <= end
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    pub fn len(&self) -> Result<usize, LockPoisoned> {
        Ok(self.reviews.read().map_err(|_| LockPoisoned)?.len())
    }

    /// Mean rating across every stored review, 0 when empty.
    pub fn average_rating(&self) -> Result<f64, LockPoisoned> {
        let reviews = self.reviews.read().map_err(|_| LockPoisoned)?;
        if reviews.is_empty() {
            return Ok(0.0);
        }
        let total: u32 = reviews.values().map(|stored| stored.review.rating as u32).sum();
        Ok(total as f64 / reviews.len() as f64)
    }
}

/// Latest score per review id.
#[derive(Default)]
pub struct ScoreStore {
    scores: RwLock<HashMap<Uuid, SentimentScore>>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, review_id: Uuid, score: SentimentScore) -> Result<(), LockPoisoned> {
        self.scores
            .write()
            .map_err(|_| LockPoisoned)?
            .insert(review_id, score);
        Ok(())
    }

    pub fn get(&self, review_id: &Uuid) -> Result<Option<SentimentScore>, LockPoisoned> {
        Ok(self
            .scores
            .read()
            .map_err(|_| LockPoisoned)?
            .get(review_id)
            .cloned())
    }

    pub fn len(&self) -> Result<usize, LockPoisoned> {
        Ok(self.scores.read().map_err(|_| LockPoisoned)?.len())
    }
}
