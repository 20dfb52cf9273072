//! crates/lesson_review_core/src/review.rs
//!
//! Applies learner responses to review cards and assembles the set of due reviews.

use crate::domain::{
    DueReview, QuestionResponse, QuizSession, ReviewCard, SessionSummary, OPTION_COUNT,
};
use crate::ports::{DatabaseService, PortError};
use crate::scheduler::{apply_to_card, LatencyQualityModel, QualityModel, SchedulerConfig};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Question {0} does not exist")]
    InvalidQuestion(Uuid),
    #[error("Option {selected} is out of range for question {question_id}")]
    InvalidOption { question_id: Uuid, selected: usize },
    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

type CardKey = (Uuid, Uuid);

/// One async mutex per (owner, question) so read-modify-write cycles on the same
/// card never interleave. Different cards proceed independently.
#[derive(Default)]
struct CardLocks {
    locks: Mutex<HashMap<CardKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl CardLocks {
    fn lock_for(&self, key: CardKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries nobody else holds can go.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key).or_default().clone()
    }
}

pub struct ReviewService {
    store: Arc<dyn DatabaseService>,
    quality_model: Arc<dyn QualityModel>,
    config: SchedulerConfig,
    locks: CardLocks,
}

impl ReviewService {
    pub fn new(
        store: Arc<dyn DatabaseService>,
        quality_model: Arc<dyn QualityModel>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            quality_model,
            config,
            locks: CardLocks::default(),
        }
    }

    /// A service using the latency heuristic and default scheduler settings.
    pub fn with_defaults(store: Arc<dyn DatabaseService>) -> Self {
        Self::new(
            store,
            Arc::new(LatencyQualityModel::default()),
            SchedulerConfig::default(),
        )
    }

    /// Updates (or lazily creates) the learner's card for the answered question.
    /// Questions of removed videos are rejected like unknown ones.
    pub async fn record_response(
        &self,
        owner_id: Uuid,
        response: &QuestionResponse,
        now: DateTime<Utc>,
    ) -> Result<ReviewCard, ReviewError> {
        if let Some(selected) = response.selected_option.filter(|&i| i >= OPTION_COUNT) {
            return Err(ReviewError::InvalidOption {
                question_id: response.question_id,
                selected,
            });
        }

        let lock = self.locks.lock_for((owner_id, response.question_id));
        let _guard = lock.lock().await;

        let question = self
            .store
            .get_question(response.question_id)
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => ReviewError::InvalidQuestion(response.question_id),
                other => ReviewError::Store(other),
            })?;

        let existing = self
            .store
            .find_review_card(owner_id, question.id)
            .await?;
        let quality = self.quality_model.quality(response);
        let card = apply_to_card(
            existing.as_ref(),
            owner_id,
            response.question_id,
            quality,
            now,
            &self.config,
        );
        debug!(
            question_id = %card.question_id,
            quality = quality.value(),
            interval_days = card.interval_days,
            "Rescheduled review card"
        );

        Ok(self.store.upsert_review_card(card).await?)
    }

    /// Applies every response in the session and caches the derived summary.
    pub async fn complete_session(
        &self,
        session: &QuizSession,
        now: DateTime<Utc>,
    ) -> Result<SessionSummary, ReviewError> {
        for response in &session.responses {
            self.record_response(session.owner_id, response, now).await?;
        }

        let summary = SessionSummary::from_session(session, now);
        self.store.save_session_summary(summary.clone()).await?;
        info!(
            session_id = %summary.session_id,
            answered = summary.answered,
            score = summary.score_percent,
            "Quiz session completed"
        );
        Ok(summary)
    }

    /// Every card due at `now`, most overdue first. Capping the session size is
    /// left to the caller.
    pub async fn due_reviews(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueReview>, ReviewError> {
        let mut due: Vec<DueReview> = self
            .store
            .find_due_cards(owner_id, now)
            .await?
            .into_iter()
            .filter(|review| review.card.owner_id == owner_id && review.card.is_due(now))
            .collect();
        due.sort_by(|a, b| {
            a.card
                .next_review_at
                .cmp(&b.card.next_review_at)
                .then_with(|| a.card.question_id.cmp(&b.card.question_id))
        });
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_locks_are_shared_per_key_and_pruned() {
        let locks = CardLocks::default();
        let key = (Uuid::new_v4(), Uuid::new_v4());

        let first = locks.lock_for(key);
        let second = locks.lock_for(key);
        assert!(Arc::ptr_eq(&first, &second));

        drop(first);
        drop(second);
        let _other = locks.lock_for((Uuid::new_v4(), Uuid::new_v4()));
        assert_eq!(locks.locks.lock().unwrap().len(), 1);
    }
}
