//! crates/lesson_review_core/src/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Used by tests and
//! by local runs that do not need Postgres.

use crate::domain::{DueReview, NewVideo, Question, QuestionSet, ReviewCard, SessionSummary, Video};
use crate::ports::{DatabaseService, PortError, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    videos: HashMap<Uuid, Video>,
    /// Insertion order is generation order.
    questions: Vec<Question>,
    cards: HashMap<(Uuid, Uuid), ReviewCard>,
    summaries: Vec<SessionSummary>,
}

/// All tables live behind one mutex, so every operation is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of stored videos, including soft-deleted ones.
    pub fn video_count(&self) -> usize {
        self.tables().videos.len()
    }

    pub fn question_count(&self) -> usize {
        self.tables().questions.len()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.tables().summaries.clone()
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn find_video_by_external_id(
        &self,
        owner_id: Uuid,
        external_id: &str,
    ) -> PortResult<Option<Video>> {
        Ok(self
            .tables()
            .videos
            .values()
            .find(|v| {
                v.owner_id == owner_id && v.external_id == external_id && v.deleted_at.is_none()
            })
            .cloned())
    }

    async fn insert_video_with_questions(
        &self,
        video: NewVideo,
        questions: QuestionSet,
    ) -> PortResult<Video> {
        let mut tables = self.tables();
        let duplicate = tables.videos.values().any(|v| {
            v.owner_id == video.owner_id
                && v.external_id == video.external_id
                && v.deleted_at.is_none()
        });
        if duplicate {
            return Err(PortError::Conflict(format!(
                "video {} for owner {}",
                video.external_id, video.owner_id
            )));
        }

        let video = video.into_video();
        tables.questions.extend(questions.into_questions(video.id));
        tables.videos.insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_questions_for_video(&self, video_id: Uuid) -> PortResult<Vec<Question>> {
        Ok(self
            .tables()
            .questions
            .iter()
            .filter(|q| q.video_id == video_id)
            .cloned()
            .collect())
    }

    async fn soft_delete_video(&self, owner_id: Uuid, video_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables();
        match tables.videos.get_mut(&video_id) {
            Some(video) if video.owner_id == owner_id => {
                video.deleted_at.get_or_insert_with(Utc::now);
                Ok(())
            }
            _ => Err(PortError::NotFound(format!("Video {} not found", video_id))),
        }
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        let tables = self.tables();
        tables
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .filter(|q| {
                tables
                    .videos
                    .get(&q.video_id)
                    .is_some_and(|v| v.deleted_at.is_none())
            })
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Question {} not found", question_id)))
    }

    async fn find_review_card(
        &self,
        owner_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<ReviewCard>> {
        Ok(self.tables().cards.get(&(owner_id, question_id)).cloned())
    }

    async fn upsert_review_card(&self, card: ReviewCard) -> PortResult<ReviewCard> {
        let mut tables = self.tables();
        let stored = tables
            .cards
            .entry((card.owner_id, card.question_id))
            .and_modify(|existing| {
                let id = existing.id;
                *existing = ReviewCard { id, ..card.clone() };
            })
            .or_insert_with(|| card.clone());
        Ok(stored.clone())
    }

    async fn find_due_cards(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<DueReview>> {
        let tables = self.tables();
        let due = tables
            .cards
            .values()
            .filter(|card| card.owner_id == owner_id && card.is_due(now))
            .filter_map(|card| {
                let question = tables.questions.iter().find(|q| q.id == card.question_id)?;
                let video = tables.videos.get(&question.video_id)?;
                if video.deleted_at.is_some() {
                    return None;
                }
                Some(DueReview {
                    card: card.clone(),
                    question: question.clone(),
                    video_title: video.title.clone(),
                })
            })
            .collect();
        Ok(due)
    }

    async fn save_session_summary(&self, summary: SessionSummary) -> PortResult<()> {
        self.tables().summaries.push(summary);
        Ok(())
    }
}
