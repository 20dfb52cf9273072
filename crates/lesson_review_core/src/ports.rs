//! crates/lesson_review_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{
    DueReview, GeneratedQuestion, NewVideo, Question, QuestionSet, ReviewCard, SessionSummary,
    Video, VideoMetadata,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting item already exists: {0}")]
    Conflict(String),
    #[error("Rate limited by upstream service: {0}")]
    RateLimited(String),
    #[error("Upstream service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Rate-limit and overload signals are transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::RateLimited(_) | PortError::Unavailable(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Video Library ---
    /// Looks up a live (not soft-deleted) video by its platform id.
    async fn find_video_by_external_id(
        &self,
        owner_id: Uuid,
        external_id: &str,
    ) -> PortResult<Option<Video>>;

    /// Writes the video and all of its questions atomically.
    ///
    /// Returns `PortError::Conflict` if the owner already has a live video with
    /// the same external id.
    async fn insert_video_with_questions(
        &self,
        video: NewVideo,
        questions: QuestionSet,
    ) -> PortResult<Video>;

    /// Questions in the order they were generated.
    async fn get_questions_for_video(&self, video_id: Uuid) -> PortResult<Vec<Question>>;

    async fn soft_delete_video(&self, owner_id: Uuid, video_id: Uuid) -> PortResult<()>;

    // --- Review State ---
    /// `NotFound` also covers questions whose video has been soft-deleted.
    async fn get_question(&self, question_id: Uuid) -> PortResult<Question>;

    async fn find_review_card(
        &self,
        owner_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<ReviewCard>>;

    async fn upsert_review_card(&self, card: ReviewCard) -> PortResult<ReviewCard>;

    /// All cards of `owner_id` with `next_review_at <= now` whose video is live.
    async fn find_due_cards(&self, owner_id: Uuid, now: DateTime<Utc>)
        -> PortResult<Vec<DueReview>>;

    async fn save_session_summary(&self, summary: SessionSummary) -> PortResult<()>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetches title, channel, duration and thumbnail for a video id.
    async fn get_metadata(&self, external_id: &str) -> PortResult<VideoMetadata>;
}

#[async_trait]
pub trait TranscriptStrategy: Send + Sync {
    /// A short label used in logs and exhaustion reports.
    fn name(&self) -> &str;

    /// Returns raw caption text for the video.
    async fn fetch(&self, external_id: &str) -> PortResult<String>;
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Generates up to `target_count` multiple-choice questions from shaped content.
    async fn generate(
        &self,
        title: &str,
        shaped_content: &str,
        category: &str,
        target_count: usize,
    ) -> PortResult<Vec<GeneratedQuestion>>;
}
