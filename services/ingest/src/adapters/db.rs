//! services/ingest/src/adapters/db.rs
//!
//! Postgres implementation of the core `DatabaseService` port. Videos are
//! written together with their questions inside one transaction, and review
//! cards are upserted on their (owner, question) key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_review_core::domain::{
    Difficulty, DueReview, NewVideo, Question, QuestionSet, ReviewCard, SessionSummary, Video,
};
use lesson_review_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Store adapter over a `sqlx` connection pool.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn to_u32(value: i32, column: &str) -> PortResult<u32> {
    u32::try_from(value).map_err(|_| PortError::Unexpected(format!("negative {}: {}", column, value)))
}

/// Postgres `INTEGER` is signed; values past `i32::MAX` are refused, not clamped.
fn to_i32<T: TryInto<i32> + Copy + std::fmt::Display>(value: T, column: &str) -> PortResult<i32> {
    value
        .try_into()
        .map_err(|_| PortError::Unexpected(format!("{} out of range: {}", column, value)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct VideoRecord {
    id: Uuid,
    owner_id: Uuid,
    external_id: String,
    title: String,
    channel_name: String,
    duration_seconds: i32,
    thumbnail_url: Option<String>,
    transcript: String,
    category: String,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}
impl VideoRecord {
    fn to_domain(self) -> PortResult<Video> {
        Ok(Video {
            id: self.id,
            owner_id: self.owner_id,
            external_id: self.external_id,
            title: self.title,
            channel_name: self.channel_name,
            duration_seconds: to_u32(self.duration_seconds, "duration_seconds")?,
            thumbnail_url: self.thumbnail_url,
            transcript: self.transcript,
            category: self.category,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    video_id: Uuid,
    question_text: String,
    options: Vec<String>,
    correct_option_index: i32,
    explanation: String,
    difficulty: String,
}
impl QuestionRecord {
    fn to_domain(self) -> PortResult<Question> {
        let option_count = self.options.len();
        let options = self.options.try_into().map_err(|_| {
            PortError::Unexpected(format!("question {} has {} options", self.id, option_count))
        })?;
        Ok(Question {
            id: self.id,
            video_id: self.video_id,
            text: self.question_text,
            options,
            correct_option_index: to_u32(self.correct_option_index, "correct_option_index")? as usize,
            explanation: self.explanation,
            difficulty: Difficulty::parse(&self.difficulty),
        })
    }
}

#[derive(FromRow)]
struct ReviewCardRecord {
    id: Uuid,
    owner_id: Uuid,
    question_id: Uuid,
    ease_factor: f64,
    repetitions: i32,
    interval_days: i32,
    last_reviewed_at: DateTime<Utc>,
    next_review_at: DateTime<Utc>,
}
impl ReviewCardRecord {
    fn to_domain(self) -> PortResult<ReviewCard> {
        Ok(ReviewCard {
            id: self.id,
            owner_id: self.owner_id,
            question_id: self.question_id,
            ease_factor: self.ease_factor,
            repetitions: to_u32(self.repetitions, "repetitions")?,
            interval_days: to_u32(self.interval_days, "interval_days")?,
            last_reviewed_at: self.last_reviewed_at,
            next_review_at: self.next_review_at,
        })
    }
}

/// One row of the due-card join.
#[derive(FromRow)]
struct DueRecord {
    #[sqlx(flatten)]
    card: ReviewCardRecord,
    video_id: Uuid,
    question_text: String,
    options: Vec<String>,
    correct_option_index: i32,
    explanation: String,
    difficulty: String,
    video_title: String,
}
impl DueRecord {
    fn to_domain(self) -> PortResult<DueReview> {
        let question = QuestionRecord {
            id: self.card.question_id,
            video_id: self.video_id,
            question_text: self.question_text,
            options: self.options,
            correct_option_index: self.correct_option_index,
            explanation: self.explanation,
            difficulty: self.difficulty,
        }
        .to_domain()?;
        Ok(DueReview {
            card: self.card.to_domain()?,
            question,
            video_title: self.video_title,
        })
    }
}

const VIDEO_COLUMNS: &str = "id, owner_id, external_id, title, channel_name, duration_seconds, \
     thumbnail_url, transcript, category, created_at, deleted_at";

const QUESTION_COLUMNS: &str =
    "id, video_id, question_text, options, correct_option_index, explanation, difficulty";

const CARD_COLUMNS: &str = "id, owner_id, question_id, ease_factor, repetitions, interval_days, \
     last_reviewed_at, next_review_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn find_video_by_external_id(
        &self,
        owner_id: Uuid,
        external_id: &str,
    ) -> PortResult<Option<Video>> {
        let record = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos WHERE owner_id = $1 AND external_id = $2 AND deleted_at IS NULL",
            VIDEO_COLUMNS
        ))
        .bind(owner_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(VideoRecord::to_domain).transpose()
    }

    async fn insert_video_with_questions(
        &self,
        video: NewVideo,
        questions: QuestionSet,
    ) -> PortResult<Video> {
        let video = video.into_video();
        let questions = questions.into_questions(video.id);
        let conflict = |e: sqlx::Error| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("video {} for owner {}", video.external_id, video.owner_id))
            } else {
                unexpected(e)
            }
        };

        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query(
            "INSERT INTO videos (id, owner_id, external_id, title, channel_name, duration_seconds, \
             thumbnail_url, transcript, category, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(video.id)
        .bind(video.owner_id)
        .bind(&video.external_id)
        .bind(&video.title)
        .bind(&video.channel_name)
        .bind(to_i32(video.duration_seconds, "duration_seconds")?)
        .bind(&video.thumbnail_url)
        .bind(&video.transcript)
        .bind(&video.category)
        .bind(video.created_at)
        .execute(&mut *tx)
        .await
        .map_err(conflict)?;

        for (position, question) in questions.iter().enumerate() {
            sqlx::query(
                "INSERT INTO questions (id, video_id, position, question_text, options, \
                 correct_option_index, explanation, difficulty) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(question.id)
            .bind(question.video_id)
            .bind(to_i32(position, "position")?)
            .bind(&question.text)
            .bind(question.options.to_vec())
            .bind(question.correct_option_index as i32)
            .bind(&question.explanation)
            .bind(question.difficulty.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        // Dropping the transaction on any early return above rolls it back.
        tx.commit().await.map_err(conflict)?;
        debug!(video_id = %video.id, questions = questions.len(), "Committed video with questions");
        Ok(video)
    }

    async fn get_questions_for_video(&self, video_id: Uuid) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE video_id = $1 ORDER BY position ASC",
            QUESTION_COLUMNS
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(QuestionRecord::to_domain).collect()
    }

    async fn soft_delete_video(&self, owner_id: Uuid, video_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE videos SET deleted_at = COALESCE(deleted_at, now()) WHERE id = $1 AND owner_id = $2",
        )
        .bind(video_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Video {} not found", video_id)));
        }
        Ok(())
    }

    async fn get_question(&self, question_id: Uuid) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            "SELECT q.id, q.video_id, q.question_text, q.options, q.correct_option_index, \
                    q.explanation, q.difficulty \
             FROM questions q \
             JOIN videos v ON v.id = q.video_id \
             WHERE q.id = $1 AND v.deleted_at IS NULL",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Question {} not found", question_id))
            }
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn find_review_card(
        &self,
        owner_id: Uuid,
        question_id: Uuid,
    ) -> PortResult<Option<ReviewCard>> {
        let record = sqlx::query_as::<_, ReviewCardRecord>(&format!(
            "SELECT {} FROM review_cards WHERE owner_id = $1 AND question_id = $2",
            CARD_COLUMNS
        ))
        .bind(owner_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        record.map(ReviewCardRecord::to_domain).transpose()
    }

    async fn upsert_review_card(&self, card: ReviewCard) -> PortResult<ReviewCard> {
        let record = sqlx::query_as::<_, ReviewCardRecord>(&format!(
            "INSERT INTO review_cards ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (owner_id, question_id) DO UPDATE SET \
                 ease_factor = EXCLUDED.ease_factor, \
                 repetitions = EXCLUDED.repetitions, \
                 interval_days = EXCLUDED.interval_days, \
                 last_reviewed_at = EXCLUDED.last_reviewed_at, \
                 next_review_at = EXCLUDED.next_review_at \
             RETURNING {cols}",
            cols = CARD_COLUMNS
        ))
        .bind(card.id)
        .bind(card.owner_id)
        .bind(card.question_id)
        .bind(card.ease_factor)
        .bind(card.repetitions as i32)
        .bind(card.interval_days as i32)
        .bind(card.last_reviewed_at)
        .bind(card.next_review_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn find_due_cards(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<DueReview>> {
        let records = sqlx::query_as::<_, DueRecord>(
            "SELECT c.id, c.owner_id, c.question_id, c.ease_factor, c.repetitions, c.interval_days, \
                    c.last_reviewed_at, c.next_review_at, \
                    q.video_id, q.question_text, q.options, q.correct_option_index, q.explanation, \
                    q.difficulty, v.title AS video_title \
             FROM review_cards c \
             JOIN questions q ON q.id = c.question_id \
             JOIN videos v ON v.id = q.video_id \
             WHERE c.owner_id = $1 AND c.next_review_at <= $2 AND v.deleted_at IS NULL \
             ORDER BY c.next_review_at ASC, c.question_id ASC",
        )
        .bind(owner_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(DueRecord::to_domain).collect()
    }

    async fn save_session_summary(&self, summary: SessionSummary) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO quiz_summaries (session_id, owner_id, video_id, answered, correct, \
             score_percent, completed_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(summary.session_id)
        .bind(summary.owner_id)
        .bind(summary.video_id)
        .bind(summary.answered as i32)
        .bind(summary.correct as i32)
        .bind(summary.score_percent as i32)
        .bind(summary.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("Session {} already summarized", summary.session_id))
            } else {
                unexpected(e)
            }
        })?;
        Ok(())
    }
}
