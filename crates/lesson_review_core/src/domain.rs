//! crates/lesson_review_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or wire format.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Ingestion Types
//=========================================================================================

/// Metadata reported by the video platform for a single video.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub channel_name: String,
    pub duration_seconds: u32,
    pub thumbnail_url: Option<String>,
}

/// A video identified for possible ingestion. Never persisted until accepted.
#[derive(Debug, Clone)]
pub struct CandidateVideo {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub channel_name: String,
    pub duration_seconds: u32,
    pub thumbnail_url: Option<String>,
}

impl CandidateVideo {
    pub fn from_metadata(external_id: impl Into<String>, metadata: VideoMetadata) -> Self {
        Self {
            external_id: external_id.into(),
            title: metadata.title,
            description: metadata.description,
            channel_name: metadata.channel_name,
            duration_seconds: metadata.duration_seconds,
            thumbnail_url: metadata.thumbnail_url,
        }
    }
}

/// A persisted, accepted video. Immutable except for soft deletion.
#[derive(Debug, Clone, Serialize)]
pub struct Video {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub external_id: String,
    pub title: String,
    pub channel_name: String,
    pub duration_seconds: u32,
    pub thumbnail_url: Option<String>,
    pub transcript: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The video row handed to the store together with its questions.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub external_id: String,
    pub title: String,
    pub channel_name: String,
    pub duration_seconds: u32,
    pub thumbnail_url: Option<String>,
    pub transcript: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl NewVideo {
    pub fn into_video(self) -> Video {
        Video {
            id: self.id,
            owner_id: self.owner_id,
            external_id: self.external_id,
            title: self.title,
            channel_name: self.channel_name,
            duration_seconds: self.duration_seconds,
            thumbnail_url: self.thumbnail_url,
            transcript: self.transcript,
            category: self.category,
            created_at: self.created_at,
            deleted_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Lenient parse used for generator output and database rows.
    /// Unknown labels fall back to `Medium`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" => Difficulty::Easy,
            "hard" | "advanced" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of answer options on every multiple-choice question.
pub const OPTION_COUNT: usize = 4;

/// A question exactly as returned by the question-generation service, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub explanation: String,
    pub difficulty: Difficulty,
}

/// A persisted multiple-choice question, owned by exactly one video.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub video_id: Uuid,
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub correct_option_index: usize,
    pub explanation: String,
    pub difficulty: Difficulty,
}

/// A validated question that has not yet been attached to a video.
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub correct_option_index: usize,
    pub explanation: String,
    pub difficulty: Difficulty,
}

impl QuestionDraft {
    /// Validates a generated question. Returns `None` when the question is unusable:
    /// blank text, not exactly four non-blank options, or an out-of-range answer.
    pub fn from_generated(generated: GeneratedQuestion) -> Option<Self> {
        let text = generated.text.trim().to_string();
        if text.is_empty() || generated.correct_option_index >= OPTION_COUNT {
            return None;
        }
        let options: Vec<String> = generated
            .options
            .into_iter()
            .map(|o| o.trim().to_string())
            .collect();
        if options.iter().any(|o| o.is_empty()) {
            return None;
        }
        let options: [String; OPTION_COUNT] = options.try_into().ok()?;

        Some(Self {
            text,
            options,
            correct_option_index: generated.correct_option_index,
            explanation: generated.explanation.trim().to_string(),
            difficulty: generated.difficulty,
        })
    }

    pub fn into_question(self, video_id: Uuid) -> Question {
        Question {
            id: Uuid::new_v4(),
            video_id,
            text: self.text,
            options: self.options,
            correct_option_index: self.correct_option_index,
            explanation: self.explanation,
            difficulty: self.difficulty,
        }
    }
}

/// A non-empty set of validated questions.
///
/// The store only accepts a `QuestionSet` alongside a new video, so a video
/// without questions cannot be written.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    questions: Vec<QuestionDraft>,
}

impl QuestionSet {
    /// Returns `None` if `questions` is empty.
    pub fn new(questions: Vec<QuestionDraft>) -> Option<Self> {
        if questions.is_empty() {
            None
        } else {
            Some(Self { questions })
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionDraft> {
        self.questions.iter()
    }

    /// Attaches every draft to `video_id`, assigning fresh ids.
    pub fn into_questions(self, video_id: Uuid) -> Vec<Question> {
        self.questions
            .into_iter()
            .map(|q| q.into_question(video_id))
            .collect()
    }
}

//=========================================================================================
// Review Types
//=========================================================================================

/// Per-learner, per-question scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewCard {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub question_id: Uuid,
    pub ease_factor: f64,
    pub repetitions: u32,
    pub interval_days: u32,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_review_at: DateTime<Utc>,
}

impl ReviewCard {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    /// `next_review_at` as implied by the last review and the current interval.
    pub fn expected_next_review(&self) -> DateTime<Utc> {
        self.last_reviewed_at + Duration::days(i64::from(self.interval_days))
    }
}

/// A due card joined with its question and the parent video's title.
#[derive(Debug, Clone, Serialize)]
pub struct DueReview {
    pub card: ReviewCard,
    pub question: Question,
    pub video_title: String,
}

/// One learner answer inside a quiz session.
#[derive(Debug, Clone)]
pub struct QuestionResponse {
    pub question_id: Uuid,
    /// `None` when the learner skipped or ran out of time.
    pub selected_option: Option<usize>,
    pub correct: bool,
    pub latency: std::time::Duration,
}

/// One learner's pass through a set of questions.
#[derive(Debug, Clone)]
pub struct QuizSession {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub video_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub responses: Vec<QuestionResponse>,
}

/// Cached aggregate of a finished quiz session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    pub video_id: Option<Uuid>,
    pub answered: u32,
    pub correct: u32,
    pub score_percent: u32,
    pub completed_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn from_session(session: &QuizSession, completed_at: DateTime<Utc>) -> Self {
        let answered = session.responses.len() as u32;
        let correct = session.responses.iter().filter(|r| r.correct).count() as u32;
        let score_percent = if answered == 0 {
            0
        } else {
            ((f64::from(correct) / f64::from(answered)) * 100.0).round() as u32
        };
        Self {
            session_id: session.id,
            owner_id: session.owner_id,
            video_id: session.video_id,
            answered,
            correct,
            score_percent,
            completed_at,
        }
    }
}

//=========================================================================================
// Video Identifiers
//=========================================================================================

const VIDEO_ID_LEN: usize = 11;

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extracts the 11-character platform id from a bare id or a watch, short,
/// embed or `youtu.be` URL.
pub fn parse_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let candidate = if let Some(idx) = input.find("v=") {
        &input[idx + 2..]
    } else if let Some(idx) = input.find("youtu.be/") {
        &input[idx + "youtu.be/".len()..]
    } else if let Some(idx) = input.find("/shorts/") {
        &input[idx + "/shorts/".len()..]
    } else if let Some(idx) = input.find("/embed/") {
        &input[idx + "/embed/".len()..]
    } else {
        return None;
    };

    let id: String = candidate
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    is_video_id(&id).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(options: &[&str], correct: usize) -> GeneratedQuestion {
        GeneratedQuestion {
            text: "What does a mitochondrion produce?".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_option_index: correct,
            explanation: "ATP is the cell's energy currency.".to_string(),
            difficulty: Difficulty::Easy,
        }
    }

    #[test]
    fn parses_bare_ids_and_urls() {
        assert_eq!(parse_video_id("dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(parse_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            parse_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(parse_video_id("too-short"), None);
        assert_eq!(parse_video_id("https://example.com/video"), None);
    }

    #[test]
    fn drafts_require_four_options_and_valid_answer() {
        assert!(QuestionDraft::from_generated(generated(&["ATP", "DNA", "RNA", "NADH"], 0)).is_some());
        assert!(QuestionDraft::from_generated(generated(&["ATP", "DNA", "RNA"], 0)).is_none());
        assert!(QuestionDraft::from_generated(generated(&["ATP", "DNA", "RNA", "NADH"], 4)).is_none());
        assert!(QuestionDraft::from_generated(generated(&["ATP", " ", "RNA", "NADH"], 1)).is_none());
    }

    #[test]
    fn question_set_rejects_empty() {
        assert!(QuestionSet::new(Vec::new()).is_none());
    }

    #[test]
    fn summary_score_is_rounded_percentage() {
        let response = |correct| QuestionResponse {
            question_id: Uuid::new_v4(),
            selected_option: Some(0),
            correct,
            latency: std::time::Duration::from_secs(5),
        };
        let session = QuizSession {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            video_id: None,
            started_at: Utc::now(),
            responses: vec![response(true), response(true), response(false)],
        };
        let summary = SessionSummary::from_session(&session, Utc::now());
        assert_eq!(summary.answered, 3);
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.score_percent, 67);
    }
}
