//! crates/lesson_review_core/src/ingest.rs
//!
//! The ingestion pipeline: source chain → validation gate → question generation →
//! atomic commit. Questions are always generated before anything is written, and the
//! video is stored together with its questions or not at all.

use crate::domain::{
    parse_video_id, CandidateVideo, GeneratedQuestion, NewVideo, QuestionDraft, QuestionSet,
    Video,
};
use crate::ports::{DatabaseService, MetadataSource, PortError, PortResult, QuestionGenerator};
use crate::transcript::{SourceExhausted, TranscriptSourceChain};
use crate::validation::{AcceptedContent, RejectionReason, ValidationGate, ValidationResult};
use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("'{0}' is not a valid video id or URL")]
    InvalidVideoId(String),
    #[error("Video {0} has already been ingested")]
    AlreadyIngested(String),
    #[error("Metadata unavailable for {external_id}: {cause}")]
    MetadataUnavailable { external_id: String, cause: PortError },
    #[error(transparent)]
    SourceExhausted(#[from] SourceExhausted),
    #[error("Rejected: {reason}")]
    ValidationRejected { reason: RejectionReason },
    #[error("Question generation failed: {0}")]
    GenerationFailed(String),
    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

impl IngestError {
    /// Outcomes that mean "nothing to do" rather than "something broke".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            IngestError::AlreadyIngested(_) | IngestError::ValidationRejected { .. }
        )
    }
}

//=========================================================================================
// Retrying Question Generator
//=========================================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Wraps a [`QuestionGenerator`], retrying rate-limit and overload failures with
/// exponential backoff. Other failures are returned immediately.
pub struct RetryingGenerator {
    inner: Arc<dyn QuestionGenerator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn QuestionGenerator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl QuestionGenerator for RetryingGenerator {
    async fn generate(
        &self,
        title: &str,
        shaped_content: &str,
        category: &str,
        target_count: usize,
    ) -> PortResult<Vec<GeneratedQuestion>> {
        let mut attempt = 1;
        loop {
            match self
                .inner
                .generate(title, shaped_content, category, target_count)
                .await
            {
                Ok(questions) => return Ok(questions),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(attempt, ?delay, error = %e, "Question generation failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//=========================================================================================
// Persistence Invariant
//=========================================================================================

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub target_question_count: usize,
    pub metadata_timeout: Duration,
    pub generation_timeout: Duration,
    pub max_batch_size: usize,
    pub batch_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            target_question_count: 10,
            metadata_timeout: Duration::from_secs(15),
            generation_timeout: Duration::from_secs(120),
            max_batch_size: 50,
            batch_concurrency: 4,
        }
    }
}

/// Generates questions for accepted content and commits the video with them in a
/// single store call. Nothing is written unless at least one valid question came back.
pub async fn commit_if_accepted(
    owner_id: Uuid,
    candidate: &CandidateVideo,
    accepted: &AcceptedContent,
    generator: &dyn QuestionGenerator,
    store: &dyn DatabaseService,
    config: &IngestConfig,
) -> Result<Video, IngestError> {
    commit_counted(owner_id, candidate, accepted, generator, store, config)
        .await
        .map(|(video, _)| video)
}

async fn commit_counted(
    owner_id: Uuid,
    candidate: &CandidateVideo,
    accepted: &AcceptedContent,
    generator: &dyn QuestionGenerator,
    store: &dyn DatabaseService,
    config: &IngestConfig,
) -> Result<(Video, usize), IngestError> {
    let generated = tokio::time::timeout(
        config.generation_timeout,
        generator.generate(
            &candidate.title,
            accepted.shaped_content(),
            accepted.category(),
            config.target_question_count,
        ),
    )
    .await
    .map_err(|_| IngestError::GenerationFailed("timed out".to_string()))?
    .map_err(|e| IngestError::GenerationFailed(e.to_string()))?;

    let returned = generated.len();
    let drafts: Vec<QuestionDraft> = generated
        .into_iter()
        .filter_map(QuestionDraft::from_generated)
        .collect();
    if drafts.len() < returned {
        warn!(
            external_id = %candidate.external_id,
            dropped = returned - drafts.len(),
            "Dropped malformed generated questions"
        );
    }

    let questions = QuestionSet::new(drafts).ok_or_else(|| {
        IngestError::GenerationFailed("generator returned no usable questions".to_string())
    })?;

    let video = NewVideo {
        id: Uuid::new_v4(),
        owner_id,
        external_id: candidate.external_id.clone(),
        title: candidate.title.clone(),
        channel_name: candidate.channel_name.clone(),
        duration_seconds: candidate.duration_seconds,
        thumbnail_url: candidate.thumbnail_url.clone(),
        transcript: accepted.clean_transcript().to_string(),
        category: accepted.category().to_string(),
        created_at: Utc::now(),
    };

    let question_count = questions.len();
    match store.insert_video_with_questions(video, questions).await {
        Ok(video) => {
            info!(
                external_id = %video.external_id,
                video_id = %video.id,
                question_count,
                "Committed video with questions"
            );
            Ok((video, question_count))
        }
        Err(PortError::Conflict(_)) => {
            Err(IngestError::AlreadyIngested(candidate.external_id.clone()))
        }
        Err(e) => Err(IngestError::Store(e)),
    }
}

//=========================================================================================
// Pipeline and Batch
//=========================================================================================

/// Per-candidate result of a batch import.
#[derive(Debug)]
pub enum BatchOutcome {
    Processed { video_id: Uuid, question_count: usize },
    Skipped { reason: String },
    Failed { error: IngestError },
}

#[derive(Debug)]
pub struct BatchEntry {
    pub input: String,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Processed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.outcome)).count()
    }
}

pub struct Ingestor {
    metadata: Arc<dyn MetadataSource>,
    chain: TranscriptSourceChain,
    gate: ValidationGate,
    generator: Arc<dyn QuestionGenerator>,
    store: Arc<dyn DatabaseService>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        chain: TranscriptSourceChain,
        gate: ValidationGate,
        generator: Arc<dyn QuestionGenerator>,
        store: Arc<dyn DatabaseService>,
        config: IngestConfig,
    ) -> Self {
        Self {
            metadata,
            chain,
            gate,
            generator,
            store,
            config,
        }
    }

    /// Runs the full pipeline for one video id or URL.
    pub async fn ingest(&self, owner_id: Uuid, input: &str) -> Result<Video, IngestError> {
        self.ingest_counted(owner_id, input)
            .await
            .map(|(video, _)| video)
    }

    async fn ingest_counted(
        &self,
        owner_id: Uuid,
        input: &str,
    ) -> Result<(Video, usize), IngestError> {
        let external_id =
            parse_video_id(input).ok_or_else(|| IngestError::InvalidVideoId(input.to_string()))?;

        if self
            .store
            .find_video_by_external_id(owner_id, &external_id)
            .await?
            .is_some()
        {
            return Err(IngestError::AlreadyIngested(external_id));
        }

        let metadata = match tokio::time::timeout(
            self.config.metadata_timeout,
            self.metadata.get_metadata(&external_id),
        )
        .await
        {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(cause)) => return Err(IngestError::MetadataUnavailable { external_id, cause }),
            Err(_) => {
                return Err(IngestError::MetadataUnavailable {
                    external_id,
                    cause: PortError::Unavailable("metadata lookup timed out".to_string()),
                })
            }
        };
        let candidate = CandidateVideo::from_metadata(external_id, metadata);

        self.gate
            .precheck(&candidate)
            .map_err(|reason| IngestError::ValidationRejected { reason })?;

        let transcript = self.chain.fetch_transcript(&candidate.external_id).await?;
        debug!(
            external_id = %candidate.external_id,
            strategy = %transcript.strategy,
            "Validating transcript"
        );

        let accepted = match self.gate.validate(&candidate, &transcript.text) {
            ValidationResult::Accepted(accepted) => accepted,
            ValidationResult::Rejected { reason } => {
                info!(external_id = %candidate.external_id, reason = reason.as_str(), "Candidate rejected");
                return Err(IngestError::ValidationRejected { reason });
            }
        };

        commit_counted(
            owner_id,
            &candidate,
            &accepted,
            self.generator.as_ref(),
            self.store.as_ref(),
            &self.config,
        )
        .await
    }

    /// Ingests several candidates with bounded concurrency. A failing candidate never
    /// aborts the others; the report keeps input order and has one entry per input.
    /// Inputs past `max_batch_size` are reported as skipped without being processed.
    pub async fn ingest_batch(&self, owner_id: Uuid, inputs: &[String]) -> BatchReport {
        let limit = self.config.max_batch_size;
        let (selected, overflow) = inputs.split_at(inputs.len().min(limit));
        if !overflow.is_empty() {
            warn!(requested = inputs.len(), limit, "Batch limit reached, skipping the rest");
        }

        let mut entries: Vec<BatchEntry> = stream::iter(selected.iter().cloned())
            .map(|input| async move {
                let outcome = match self.ingest_counted(owner_id, &input).await {
                    Ok((video, question_count)) => BatchOutcome::Processed {
                        video_id: video.id,
                        question_count,
                    },
                    Err(e) if e.is_skip() => BatchOutcome::Skipped {
                        reason: e.to_string(),
                    },
                    Err(error) => {
                        warn!(input = %input, %error, "Ingestion failed");
                        BatchOutcome::Failed { error }
                    }
                };
                BatchEntry { input, outcome }
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        entries.extend(overflow.iter().map(|input| BatchEntry {
            input: input.clone(),
            outcome: BatchOutcome::Skipped {
                reason: format!("batch limit of {} reached", limit),
            },
        }));
        let report = BatchReport { entries };
        info!(
            processed = report.processed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch import finished"
        );
        report
    }
}
