//! End-to-end ingestion tests against the in-memory store with stub collaborators.

use async_trait::async_trait;
use lesson_review_core::{
    commit_if_accepted, BatchOutcome, CandidateVideo, ChainConfig, DatabaseService, Difficulty,
    GateConfig, GeneratedQuestion, IngestConfig, IngestError, Ingestor, InMemoryStore,
    KeywordClassifier, MetadataSource, PortError, PortResult, QuestionGenerator, RejectionReason,
    TranscriptSourceChain, TranscriptStrategy, ValidationGate, ValidationResult, VideoMetadata,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const LESSON_ID: &str = "lessonAAAAA";
const EMPTY_ID: &str = "emptyBBBBBB";
const SHORT_ID: &str = "shortCCCCCC";
const BROKEN_ID: &str = "brokenDDDDD";

//=========================================================================================
// Stubs
//=========================================================================================

struct StaticMetadata {
    videos: HashMap<&'static str, VideoMetadata>,
}

impl StaticMetadata {
    fn new() -> Self {
        let mut videos = HashMap::new();
        videos.insert(LESSON_ID, metadata("Photosynthesis explained", 600));
        videos.insert(EMPTY_ID, metadata("Empty generator lesson", 600));
        videos.insert(SHORT_ID, metadata("Quick tip", 90));
        videos.insert(BROKEN_ID, metadata("Broken generator lesson", 600));
        Self { videos }
    }
}

fn metadata(title: &str, duration_seconds: u32) -> VideoMetadata {
    VideoMetadata {
        title: title.to_string(),
        description: "A lecture from the biology course.".to_string(),
        channel_name: "Open Lectures".to_string(),
        duration_seconds,
        thumbnail_url: Some("https://img.example/thumb.jpg".to_string()),
    }
}

#[async_trait]
impl MetadataSource for StaticMetadata {
    async fn get_metadata(&self, external_id: &str) -> PortResult<VideoMetadata> {
        self.videos
            .get(external_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(external_id.to_string()))
    }
}

struct CountingStrategy {
    name: &'static str,
    text: Option<String>,
    calls: AtomicUsize,
}

impl CountingStrategy {
    fn returning(name: &'static str, text: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            name,
            text,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptStrategy for CountingStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, external_id: &str) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text
            .clone()
            .ok_or_else(|| PortError::NotFound(format!("no captions for {}", external_id)))
    }
}

/// Returns questions based on the title: "Empty" titles get nothing, "Broken"
/// titles fail, everything else gets two good questions and one malformed one.
struct TitleDrivenGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl QuestionGenerator for TitleDrivenGenerator {
    async fn generate(
        &self,
        title: &str,
        _shaped_content: &str,
        _category: &str,
        target_count: usize,
    ) -> PortResult<Vec<GeneratedQuestion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if title.contains("Empty") {
            return Ok(Vec::new());
        }
        if title.contains("Broken") {
            return Err(PortError::Unexpected("model refused".to_string()));
        }
        let mut questions: Vec<GeneratedQuestion> =
            (0..2).map(|i| question(&format!("Question {}?", i))).collect();
        questions.push(GeneratedQuestion {
            options: vec!["only".to_string(), "two".to_string()],
            ..question("Malformed?")
        });
        questions.truncate(target_count);
        Ok(questions)
    }
}

fn question(text: &str) -> GeneratedQuestion {
    GeneratedQuestion {
        text: text.to_string(),
        options: ["Glucose", "Oxygen", "Nitrogen", "Helium"]
            .iter()
            .map(|o| o.to_string())
            .collect(),
        correct_option_index: 0,
        explanation: "Plants store energy as glucose.".to_string(),
        difficulty: Difficulty::Medium,
    }
}

fn lecture() -> String {
    "In this lesson we explain how chlorophyll captures light energy and how the plant \
     converts carbon dioxide and water into glucose. "
        .repeat(40)
}

struct Harness {
    store: Arc<InMemoryStore>,
    generator: Arc<TitleDrivenGenerator>,
    captions: Arc<CountingStrategy>,
    fallback: Arc<CountingStrategy>,
    ingestor: Ingestor,
}

fn harness(captions_text: Option<String>, fallback_text: Option<String>, config: IngestConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let generator = Arc::new(TitleDrivenGenerator {
        calls: AtomicUsize::new(0),
    });
    let captions = CountingStrategy::returning("captions", captions_text);
    let fallback = CountingStrategy::returning("yt-dlp", fallback_text);

    let strategies = vec![
        captions.clone() as Arc<dyn TranscriptStrategy>,
        fallback.clone() as Arc<dyn TranscriptStrategy>,
    ];
    let chain = TranscriptSourceChain::new(
        strategies,
        ChainConfig {
            min_chars: 1000,
            strategy_timeout: Duration::from_secs(1),
        },
    );
    let ingestor = Ingestor::new(
        Arc::new(StaticMetadata::new()),
        chain,
        ValidationGate::default(),
        generator.clone(),
        store.clone(),
        config,
    );

    Harness {
        store,
        generator,
        captions,
        fallback,
        ingestor,
    }
}

fn default_harness() -> Harness {
    harness(Some(lecture()), None, IngestConfig::default())
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn accepted_video_is_stored_with_only_valid_questions() {
    let h = default_harness();
    let owner = Uuid::new_v4();

    let video = h.ingestor.ingest(owner, LESSON_ID).await.unwrap();

    assert_eq!(video.external_id, LESSON_ID);
    assert_eq!(video.category, "science");
    let questions = h.store.get_questions_for_video(video.id).await.unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.video_id == video.id));
    assert_eq!(h.fallback.calls(), 0);
}

#[tokio::test]
async fn empty_generation_leaves_no_video_behind() {
    let h = default_harness();

    let err = h.ingestor.ingest(Uuid::new_v4(), EMPTY_ID).await.unwrap_err();

    assert!(matches!(err, IngestError::GenerationFailed(_)));
    assert_eq!(h.store.video_count(), 0);
    assert_eq!(h.store.question_count(), 0);
}

#[tokio::test]
async fn generator_error_leaves_store_unchanged() {
    let h = default_harness();

    let err = h.ingestor.ingest(Uuid::new_v4(), BROKEN_ID).await.unwrap_err();

    assert!(matches!(err, IngestError::GenerationFailed(_)));
    assert_eq!(h.store.video_count(), 0);
}

#[tokio::test]
async fn short_video_is_rejected_before_any_transcript_fetch() {
    let h = default_harness();

    let err = h.ingestor.ingest(Uuid::new_v4(), SHORT_ID).await.unwrap_err();

    assert!(matches!(
        err,
        IngestError::ValidationRejected {
            reason: RejectionReason::DurationTooShort
        }
    ));
    assert_eq!(h.captions.calls(), 0);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exhausted_chain_reports_source_exhausted() {
    let h = harness(Some("x".repeat(50)), None, IngestConfig::default());

    let err = h.ingestor.ingest(Uuid::new_v4(), LESSON_ID).await.unwrap_err();

    match err {
        IngestError::SourceExhausted(exhausted) => assert_eq!(exhausted.attempts.len(), 2),
        other => panic!("expected SourceExhausted, got {:?}", other),
    }
    assert_eq!(h.captions.calls(), 1);
    assert_eq!(h.fallback.calls(), 1);
    assert_eq!(h.store.video_count(), 0);
}

#[tokio::test]
async fn second_ingest_of_same_video_is_already_ingested() {
    let h = default_harness();
    let owner = Uuid::new_v4();

    h.ingestor.ingest(owner, LESSON_ID).await.unwrap();
    let err = h
        .ingestor
        .ingest(owner, &format!("https://www.youtube.com/watch?v={}", LESSON_ID))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::AlreadyIngested(_)));
    assert_eq!(h.store.video_count(), 1);

    // A different learner may import the same video.
    h.ingestor.ingest(Uuid::new_v4(), LESSON_ID).await.unwrap();
    assert_eq!(h.store.video_count(), 2);
}

#[tokio::test]
async fn concurrent_commits_for_same_video_store_exactly_one() {
    let store = InMemoryStore::new();
    let generator = TitleDrivenGenerator {
        calls: AtomicUsize::new(0),
    };
    let owner = Uuid::new_v4();
    let candidate = CandidateVideo::from_metadata(LESSON_ID, metadata("Photosynthesis explained", 600));
    let gate = ValidationGate::new(GateConfig::default(), Box::new(KeywordClassifier::default()));
    let accepted = match gate.validate(&candidate, &lecture()) {
        ValidationResult::Accepted(accepted) => accepted,
        other => panic!("expected acceptance, got {:?}", other),
    };
    let config = IngestConfig::default();

    let (a, b) = tokio::join!(
        commit_if_accepted(owner, &candidate, &accepted, &generator, &store, &config),
        commit_if_accepted(owner, &candidate, &accepted, &generator, &store, &config),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(IngestError::AlreadyIngested(_)))));
    assert_eq!(store.video_count(), 1);
}

#[tokio::test]
async fn batch_reports_each_candidate_in_order() {
    let h = default_harness();
    let owner = Uuid::new_v4();
    let inputs: Vec<String> = [LESSON_ID, LESSON_ID, SHORT_ID, "not a video", BROKEN_ID]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let report = h.ingestor.ingest_batch(owner, &inputs).await;

    assert_eq!(report.entries.len(), 5);
    let inputs_back: Vec<&str> = report.entries.iter().map(|e| e.input.as_str()).collect();
    assert_eq!(inputs_back, vec![LESSON_ID, LESSON_ID, SHORT_ID, "not a video", BROKEN_ID]);

    assert_eq!(report.processed(), 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.failed(), 2);
    assert!(matches!(
        report.entries[2].outcome,
        BatchOutcome::Skipped { .. }
    ));
    assert!(matches!(
        report.entries[3].outcome,
        BatchOutcome::Failed {
            error: IngestError::InvalidVideoId(_)
        }
    ));
    assert_eq!(h.store.video_count(), 1);
}

#[tokio::test]
async fn inputs_past_the_batch_limit_are_reported_as_skipped() {
    let h = harness(
        Some(lecture()),
        None,
        IngestConfig {
            max_batch_size: 2,
            ..IngestConfig::default()
        },
    );
    let inputs: Vec<String> = vec![
        "not a video".to_string(),
        "also not a video".to_string(),
        LESSON_ID.to_string(),
    ];

    let report = h.ingestor.ingest_batch(Uuid::new_v4(), &inputs).await;

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.entries[2].input, LESSON_ID);
    match &report.entries[2].outcome {
        BatchOutcome::Skipped { reason } => assert!(reason.contains("batch limit of 2")),
        other => panic!("expected the overflow to be skipped, got {:?}", other),
    }
    // Nothing past the limit is processed.
    assert_eq!(h.store.video_count(), 0);
    assert_eq!(h.captions.calls(), 0);
}
