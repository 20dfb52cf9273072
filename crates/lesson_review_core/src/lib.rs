pub mod captions;
pub mod domain;
pub mod ingest;
pub mod memory;
pub mod ports;
pub mod review;
pub mod scheduler;
pub mod transcript;
pub mod validation;

pub use domain::{
    parse_video_id, CandidateVideo, Difficulty, DueReview, GeneratedQuestion, NewVideo, Question,
    QuestionResponse, QuestionSet, QuizSession, ReviewCard, SessionSummary, Video, VideoMetadata,
};
pub use ingest::{
    commit_if_accepted, BatchOutcome, BatchReport, IngestConfig, IngestError, Ingestor,
    RetryPolicy, RetryingGenerator,
};
pub use memory::InMemoryStore;
pub use ports::{
    DatabaseService, MetadataSource, PortError, PortResult, QuestionGenerator, TranscriptStrategy,
};
pub use review::{ReviewError, ReviewService};
pub use scheduler::{LatencyQualityModel, Quality, QualityModel, SchedulerConfig};
pub use transcript::{ChainConfig, SourceExhausted, TranscriptSourceChain};
pub use validation::{GateConfig, KeywordClassifier, RejectionReason, ValidationGate, ValidationResult};
