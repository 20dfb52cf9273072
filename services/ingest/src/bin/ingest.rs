//! services/ingest/src/bin/ingest.rs

use async_openai::{config::OpenAIConfig, Client};
use chrono::Utc;
use clap::{Parser, Subcommand};
use ingest_lib::{
    adapters::{
        DbAdapter, OpenAiQuestionAdapter, ScriptStrategy, TimedTextStrategy,
        YouTubeMetadataAdapter, YtDlpStrategy,
    },
    config::Config,
    error::AppError,
};
use lesson_review_core::{
    BatchOutcome, ChainConfig, DatabaseService, IngestConfig, Ingestor, LatencyQualityModel,
    RetryPolicy, RetryingGenerator, ReviewService, SchedulerConfig, TranscriptSourceChain,
    TranscriptStrategy, ValidationGate,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ingest", about = "Import lesson videos and review due questions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import videos (ids or URLs) into a learner's library.
    Import {
        #[arg(long)]
        owner: Uuid,
        #[arg(required = true)]
        videos: Vec<String>,
    },
    /// List the learner's due reviews, most overdue first.
    Due {
        #[arg(long)]
        owner: Uuid,
        /// Show at most this many reviews.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove a video from the learner's library.
    Remove {
        #[arg(long)]
        owner: Uuid,
        video_id: Uuid,
    },
}

fn required(value: &Option<String>, name: &str) -> Result<String, AppError> {
    value
        .clone()
        .ok_or_else(|| AppError::Internal(format!("{} is required", name)))
}

fn build_ingestor(config: &Config, store: Arc<dyn DatabaseService>) -> Result<Ingestor, AppError> {
    let http = reqwest::Client::builder()
        .timeout(config.strategy_timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;

    let metadata = Arc::new(YouTubeMetadataAdapter::new(
        http.clone(),
        required(&config.youtube_api_key, "YOUTUBE_API_KEY")?,
    ));

    let mut strategies: Vec<Arc<dyn TranscriptStrategy>> = vec![
        Arc::new(TimedTextStrategy::new(http)),
        Arc::new(YtDlpStrategy::new(config.ytdlp_path.clone())),
    ];
    if let Some(script) = config
        .transcript_script
        .as_deref()
        .and_then(ScriptStrategy::from_command_line)
    {
        strategies.push(Arc::new(script));
    }
    let chain = TranscriptSourceChain::new(
        strategies,
        ChainConfig {
            strategy_timeout: config.strategy_timeout,
            ..ChainConfig::default()
        },
    );
    info!(strategies = ?chain.strategy_names(), "Transcript chain ready");

    let openai_config =
        OpenAIConfig::new().with_api_key(required(&config.openai_api_key, "OPENAI_API_KEY")?);
    let generator = Arc::new(RetryingGenerator::new(
        Arc::new(OpenAiQuestionAdapter::new(
            Client::with_config(openai_config),
            config.question_model.clone(),
        )),
        RetryPolicy::default(),
    ));

    Ok(Ingestor::new(
        metadata,
        chain,
        ValidationGate::default(),
        generator,
        store,
        IngestConfig {
            target_question_count: config.target_questions,
            generation_timeout: config.generation_timeout,
            batch_concurrency: config.batch_concurrency,
            ..IngestConfig::default()
        },
    ))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded.");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.batch_concurrency as u32 + 1)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Run the Requested Command ---
    match cli.command {
        Command::Import { owner, videos } => {
            let ingestor = build_ingestor(&config, db_adapter)?;
            let report = ingestor.ingest_batch(owner, &videos).await;
            for entry in &report.entries {
                match &entry.outcome {
                    BatchOutcome::Processed {
                        video_id,
                        question_count,
                    } => println!("{}\timported\t{} ({} questions)", entry.input, video_id, question_count),
                    BatchOutcome::Skipped { reason } => println!("{}\tskipped\t{}", entry.input, reason),
                    BatchOutcome::Failed { error } => println!("{}\tfailed\t{}", entry.input, error),
                }
            }
            info!(
                processed = report.processed(),
                skipped = report.skipped(),
                failed = report.failed(),
                "Import finished"
            );
        }
        Command::Due { owner, limit } => {
            let reviews = ReviewService::new(
                db_adapter,
                Arc::new(LatencyQualityModel::default()),
                SchedulerConfig {
                    max_interval_days: config.max_interval_days,
                },
            );
            let due = reviews.due_reviews(owner, Utc::now()).await?;
            let shown = limit.unwrap_or(due.len()).min(due.len());
            for review in &due[..shown] {
                println!(
                    "{}\t{}\t{}\t{}",
                    review.card.next_review_at.format("%Y-%m-%d %H:%M"),
                    review.video_title,
                    review.question.id,
                    review.question.text
                );
            }
            info!(due = due.len(), shown, "Listed due reviews");
        }
        Command::Remove { owner, video_id } => {
            db_adapter.soft_delete_video(owner, video_id).await?;
            println!("{}\tremoved", video_id);
        }
    }

    Ok(())
}
