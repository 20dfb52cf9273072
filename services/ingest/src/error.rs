//! services/ingest/src/error.rs
//!
//! The top-level error returned by the `ingest` binary.

use crate::config::ConfigError;
use lesson_review_core::ports::PortError;
use lesson_review_core::{IngestError, ReviewError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The environment was missing or held a bad setting.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A store or upstream call failed outside the ingestion pipeline.
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    /// A single-video import failed outright.
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// Connecting the pool failed.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, e.g. a required API key that was not configured.
    #[error("Internal error: {0}")]
    Internal(String),
}
