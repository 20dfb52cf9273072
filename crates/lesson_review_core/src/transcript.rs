//! crates/lesson_review_core/src/transcript.rs
//!
//! The transcript source chain: an ordered list of independent strategies,
//! tried one at a time until one produces a usable transcript.

use crate::ports::{PortError, TranscriptStrategy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for [`TranscriptSourceChain`].
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// A result shorter than this (in characters, after trimming) counts as a failure.
    pub min_chars: usize,
    /// Upper bound on a single strategy call.
    pub strategy_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            min_chars: 1000,
            strategy_timeout: Duration::from_secs(30),
        }
    }
}

/// Why a single strategy did not produce a usable transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyFailure {
    Error(String),
    TooShort { chars: usize },
    TimedOut,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyFailure::Error(e) => write!(f, "{}", e),
            StrategyFailure::TooShort { chars } => write!(f, "too short ({} chars)", chars),
            StrategyFailure::TimedOut => f.write_str("timed out"),
        }
    }
}

/// One failed step of the chain, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub failure: StrategyFailure,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.failure)
    }
}

/// A transcript together with the strategy that produced it.
#[derive(Debug, Clone)]
pub struct SourcedTranscript {
    pub text: String,
    pub strategy: String,
}

/// Every strategy failed. There is no fallback to description text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no transcript strategy succeeded ({})", summarize(.attempts))]
pub struct SourceExhausted {
    pub attempts: Vec<StrategyAttempt>,
}

fn summarize(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no strategies configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct TranscriptSourceChain {
    strategies: Vec<Arc<dyn TranscriptStrategy>>,
    config: ChainConfig,
}

impl TranscriptSourceChain {
    pub fn new(strategies: Vec<Arc<dyn TranscriptStrategy>>, config: ChainConfig) -> Self {
        Self { strategies, config }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the first strategy output that clears `min_chars`.
    /// Later strategies are never called once one succeeds.
    pub async fn fetch_transcript(
        &self,
        external_id: &str,
    ) -> Result<SourcedTranscript, SourceExhausted> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let name = strategy.name().to_string();
            debug!(external_id, strategy = %name, "Trying transcript strategy");

            let failure =
                match tokio::time::timeout(self.config.strategy_timeout, strategy.fetch(external_id))
                    .await
                {
                    Err(_) => StrategyFailure::TimedOut,
                    Ok(Err(PortError::NotFound(msg))) => {
                        StrategyFailure::Error(format!("not found: {}", msg))
                    }
                    Ok(Err(e)) => StrategyFailure::Error(e.to_string()),
                    Ok(Ok(text)) => {
                        let text = text.trim();
                        let chars = text.chars().count();
                        if chars >= self.config.min_chars {
                            info!(external_id, strategy = %name, chars, "Transcript strategy succeeded");
                            return Ok(SourcedTranscript {
                                text: text.to_string(),
                                strategy: name,
                            });
                        }
                        StrategyFailure::TooShort { chars }
                    }
                };

            warn!(external_id, strategy = %name, %failure, "Transcript strategy failed");
            attempts.push(StrategyAttempt {
                strategy: name,
                failure,
            });
        }

        Err(SourceExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        result: PortResult<String>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(name: &'static str, result: PortResult<String>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptStrategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _external_id: &str) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct Hangs;

    #[async_trait]
    impl TranscriptStrategy for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }

        async fn fetch(&self, _external_id: &str) -> PortResult<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("x".repeat(5000))
        }
    }

    fn erase<S: TranscriptStrategy + 'static>(strategy: &Arc<S>) -> Arc<dyn TranscriptStrategy> {
        strategy.clone()
    }

    fn chain(strategies: Vec<Arc<dyn TranscriptStrategy>>) -> TranscriptSourceChain {
        TranscriptSourceChain::new(
            strategies,
            ChainConfig {
                min_chars: 1000,
                strategy_timeout: Duration::from_millis(50),
            },
        )
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let first = Fixed::new("captions", Ok("a".repeat(5000)));
        let second = Fixed::new("yt-dlp", Ok("b".repeat(5000)));
        let chain = chain(vec![erase(&first), erase(&second)]);

        let transcript = chain.fetch_transcript("abcdefghijk").await.unwrap();

        assert_eq!(transcript.strategy, "captions");
        assert_eq!(transcript.text.len(), 5000);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn short_result_advances_to_next_strategy() {
        let first = Fixed::new("captions", Ok("too short".to_string()));
        let second = Fixed::new("yt-dlp", Ok("b".repeat(1200)));
        let chain = chain(vec![erase(&first), erase(&second)]);

        let transcript = chain.fetch_transcript("abcdefghijk").await.unwrap();

        assert_eq!(transcript.strategy, "yt-dlp");
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn exhaustion_records_every_attempt() {
        let chain = chain(vec![
            erase(&Fixed::new("captions", Err(PortError::NotFound("no captions".into())))),
            erase(&Fixed::new("yt-dlp", Ok("c".repeat(50)))),
        ]);

        let err = chain.fetch_transcript("abcdefghijk").await.unwrap_err();

        assert_eq!(err.attempts.len(), 2);
        assert!(matches!(err.attempts[0].failure, StrategyFailure::Error(_)));
        assert_eq!(err.attempts[1].failure, StrategyFailure::TooShort { chars: 50 });
    }

    #[tokio::test]
    async fn hanging_strategy_times_out_and_chain_moves_on() {
        let fallback = Fixed::new("script", Ok("d".repeat(2000)));
        let chain = chain(vec![erase(&Arc::new(Hangs)), erase(&fallback)]);

        let transcript = chain.fetch_transcript("abcdefghijk").await.unwrap();

        assert_eq!(transcript.strategy, "script");
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let err = chain(Vec::new()).fetch_transcript("abcdefghijk").await.unwrap_err();
        assert!(err.attempts.is_empty());
        assert!(err.to_string().contains("no strategies configured"));
    }
}
