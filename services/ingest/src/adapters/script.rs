//! services/ingest/src/adapters/script.rs
//!
//! A `TranscriptStrategy` backed by an external extractor program. The program
//! receives the video id and `--format json`, and prints
//! `{ "success", "transcript", "method", "error", "length" }` on stdout.

use async_trait::async_trait;
use lesson_review_core::ports::{PortError, PortResult, TranscriptStrategy};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ScriptOutput {
    success: bool,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Turns the extractor's stdout into a transcript or a port error.
pub fn interpret_output(stdout: &str) -> PortResult<String> {
    let output: ScriptOutput = serde_json::from_str(stdout.trim())
        .map_err(|e| PortError::Unexpected(format!("extractor printed invalid JSON: {}", e)))?;

    match output.transcript {
        Some(text) if output.success && !text.trim().is_empty() => {
            debug!(method = output.method.as_deref().unwrap_or("unknown"), "Extractor succeeded");
            Ok(text)
        }
        _ => Err(PortError::NotFound(
            output
                .error
                .unwrap_or_else(|| "extractor returned no transcript".to_string()),
        )),
    }
}

#[derive(Clone)]
pub struct ScriptStrategy {
    program: String,
    args: Vec<String>,
}

impl ScriptStrategy {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line such as `python3 transcript_extractor.py`.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl TranscriptStrategy for ScriptStrategy {
    fn name(&self) -> &str {
        "extractor-script"
    }

    async fn fetch(&self, external_id: &str) -> PortResult<String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(external_id)
            .arg("--format")
            .arg("json")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PortError::Unexpected(format!("failed to run {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        // A failing extractor may still report its error as JSON.
        match interpret_output(&stdout) {
            Err(PortError::Unexpected(_)) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(PortError::Unexpected(format!("{}: {}", output.status, stderr.trim())))
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_output_yields_transcript() {
        let text = interpret_output(
            r#"{"success": true, "transcript": "hello world", "method": "yt-dlp", "error": null, "length": 11}"#,
        )
        .unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn reported_failure_is_not_found() {
        let err = interpret_output(
            r#"{"success": false, "transcript": null, "error": "All transcript extraction methods failed"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PortError::NotFound(ref m) if m.contains("All transcript")));
    }

    #[test]
    fn garbage_is_unexpected() {
        assert!(matches!(interpret_output("Traceback ..."), Err(PortError::Unexpected(_))));
    }

    #[test]
    fn command_line_is_split() {
        let strategy = ScriptStrategy::from_command_line("  python3  extract.py ").unwrap();
        assert_eq!(strategy.program, "python3");
        assert_eq!(strategy.args, vec!["extract.py".to_string()]);
        assert!(ScriptStrategy::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_the_program_with_the_video_id() {
        // `sh -c <script> sh <id> --format json`: the id arrives as $1.
        let strategy = ScriptStrategy::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"printf '{"success": true, "transcript": "captions for %s"}' "$1""#.to_string(),
                "sh".to_string(),
            ],
        );

        let text = strategy.fetch("dQw4w9WgXcQ").await.unwrap();

        assert_eq!(text, "captions for dQw4w9WgXcQ");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_reports_its_status() {
        let strategy = ScriptStrategy::new(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 3".to_string(), "sh".to_string()],
        );

        let err = strategy.fetch("dQw4w9WgXcQ").await.unwrap_err();

        assert!(matches!(err, PortError::Unexpected(ref m) if m.contains("boom")));
    }
}
