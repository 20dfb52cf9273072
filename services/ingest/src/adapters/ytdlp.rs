//! services/ingest/src/adapters/ytdlp.rs
//!
//! A `TranscriptStrategy` that asks `yt-dlp` for subtitle files only and parses
//! whichever one it managed to write.

use super::youtube::CAPTION_LANGUAGES;
use async_trait::async_trait;
use lesson_review_core::{
    captions::{parse_captions, CaptionFormat},
    ports::{PortError, PortResult, TranscriptStrategy},
};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

#[derive(Clone)]
pub struct YtDlpStrategy {
    binary: PathBuf,
}

impl YtDlpStrategy {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    async fn download_subtitles(&self, external_id: &str, dir: &Path) -> PortResult<()> {
        let output_template = dir.join("%(id)s.%(ext)s");
        let output = Command::new(&self.binary)
            .arg("--skip-download")
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-langs")
            .arg(CAPTION_LANGUAGES.join(","))
            .arg("--sub-format")
            .arg("vtt/srt/ttml/best")
            .arg("--no-warnings")
            .arg("-o")
            .arg(&output_template)
            .arg(format!("https://www.youtube.com/watch?v={}", external_id))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PortError::Unexpected(format!("failed to run {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(PortError::Unexpected(format!("{}: {}", output.status, last_line.trim())));
        }
        Ok(())
    }
}

/// Picks the best subtitle file: preferred language first, then VTT over SRT
/// over TTML. Files are named `<id>.<lang>.<ext>`.
pub fn pick_subtitle(paths: &[PathBuf]) -> Option<(PathBuf, CaptionFormat)> {
    let rank = |path: &Path| -> Option<(usize, usize, CaptionFormat)> {
        let format = CaptionFormat::from_extension(path.extension()?.to_str()?)?;
        let stem = path.file_stem()?.to_str()?;
        let lang = stem.rsplit('.').next().unwrap_or("");
        let lang_rank = CAPTION_LANGUAGES
            .iter()
            .position(|l| l.eq_ignore_ascii_case(lang))
            .unwrap_or(CAPTION_LANGUAGES.len());
        let format_rank = match format {
            CaptionFormat::Vtt => 0,
            CaptionFormat::Srt => 1,
            CaptionFormat::Ttml => 2,
        };
        Some((lang_rank, format_rank, format))
    };

    paths
        .iter()
        .filter_map(|p| rank(p).map(|(l, f, format)| ((l, f), p.clone(), format)))
        .min_by_key(|(key, _, _)| *key)
        .map(|(_, path, format)| (path, format))
}

#[async_trait]
impl TranscriptStrategy for YtDlpStrategy {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn fetch(&self, external_id: &str) -> PortResult<String> {
        // Removed with everything in it when dropped, including on timeout.
        let dir = tempfile::tempdir().map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.download_subtitles(external_id, dir.path()).await?;

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path())
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
        {
            paths.push(entry.path());
        }

        let (path, format) = pick_subtitle(&paths)
            .ok_or_else(|| PortError::NotFound(format!("yt-dlp found no subtitles for {}", external_id)))?;
        debug!(external_id, file = %path.display(), "Parsing subtitle file");
        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(parse_captions(format, &body))
    }
}
