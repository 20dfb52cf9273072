//! crates/lesson_review_core/src/captions.rs
//!
//! Flattens subtitle files (WebVTT, SRT, TTML) into plain caption text.

use regex::Regex;
use std::sync::OnceLock;

/// Subtitle container formats understood by [`parse_captions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFormat {
    Vtt,
    Srt,
    Ttml,
}

impl CaptionFormat {
    /// Maps a file extension (`vtt`, `srt`, `ttml`, `xml`) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "vtt" => Some(CaptionFormat::Vtt),
            "srt" => Some(CaptionFormat::Srt),
            "ttml" | "xml" | "srv3" => Some(CaptionFormat::Ttml),
            _ => None,
        }
    }
}

pub fn parse_captions(format: CaptionFormat, body: &str) -> String {
    match format {
        CaptionFormat::Vtt => parse_vtt(body),
        CaptionFormat::Srt => parse_srt(body),
        CaptionFormat::Ttml => parse_ttml(body),
    }
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"))
}

fn paragraph_regex() -> &'static Regex {
    static PARAGRAPHS: OnceLock<Regex> = OnceLock::new();
    PARAGRAPHS.get_or_init(|| Regex::new(r"(?s)<p[^>]*>(.*?)</p>").expect("static regex"))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Joins caption lines, dropping consecutive duplicates produced by
/// auto-caption roll-up.
fn join_lines(lines: impl Iterator<Item = String>) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() || out.last() == Some(&line) {
            continue;
        }
        out.push(line);
    }
    out.join(" ")
}

pub fn parse_vtt(body: &str) -> String {
    let mut in_block = false;
    let lines = body.lines().filter_map(|raw| {
        let line = raw.trim();
        if line.is_empty() {
            in_block = false;
            return None;
        }
        if line.starts_with("NOTE") || line.starts_with("STYLE") || line.starts_with("REGION") {
            in_block = true;
            return None;
        }
        if in_block
            || line.starts_with("WEBVTT")
            || line.starts_with("Kind:")
            || line.starts_with("Language:")
            || line.contains("-->")
        {
            return None;
        }
        Some(decode_entities(&tag_regex().replace_all(line, "")))
    });
    join_lines(lines)
}

pub fn parse_srt(body: &str) -> String {
    let lines = body.lines().filter_map(|raw| {
        let line = raw.trim();
        if line.is_empty() || line.contains("-->") || line.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(decode_entities(&tag_regex().replace_all(line, "")))
    });
    join_lines(lines)
}

pub fn parse_ttml(body: &str) -> String {
    let lines = paragraph_regex()
        .captures_iter(body)
        .map(|caps| decode_entities(&tag_regex().replace_all(&caps[1], " ")));
    join_lines(lines)
}
