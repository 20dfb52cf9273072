//! crates/lesson_review_core/src/validation.rs
//!
//! The content validation gate. Decides whether a candidate video is fit to become
//! quiz material and, if so, shapes its transcript into a bounded payload for the
//! question generator.
//!
//! Checks run cheapest first and stop at the first failure:
//! duration, cleaned transcript length, topic classification, shaped payload size.

use crate::domain::CandidateVideo;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

//=========================================================================================
// Verdict Types
//=========================================================================================

/// The specific rule that rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    DurationTooShort,
    TranscriptTooShort,
    NoEducationalSignal,
    NonEducationalContent,
    InsufficientContent,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::DurationTooShort => "duration_too_short",
            RejectionReason::TranscriptTooShort => "transcript_too_short",
            RejectionReason::NoEducationalSignal => "no_educational_signal",
            RejectionReason::NonEducationalContent => "non_educational_content",
            RejectionReason::InsufficientContent => "insufficient_content",
        }
    }

    /// A sentence suitable for showing to the person who submitted the video.
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::DurationTooShort => {
                "Video is too short to support a multi-question quiz."
            }
            RejectionReason::TranscriptTooShort => {
                "Transcript is too short after removing captions noise."
            }
            RejectionReason::NoEducationalSignal => {
                "Video does not appear to teach anything (no educational content detected)."
            }
            RejectionReason::NonEducationalContent => {
                "Video looks like entertainment content (reaction, gaming, vlog or similar)."
            }
            RejectionReason::InsufficientContent => {
                "Not enough substantive content to generate questions from."
            }
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Gate output for an accepted candidate.
///
/// Fields are private: only [`ValidationGate::validate`] can produce one, so shaped
/// content always comes from a passed validation.
#[derive(Debug, Clone)]
pub struct AcceptedContent {
    clean_transcript: String,
    shaped_content: String,
    category: String,
}

impl AcceptedContent {
    pub fn clean_transcript(&self) -> &str {
        &self.clean_transcript
    }

    pub fn shaped_content(&self) -> &str {
        &self.shaped_content
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

#[derive(Debug, Clone)]
pub enum ValidationResult {
    Accepted(AcceptedContent),
    Rejected { reason: RejectionReason },
}

impl ValidationResult {
    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            ValidationResult::Accepted(_) => None,
            ValidationResult::Rejected { reason } => Some(*reason),
        }
    }
}

//=========================================================================================
// Topic Classification
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicVerdict {
    Educational { category: String },
    NoEducationalSignal,
    NonEducational { matched: String },
}

/// Decides whether a candidate is educational. Swappable for a learned model.
pub trait TopicClassifier: Send + Sync {
    fn classify(&self, candidate: &CandidateVideo, transcript: &str) -> TopicVerdict;
}

const EDUCATIONAL_TERMS: &[&str] = &[
    "tutorial", "explain", "explained", "explains", "explaining", "explanation",
    "lesson", "lecture", "learn", "learning", "concept", "concepts", "course",
    "introduction", "how to", "guide", "theory", "understand", "understanding",
    "example", "examples", "study", "definition", "principle", "principles",
    "fundamentals", "overview", "step by step", "walkthrough", "demonstrate",
];

const NON_EDUCATIONAL_TERMS: &[&str] = &[
    "reaction", "reacts", "reacting", "gaming", "gameplay", "let's play",
    "lets play", "vlog", "prank", "pranks", "unboxing", "haul", "mukbang",
    "asmr", "music video", "official video", "trailer", "speedrun", "funny moments",
];

const CATEGORY_TERMS: &[(&str, &[&str])] = &[
    ("programming", &["programming", "code", "coding", "software", "algorithm", "rust", "python", "javascript", "function", "compiler"]),
    ("mathematics", &["math", "mathematics", "equation", "algebra", "calculus", "geometry", "theorem", "proof", "probability"]),
    ("science", &["science", "physics", "chemistry", "biology", "energy", "cell", "atom", "molecule", "experiment", "evolution"]),
    ("history", &["history", "historical", "century", "empire", "war", "revolution", "ancient", "civilization"]),
    ("language", &["grammar", "vocabulary", "pronunciation", "language", "verb", "noun", "sentence"]),
    ("business", &["business", "marketing", "finance", "economics", "investing", "startup", "market"]),
    ("health", &["health", "nutrition", "exercise", "medicine", "anatomy", "disease"]),
];

fn term_pattern(terms: &[&str]) -> Regex {
    let alternatives = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("term list is a valid regex")
}

/// Keyword heuristic: requires an educational indicator anywhere in the title,
/// description or transcript, and no entertainment indicator in the title,
/// description or channel name.
pub struct KeywordClassifier {
    educational: Regex,
    non_educational: Regex,
    categories: Vec<(&'static str, Regex)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            educational: term_pattern(EDUCATIONAL_TERMS),
            non_educational: term_pattern(NON_EDUCATIONAL_TERMS),
            categories: CATEGORY_TERMS
                .iter()
                .map(|(name, terms)| (*name, term_pattern(terms)))
                .collect(),
        }
    }
}

impl KeywordClassifier {
    fn category_for(&self, text: &str) -> String {
        self.categories
            .iter()
            .map(|(name, pattern)| (*name, pattern.find_iter(text).count()))
            .filter(|(_, hits)| *hits > 0)
            // Ties go to the earlier entry in the table.
            .fold(None::<(&str, usize)>, |best, (name, hits)| match best {
                Some((_, best_hits)) if best_hits >= hits => best,
                _ => Some((name, hits)),
            })
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| "general".to_string())
    }
}

impl TopicClassifier for KeywordClassifier {
    fn classify(&self, candidate: &CandidateVideo, transcript: &str) -> TopicVerdict {
        let metadata = format!(
            "{}\n{}\n{}",
            candidate.title, candidate.description, candidate.channel_name
        );

        if let Some(found) = self.non_educational.find(&metadata) {
            return TopicVerdict::NonEducational {
                matched: found.as_str().to_lowercase(),
            };
        }

        let content = format!("{}\n{}\n{}", candidate.title, candidate.description, transcript);
        if !self.educational.is_match(&content) {
            return TopicVerdict::NoEducationalSignal;
        }

        TopicVerdict::Educational {
            category: self.category_for(&content),
        }
    }
}

//=========================================================================================
// Cleaning and Shaping
//=========================================================================================

fn noise_regex() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| {
        Regex::new(r"\[[^\]]*\]|\([^)]*\)|[♪♫]|>>").expect("static regex")
    })
}

/// Removes bracketed sound cues, parenthetical asides, music symbols and speaker
/// markers, then collapses whitespace.
pub fn clean_transcript(raw: &str) -> String {
    let stripped = noise_regex().replace_all(raw, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates `text` to at most `max_chars` characters, preferring to end on a
/// sentence boundary at or after `min_chars`. Falls back to the last whitespace in
/// that window, then to a hard cut.
pub fn truncate_at_sentence(text: &str, min_chars: usize, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let window_start = min_chars.min(max_chars);
    let terminal = |c: char| matches!(c, '.' | '!' | '?');
    // A terminator may be followed by a closing quote or bracket: `."` or `.)`.
    let sentence_end = (window_start..max_chars).rev().find(|&i| {
        let closes = terminal(chars[i])
            || (matches!(chars[i], '"' | '\'' | ')' | '\u{201D}' | '\u{2019}')
                && i > 0
                && terminal(chars[i - 1]));
        closes && chars.get(i + 1).map_or(true, |next| next.is_whitespace())
    });
    if let Some(end) = sentence_end {
        return chars[..=end].iter().collect();
    }

    let word_end = (window_start..max_chars).rev().find(|&i| chars[i].is_whitespace());
    let cut = word_end.unwrap_or(max_chars);
    chars[..cut].iter().collect::<String>().trim_end().to_string()
}

//=========================================================================================
// The Gate
//=========================================================================================

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub min_duration_secs: u32,
    pub min_transcript_chars: usize,
    /// Preferred lower bound of the truncation window.
    pub min_shaped_chars: usize,
    pub max_shaped_chars: usize,
    /// Minimum size of header plus transcript.
    pub min_payload_chars: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 180,
            min_transcript_chars: 500,
            min_shaped_chars: 4000,
            max_shaped_chars: 6000,
            min_payload_chars: 1000,
        }
    }
}

pub struct ValidationGate {
    config: GateConfig,
    classifier: Box<dyn TopicClassifier>,
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::new(GateConfig::default(), Box::new(KeywordClassifier::default()))
    }
}

impl ValidationGate {
    pub fn new(config: GateConfig, classifier: Box<dyn TopicClassifier>) -> Self {
        Self { config, classifier }
    }

    /// The duration rule on its own, so callers can reject before fetching a transcript.
    pub fn precheck(&self, candidate: &CandidateVideo) -> Result<(), RejectionReason> {
        if candidate.duration_seconds < self.config.min_duration_secs {
            return Err(RejectionReason::DurationTooShort);
        }
        Ok(())
    }

    pub fn validate(&self, candidate: &CandidateVideo, raw_transcript: &str) -> ValidationResult {
        match self.run_checks(candidate, raw_transcript) {
            Ok(accepted) => ValidationResult::Accepted(accepted),
            Err(reason) => ValidationResult::Rejected { reason },
        }
    }

    fn run_checks(
        &self,
        candidate: &CandidateVideo,
        raw_transcript: &str,
    ) -> Result<AcceptedContent, RejectionReason> {
        self.precheck(candidate)?;

        let clean = clean_transcript(raw_transcript);
        if clean.chars().count() < self.config.min_transcript_chars {
            return Err(RejectionReason::TranscriptTooShort);
        }

        let category = match self.classifier.classify(candidate, &clean) {
            TopicVerdict::Educational { category } => category,
            TopicVerdict::NoEducationalSignal => return Err(RejectionReason::NoEducationalSignal),
            TopicVerdict::NonEducational { .. } => {
                return Err(RejectionReason::NonEducationalContent)
            }
        };

        let body = truncate_at_sentence(
            &clean,
            self.config.min_shaped_chars,
            self.config.max_shaped_chars,
        );
        let shaped = format!(
            "Title: {}\nChannel: {}\nCategory: {}\nDuration: {} minutes\n\nTranscript:\n{}",
            candidate.title.trim(),
            candidate.channel_name.trim(),
            category,
            (candidate.duration_seconds + 59) / 60,
            body
        );
        if shaped.chars().count() < self.config.min_payload_chars {
            return Err(RejectionReason::InsufficientContent);
        }

        Ok(AcceptedContent {
            clean_transcript: clean,
            shaped_content: shaped,
            category,
        })
    }
}
