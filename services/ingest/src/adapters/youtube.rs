//! services/ingest/src/adapters/youtube.rs
//!
//! Video platform adapters over HTTP: the Data API `MetadataSource` and the
//! timed-text captions `TranscriptStrategy`.

use async_trait::async_trait;
use lesson_review_core::{
    captions::parse_vtt,
    domain::VideoMetadata,
    ports::{MetadataSource, PortError, PortResult, TranscriptStrategy},
};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::debug;

const DATA_API_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

/// Caption languages tried in order.
pub const CAPTION_LANGUAGES: [&str; 3] = ["en", "en-US", "en-GB"];

fn map_reqwest(e: reqwest::Error) -> PortError {
    if e.is_timeout() || e.is_connect() {
        PortError::Unavailable(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

fn map_status(status: StatusCode, body: &str) -> PortError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && body.contains("quotaExceeded"))
    {
        PortError::RateLimited(format!("{}: {}", status, body))
    } else if status.is_server_error() {
        PortError::Unavailable(format!("{}: {}", status, body))
    } else if status == StatusCode::NOT_FOUND {
        PortError::NotFound(status.to_string())
    } else {
        PortError::Unexpected(format!("{}: {}", status, body))
    }
}

//=========================================================================================
// ISO-8601 Durations
//=========================================================================================

fn duration_regex() -> &'static Regex {
    static DURATION: OnceLock<Regex> = OnceLock::new();
    DURATION.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("static regex")
    })
}

/// Parses the API's `PT#H#M#S` durations (with an optional day part) into seconds.
pub fn parse_iso8601_duration(value: &str) -> Option<u32> {
    let caps = duration_regex().captures(value.trim())?;
    let part = |i: usize| -> Option<u32> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(Some(0))
    };
    let total = part(1)?
        .checked_mul(86_400)?
        .checked_add(part(2)?.checked_mul(3_600)?)?
        .checked_add(part(3)?.checked_mul(60)?)?
        .checked_add(part(4)?)?;
    Some(total)
}

//=========================================================================================
// Data API Metadata Source
//=========================================================================================

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    snippet: Snippet,
    content_details: ContentDetails,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

impl VideoItem {
    fn into_metadata(self) -> PortResult<VideoMetadata> {
        let duration_seconds = parse_iso8601_duration(&self.content_details.duration).ok_or_else(|| {
            PortError::Unexpected(format!("unparseable duration '{}'", self.content_details.duration))
        })?;
        let thumbnails = self.snippet.thumbnails;
        let thumbnail_url = thumbnails
            .high
            .or(thumbnails.medium)
            .or(thumbnails.default)
            .map(|t| t.url);
        Ok(VideoMetadata {
            title: self.snippet.title,
            description: self.snippet.description,
            channel_name: self.snippet.channel_title,
            duration_seconds,
            thumbnail_url,
        })
    }
}

/// Implements `MetadataSource` with the platform's Data API.
#[derive(Clone)]
pub struct YouTubeMetadataAdapter {
    http: Client,
    api_key: String,
}

impl YouTubeMetadataAdapter {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl MetadataSource for YouTubeMetadataAdapter {
    async fn get_metadata(&self, external_id: &str) -> PortResult<VideoMetadata> {
        let response = self
            .http
            .get(DATA_API_URL)
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", external_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let list: VideoListResponse = response.json().await.map_err(map_reqwest)?;
        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| PortError::NotFound(format!("Video {} not found", external_id)))?;
        item.into_metadata()
    }
}

//=========================================================================================
// Timed-Text Captions Strategy
//=========================================================================================

/// Fetches published captions in WebVTT, trying each preferred language.
#[derive(Clone)]
pub struct TimedTextStrategy {
    http: Client,
}

impl TimedTextStrategy {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TranscriptStrategy for TimedTextStrategy {
    fn name(&self) -> &str {
        "platform-captions"
    }

    async fn fetch(&self, external_id: &str) -> PortResult<String> {
        for lang in CAPTION_LANGUAGES {
            let response = self
                .http
                .get(TIMEDTEXT_URL)
                .query(&[("v", external_id), ("lang", lang), ("fmt", "vtt")])
                .send()
                .await
                .map_err(map_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                match map_status(status, &body) {
                    PortError::NotFound(_) => continue,
                    other => return Err(other),
                }
            }

            let body = response.text().await.map_err(map_reqwest)?;
            let text = parse_vtt(&body);
            if !text.is_empty() {
                debug!(external_id, lang, chars = text.chars().count(), "Captions found");
                return Ok(text);
            }
        }
        Err(PortError::NotFound(format!("no captions for {}", external_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_durations() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), Some(253));
        assert_eq!(parse_iso8601_duration("PT1H"), Some(3600));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("P1DT2H"), Some(93_600));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(parse_iso8601_duration(""), None);
        assert_eq!(parse_iso8601_duration("4:13"), None);
        assert_eq!(parse_iso8601_duration("PT4X"), None);
    }

    #[test]
    fn video_item_maps_to_metadata() {
        let json = r#"{"items": [{
            "snippet": {
                "title": "Intro to Calculus",
                "description": "Limits and derivatives",
                "channelTitle": "Math Hall",
                "thumbnails": {"default": {"url": "d.jpg"}, "high": {"url": "h.jpg"}}
            },
            "contentDetails": {"duration": "PT12M30S"}
        }]}"#;
        let list: VideoListResponse = serde_json::from_str(json).unwrap();
        let metadata = list.items.into_iter().next().unwrap().into_metadata().unwrap();

        assert_eq!(metadata.title, "Intro to Calculus");
        assert_eq!(metadata.channel_name, "Math Hall");
        assert_eq!(metadata.duration_seconds, 750);
        assert_eq!(metadata.thumbnail_url.as_deref(), Some("h.jpg"));
    }

    #[test]
    fn quota_and_server_errors_are_retryable() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, r#"{"reason": "quotaExceeded"}"#),
            PortError::RateLimited(_)
        ));
        assert!(map_status(StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(!map_status(StatusCode::BAD_REQUEST, "bad key").is_retryable());
        assert!(matches!(map_status(StatusCode::NOT_FOUND, ""), PortError::NotFound(_)));
    }
}
