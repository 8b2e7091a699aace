//! # Sources Module
//!
//! Track descriptors and the stream-resolution port the playback core consumes.
//!
//! The core never talks HTTP itself. It asks a [`StreamResolver`] to turn a
//! catalog path into a time-limited stream URL, or to hand out a random
//! catalog entry for radio mode. [`catalog::CatalogClient`] is the production
//! implementation backed by the remote catalog API.

pub mod catalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::error::{PlaybackError, PlaybackResult};

pub use catalog::CatalogClient;

/// Outcome class of a stream resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    Success,
    NotFound,
    FileNotFound,
    HttpError,
    RequestError,
}

impl fmt::Display for ResolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResolveStatus::Success => "success",
            ResolveStatus::NotFound => "not_found",
            ResolveStatus::FileNotFound => "file_not_found",
            ResolveStatus::HttpError => "http_error",
            ResolveStatus::RequestError => "request_error",
        };
        f.write_str(text)
    }
}

/// Result of asking the catalog for a playable URL.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResolution {
    pub status: ResolveStatus,
    pub stream_url: Option<String>,
    pub error: Option<String>,
}

impl StreamResolution {
    pub fn success(stream_url: impl Into<String>) -> Self {
        Self {
            status: ResolveStatus::Success,
            stream_url: Some(stream_url.into()),
            error: None,
        }
    }

    pub fn failure(status: ResolveStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            stream_url: None,
            error: Some(error.into()),
        }
    }

    /// Any non-success status, or a success without a URL, is a resolution failure.
    pub fn into_url(self, subject: &str) -> PlaybackResult<String> {
        match (self.status, self.stream_url) {
            (ResolveStatus::Success, Some(url)) if !url.is_empty() => Ok(url),
            (ResolveStatus::Success, _) => Err(PlaybackError::resolution(
                subject,
                ResolveStatus::Success,
                "API did not return a stream URL",
            )),
            (status, _) => Err(PlaybackError::resolution(
                subject,
                status,
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

/// Descriptive fields shown by the player. Everything is optional because the
/// catalog frequently omits them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub song_id: Option<u64>,
    pub category: Option<String>,
    pub era: Option<String>,
    pub image_url: Option<String>,
}

/// A track as the core sees it: no stream URL, only what is needed to
/// resolve one and to render it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub source_path: Option<String>,
    pub metadata: TrackMetadata,
    pub duration: Option<Duration>,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, source_path: Option<String>) -> Self {
        Self {
            title: title.into(),
            source_path,
            metadata: TrackMetadata::default(),
            duration: None,
        }
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Human-readable subject for error messages.
    pub fn subject(&self) -> String {
        match &self.source_path {
            Some(path) => format!("`{}` (path `{}`)", self.title, path),
            None => format!("`{}`", self.title),
        }
    }
}

/// A random catalog pick. `stream_url` is only filled when it was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogTrack {
    pub info: TrackInfo,
    pub stream_url: Option<String>,
}

/// Port to the remote catalog/streaming API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolves a catalog path (or id) into a playable URL. Never fails hard:
    /// failures are encoded in the returned status.
    async fn resolve(&self, path: &str) -> StreamResolution;

    /// Picks a random catalog entry. The URL is resolved only when asked for.
    async fn random_track(&self, include_url: bool) -> Option<CatalogTrack>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_without_url_is_a_failure() {
        let resolution = StreamResolution {
            status: ResolveStatus::Success,
            stream_url: None,
            error: None,
        };
        let err = resolution.into_url("song `1`").unwrap_err();
        assert!(matches!(err, PlaybackError::Resolution { status: ResolveStatus::Success, .. }));
    }

    #[test]
    fn failure_keeps_status_and_detail() {
        let err = StreamResolution::failure(ResolveStatus::HttpError, "HTTP 502")
            .into_url("file `x`")
            .unwrap_err();
        assert_eq!(
            err,
            PlaybackError::resolution("file `x`", ResolveStatus::HttpError, "HTTP 502")
        );
    }

    #[test]
    fn subject_mentions_path_when_known() {
        let info = TrackInfo::new("Lucid Dreams", Some("Compilation/ld.mp3".into()));
        assert_eq!(info.subject(), "`Lucid Dreams` (path `Compilation/ld.mp3`)");
    }
}
