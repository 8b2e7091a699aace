use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CatalogTrack, ResolveStatus, StreamResolution, StreamResolver, TrackInfo, TrackMetadata};

/// Cliente HTTP del catálogo remoto.
///
/// Holds one pooled `reqwest::Client` for the lifetime of the bot so guilds
/// never wait on each other for a connection.
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
}

/// Song object embedded in radio picks and returned by the songs endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongRecord {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub length: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    /// Either an era object (`{"name": ...}`) or a bare string.
    pub era: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RadioPick {
    title: Option<String>,
    path: Option<String>,
    id: Option<Value>,
    song: Option<SongRecord>,
}

impl CatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wrld-radio/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build catalog HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Shared client, reused by the voice layer to fetch the audio itself.
    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn download_url(&self, path: &str) -> String {
        format!(
            "{}/juicewrld/files/download/?path={}",
            self.base_url,
            urlencoding::encode(path)
        )
    }

    /// Looks a song up by catalog id.
    pub async fn get_song(&self, song_id: u64) -> Result<SongRecord> {
        let url = format!("{}/juicewrld/songs/{}/", self.base_url, song_id);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("request for song {} failed", song_id))?;

        if response.status() == StatusCode::NOT_FOUND {
            anyhow::bail!("No song found with ID `{}` in the catalog", song_id);
        }

        let song = response
            .error_for_status()
            .with_context(|| format!("catalog returned an error for song {}", song_id))?
            .json::<SongRecord>()
            .await
            .context("invalid song payload")?;

        Ok(song)
    }

    /// Builds the core track descriptor from a catalog song.
    pub fn track_from_song(&self, song: &SongRecord, path: Option<String>, fallback_title: &str) -> TrackInfo {
        let title = song
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| fallback_title.to_string());

        let mut info = TrackInfo::new(title, path).with_metadata(TrackMetadata {
            song_id: song.id,
            category: song.category.clone().filter(|c| !c.is_empty()),
            era: era_name(song.era.as_ref()),
            image_url: self.normalize_image_url(song.image_url.as_deref()),
        });

        if let Some(duration) = song.length.as_deref().and_then(parse_length) {
            info = info.with_duration(duration);
        }

        info
    }

    /// Relative image paths (`/assets/...`) become absolute against the API root.
    fn normalize_image_url(&self, image_url: Option<&str>) -> Option<String> {
        match image_url {
            Some(url) if url.starts_with('/') => Some(format!("{}{}", self.base_url, url)),
            Some(url) if !url.is_empty() => Some(url.to_string()),
            _ => None,
        }
    }

    async fn fetch_radio_pick(&self) -> Result<RadioPick> {
        let url = format!("{}/juicewrld/radio/random/", self.base_url);
        let pick = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .context("radio request failed")?
            .error_for_status()
            .context("radio endpoint returned an error")?
            .json::<RadioPick>()
            .await
            .context("invalid radio payload")?;

        Ok(pick)
    }
}

#[async_trait]
impl StreamResolver for CatalogClient {
    async fn resolve(&self, path: &str) -> StreamResolution {
        let stream_url = self.download_url(path);

        let response = self
            .client
            .get(&stream_url)
            .header(header::RANGE, "bytes=0-0")
            .send()
            .await;

        match response {
            Ok(resp) if matches!(resp.status(), StatusCode::OK | StatusCode::PARTIAL_CONTENT) => {
                debug!("🎯 Stream validado para {}", path);
                StreamResolution::success(stream_url)
            }
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                StreamResolution::failure(ResolveStatus::FileNotFound, "Audio file not found")
            }
            Ok(resp) => StreamResolution::failure(
                ResolveStatus::HttpError,
                format!("HTTP {}", resp.status().as_u16()),
            ),
            Err(e) => StreamResolution::failure(ResolveStatus::RequestError, format!("Request failed: {}", e)),
        }
    }

    async fn random_track(&self, include_url: bool) -> Option<CatalogTrack> {
        let pick = match self.fetch_radio_pick().await {
            Ok(pick) => pick,
            Err(e) => {
                warn!("📻 Radio: failed to fetch random song: {:#}", e);
                return None;
            }
        };

        // `path` and `id` both carry the comp file path.
        let path = pick.path.clone().or_else(|| match &pick.id {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })?;

        let fallback_title = pick.title.clone().unwrap_or_else(|| "Unknown".to_string());
        let song = pick.song.unwrap_or_default();
        let info = self.track_from_song(&song, Some(path.clone()), &fallback_title);

        let stream_url = if include_url {
            let resolution = self.resolve(&path).await;
            if resolution.status != ResolveStatus::Success {
                warn!("📻 Radio: could not stream `{}`: {}", path, resolution.status);
                return None;
            }
            Some(resolution.stream_url?)
        } else {
            None
        };

        info!("📻 Radio pick: {}", info.title);
        Some(CatalogTrack { info, stream_url })
    }
}

fn era_name(era: Option<&Value>) -> Option<String> {
    let name = match era? {
        Value::Object(map) => map.get("name")?.as_str()?.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Parses `"3:45"` or `"01:02:03"` into a duration.
pub fn parse_length(length: &str) -> Option<Duration> {
    let parts = length
        .trim()
        .split(':')
        .map(|part| part.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let seconds = match parts.as_slice() {
        [minutes, seconds] => minutes.checked_mul(60)?.checked_add(*seconds)?,
        [hours, minutes, seconds] => hours
            .checked_mul(3600)?
            .checked_add(minutes.checked_mul(60)?)?
            .checked_add(*seconds)?,
        _ => return None,
    };

    Some(Duration::from_secs(seconds))
}
