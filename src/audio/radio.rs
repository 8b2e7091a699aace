use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use super::session::SessionState;
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{CatalogTrack, ResolveStatus, StreamResolver, TrackInfo},
};

/// Delay policy between failed radio attempts.
///
/// Starts at `base` after a stream miss (or `after_error` when the clip that
/// just ended errored), doubles per consecutive failure and stops growing at
/// `max_delay`. `max_failures == 0` never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioBackoff {
    pub base: Duration,
    pub after_error: Duration,
    pub max_delay: Duration,
    pub max_failures: u32,
}

impl RadioBackoff {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            base: Duration::from_millis(config.radio_retry_base_ms),
            after_error: Duration::from_millis(config.radio_retry_error_ms),
            max_delay: Duration::from_secs(config.radio_retry_max_delay_secs),
            max_failures: config.radio_max_failures,
        }
    }

    /// Delay before the next attempt, given how many attempts failed in a row.
    pub fn delay(&self, consecutive_failures: u32, clip_errored: bool) -> Duration {
        let start = if clip_errored { self.after_error } else { self.base };
        let doublings = consecutive_failures.saturating_sub(1).min(16);
        start.saturating_mul(1 << doublings).min(self.max_delay)
    }

    pub fn exhausted(&self, consecutive_failures: u32) -> bool {
        self.max_failures != 0 && consecutive_failures >= self.max_failures
    }
}

impl Default for RadioBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            after_error: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_failures: 10,
        }
    }
}

/// Random-pick source for radio mode.
pub struct RadioController {
    resolver: Arc<dyn StreamResolver>,
}

impl RadioController {
    pub fn new(resolver: Arc<dyn StreamResolver>) -> Self {
        Self { resolver }
    }

    /// Random catalog entry; the URL is only fetched when `include_url` is set.
    pub async fn fetch_random(&self, include_url: bool) -> PlaybackResult<CatalogTrack> {
        let pick = self
            .resolver
            .random_track(include_url)
            .await
            .ok_or_else(|| PlaybackError::Catalog("no random track available".to_string()))?;

        if include_url && pick.stream_url.as_deref().map_or(true, str::is_empty) {
            return Err(PlaybackError::resolution(
                pick.info.subject(),
                ResolveStatus::Success,
                "random pick came back without a stream URL",
            ));
        }

        Ok(pick)
    }

    /// Warms `radio_next` with metadata only. Failures leave it empty.
    pub async fn prefetch_next(&self, session: &mut SessionState) {
        match self.fetch_random(false).await {
            Ok(pick) => {
                debug!("📻 Guild {}: prefetched {}", session.guild_id, pick.info.title);
                session.radio_next = Some(pick.info);
            }
            Err(e) => {
                warn!("📻 Guild {}: prefetch failed: {}", session.guild_id, e);
                session.radio_next = None;
            }
        }
    }

    /// Next radio track with a URL resolved right now.
    ///
    /// A prefetched candidate is consumed whether or not its resolution
    /// succeeds, so a dead path is never retried.
    pub async fn resolve_for_playback(&self, session: &mut SessionState) -> PlaybackResult<(TrackInfo, String)> {
        if let Some(candidate) = session.radio_next.take() {
            let Some(path) = candidate.source_path.clone() else {
                return Err(PlaybackError::resolution(
                    candidate.subject(),
                    ResolveStatus::NotFound,
                    "prefetched track has no path",
                ));
            };

            let url = self.resolver.resolve(&path).await.into_url(&candidate.subject())?;
            info!("📻 Guild {}: playing prefetched {}", session.guild_id, candidate.title);
            return Ok((candidate, url));
        }

        let pick = self.fetch_random(true).await?;
        let subject = pick.info.subject();
        let url = pick.stream_url.ok_or_else(|| {
            PlaybackError::resolution(subject, ResolveStatus::Success, "missing stream URL")
        })?;
        Ok((pick.info, url))
    }
}
