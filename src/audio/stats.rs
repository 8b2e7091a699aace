use dashmap::DashMap;
use serenity::model::id::UserId;
use std::{collections::HashMap, time::Duration};
use tracing::debug;

use crate::sources::TrackInfo;

/// Per-user listening totals. Kept in memory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStats {
    pub total_plays: u32,
    pub total_listened: Duration,
    pub songs: HashMap<String, u32>,
    pub eras: HashMap<String, u32>,
}

impl UserStats {
    pub fn top_songs(&self, limit: usize) -> Vec<(String, u32)> {
        top(&self.songs, limit)
    }

    pub fn top_eras(&self, limit: usize) -> Vec<(String, u32)> {
        top(&self.eras, limit)
    }
}

/// Highest counts first; ties by name so listings are stable.
fn top(counts: &HashMap<String, u32>, limit: usize) -> Vec<(String, u32)> {
    let mut entries: Vec<_> = counts.iter().map(|(name, count)| (name.clone(), *count)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(limit);
    entries
}

/// Listens recorded per requester, across every guild.
#[derive(Default)]
pub struct ListeningStats {
    users: DashMap<UserId, UserStats>,
}

impl ListeningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one started track for `user_id`.
    pub fn record_listen(&self, user_id: UserId, track: &TrackInfo) {
        let mut stats = self.users.entry(user_id).or_default();
        stats.total_plays += 1;
        if let Some(duration) = track.duration {
            stats.total_listened += duration;
        }
        *stats.songs.entry(track.title.clone()).or_insert(0) += 1;

        if let Some(era) = track.metadata.era.as_deref().map(str::trim).filter(|era| !era.is_empty()) {
            *stats.eras.entry(era.to_string()).or_insert(0) += 1;
        }

        debug!("📊 {} listen(s) recorded for user {}", stats.total_plays, user_id);
    }

    pub fn get(&self, user_id: UserId) -> Option<UserStats> {
        self.users.get(&user_id).map(|stats| stats.clone())
    }
}
