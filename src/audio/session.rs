use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use super::queue::{QueuedTrack, TrackQueue};
use crate::sources::TrackInfo;

/// The track currently owned by the voice transport.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: TrackInfo,
    pub is_radio: bool,
    pub requester: Option<UserId>,
    pub started_at: Instant,
    /// Set only while paused.
    pub paused_at: Option<Instant>,
    pub total_paused: Duration,
}

impl NowPlaying {
    pub fn new(track: TrackInfo, is_radio: bool, requester: Option<UserId>, now: Instant) -> Self {
        Self {
            track,
            is_radio,
            requester,
            started_at: now,
            paused_at: None,
            total_paused: Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Stamps the start of a pause. A second pause while paused is ignored.
    pub fn mark_paused(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Folds the running pause interval into `total_paused`.
    pub fn mark_resumed(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.total_paused += now.saturating_duration_since(paused_at);
        }
    }

    /// Playback position: `(paused_at or now) - started_at - total_paused`,
    /// clamped to `[0, duration]`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let reference = self.paused_at.unwrap_or(now);
        let elapsed = reference
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.total_paused);

        match self.track.duration {
            Some(duration) => elapsed.min(duration),
            None => elapsed,
        }
    }
}

/// What the session is doing, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    PlayingQueued,
    PlayingRadio,
    Paused,
}

/// Handle to the one "now playing" message of a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiMessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Mutable record for one guild.
#[derive(Debug)]
pub struct SessionState {
    pub guild_id: GuildId,
    now_playing: Option<NowPlaying>,
    pub queue: TrackQueue,
    pub radio_enabled: bool,
    /// Prefetched radio candidate. Metadata only, never a stream URL.
    pub radio_next: Option<TrackInfo>,
    previous: Option<TrackInfo>,
    history: VecDeque<TrackInfo>,
    history_limit: usize,
    pub last_activity: Option<Instant>,
    pub ui_message: Option<UiMessageRef>,
    /// Where the player message is posted.
    pub text_channel: Option<ChannelId>,
    /// Bumped on every play and every teardown; completions carrying an older
    /// value are stale.
    pub epoch: u64,
    pub radio_failures: u32,
}

impl SessionState {
    pub fn new(guild_id: GuildId, history_limit: usize, max_queue_size: usize) -> Self {
        Self {
            guild_id,
            now_playing: None,
            queue: TrackQueue::new(max_queue_size),
            radio_enabled: false,
            radio_next: None,
            previous: None,
            history: VecDeque::with_capacity(history_limit),
            history_limit,
            last_activity: None,
            ui_message: None,
            text_channel: None,
            epoch: 0,
            radio_failures: 0,
        }
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn now_playing_mut(&mut self) -> Option<&mut NowPlaying> {
        self.now_playing.as_mut()
    }

    pub fn previous(&self) -> Option<&TrackInfo> {
        self.previous.as_ref()
    }

    /// Most recent first.
    pub fn history(&self) -> Vec<TrackInfo> {
        self.history.iter().cloned().collect()
    }

    pub fn state(&self) -> PlaybackState {
        match &self.now_playing {
            None => PlaybackState::Idle,
            Some(np) if np.is_paused() => PlaybackState::Paused,
            Some(np) if np.is_radio => PlaybackState::PlayingRadio,
            Some(_) => PlaybackState::PlayingQueued,
        }
    }

    /// Installs a new current track, archiving the outgoing one.
    pub fn start_track(
        &mut self,
        track: TrackInfo,
        is_radio: bool,
        requester: Option<UserId>,
        now: Instant,
    ) {
        self.archive_current();
        self.now_playing = Some(NowPlaying::new(track, is_radio, requester, now));
        self.last_activity = Some(now);
    }

    /// Clears the current track, archiving it if there was one.
    pub fn set_idle(&mut self) {
        self.archive_current();
    }

    fn archive_current(&mut self) {
        if let Some(outgoing) = self.now_playing.take() {
            self.previous = Some(outgoing.track.clone());
            self.history.push_front(outgoing.track);
            self.history.truncate(self.history_limit);
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    pub fn bump_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id,
            state: self.state(),
            now_playing: self.now_playing.clone(),
            queue: self.queue.to_vec(),
            radio_enabled: self.radio_enabled,
            radio_next: self.radio_next.clone(),
            previous: self.previous.clone(),
            history: self.history(),
            ui_message: self.ui_message,
            text_channel: self.text_channel,
        }
    }
}

/// Detached copy of a session, safe to render without holding its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub state: PlaybackState,
    pub now_playing: Option<NowPlaying>,
    pub queue: Vec<QueuedTrack>,
    pub radio_enabled: bool,
    pub radio_next: Option<TrackInfo>,
    pub previous: Option<TrackInfo>,
    pub history: Vec<TrackInfo>,
    pub ui_message: Option<UiMessageRef>,
    pub text_channel: Option<ChannelId>,
}

impl SessionSnapshot {
    /// What the player advertises as next: the queue head, or the radio
    /// candidate when the queue is empty.
    pub fn up_next(&self) -> Option<&str> {
        match self.queue.first() {
            Some(item) => Some(item.title()),
            None if self.radio_enabled => self.radio_next.as_ref().map(|t| t.title.as_str()),
            None => None,
        }
    }
}

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Keyed store of sessions. Each entry has its own lock; guilds never contend.
pub struct SessionStore {
    sessions: DashMap<GuildId, SharedSession>,
    history_limit: usize,
    max_queue_size: usize,
}

impl SessionStore {
    pub fn new(history_limit: usize, max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            history_limit,
            max_queue_size,
        }
    }

    /// Allocated lazily on first use and kept for the process lifetime.
    pub fn get_or_create(&self, guild_id: GuildId) -> SharedSession {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionState::new(
                    guild_id,
                    self.history_limit,
                    self.max_queue_size,
                )))
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SharedSession> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn guilds(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<SessionSnapshot> {
        let session = self.get(guild_id)?;
        let state = session.lock().await;
        Some(state.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str, secs: u64) -> TrackInfo {
        TrackInfo::new(title, Some(format!("{}.mp3", title))).with_duration(Duration::from_secs(secs))
    }

    fn session() -> SessionState {
        SessionState::new(GuildId::new(1), 3, 10)
    }

    #[tokio::test(start_paused = true)]
    async fn pause_accounting_sums_every_interval() {
        let start = Instant::now();
        let mut np = NowPlaying::new(track("a", 600), false, None, start);

        let pauses = [3u64, 7, 1, 12];
        let mut now = start;
        for secs in pauses {
            now += Duration::from_secs(4);
            np.mark_paused(now);
            // Double pause must not restart the interval.
            np.mark_paused(now + Duration::from_secs(1));
            now += Duration::from_secs(secs);
            np.mark_resumed(now);
        }

        assert_eq!(np.total_paused, Duration::from_secs(pauses.iter().sum()));
        assert_eq!(np.elapsed_at(now), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_then_resume_reports_elapsed_minus_paused_time() {
        let start = Instant::now();
        let mut np = NowPlaying::new(track("a", 300), false, None, start);

        np.mark_paused(start + Duration::from_secs(10));
        assert_eq!(np.elapsed_at(start + Duration::from_secs(14)), Duration::from_secs(10));

        np.mark_resumed(start + Duration::from_secs(15));
        assert_eq!(np.elapsed_at(start + Duration::from_secs(20)), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_clamped_to_duration() {
        let start = Instant::now();
        let np = NowPlaying::new(track("a", 30), false, None, start);
        assert_eq!(np.elapsed_at(start + Duration::from_secs(90)), Duration::from_secs(30));

        let unknown = NowPlaying::new(TrackInfo::new("b", None), false, None, start);
        assert_eq!(unknown.elapsed_at(start + Duration::from_secs(90)), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_archive_outgoing_track_once() {
        let mut state = session();
        state.set_idle();
        assert!(state.previous().is_none());
        assert!(state.history().is_empty());

        for title in ["a", "b", "c", "d"] {
            state.start_track(track(title, 60), false, None, Instant::now());
        }
        state.set_idle();
        state.set_idle();

        assert_eq!(state.previous().map(|t| t.title.as_str()), Some("d"));
        let titles: Vec<_> = state.history().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["d", "c", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_derived_from_fields() {
        let mut state = session();
        assert_eq!(state.state(), PlaybackState::Idle);

        state.start_track(track("r", 60), true, None, Instant::now());
        assert_eq!(state.state(), PlaybackState::PlayingRadio);

        state.start_track(track("q", 60), false, None, Instant::now());
        assert_eq!(state.state(), PlaybackState::PlayingQueued);

        if let Some(np) = state.now_playing_mut() {
            np.mark_paused(Instant::now());
        }
        assert_eq!(state.state(), PlaybackState::Paused);
    }

    #[test]
    fn up_next_prefers_queue_over_radio_candidate() {
        let mut state = session();
        state.radio_enabled = true;
        state.radio_next = Some(track("radio", 60));
        assert_eq!(state.snapshot().up_next(), Some("radio"));

        state
            .queue
            .enqueue(QueuedTrack::new(track("queued", 60), None, None))
            .unwrap();
        assert_eq!(state.snapshot().up_next(), Some("queued"));
    }

    #[tokio::test]
    async fn store_hands_out_one_session_per_guild() {
        let store = SessionStore::new(10, 10);
        let a = store.get_or_create(GuildId::new(1));
        let b = store.get_or_create(GuildId::new(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.get(GuildId::new(2)).is_none());

        a.lock().await.radio_enabled = true;
        let snapshot = store.snapshot(GuildId::new(1)).await.unwrap();
        assert!(snapshot.radio_enabled);
        assert_eq!(store.guilds(), vec![GuildId::new(1)]);
    }
}
