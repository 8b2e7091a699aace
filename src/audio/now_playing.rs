//! Keeps one "now playing" message per guild in step with its session.
//!
//! The sequencer and the reaper only *notify* ([`SessionObserver`]); a single
//! worker task owns every message edit, so two renders for a guild can never
//! race into two messages.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{
    session::{PlaybackState, SessionSnapshot, SessionStore, UiMessageRef},
    transport::VoiceGateway,
};

const PROGRESS_WIDTH: usize = 10;

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    Inactivity,
    ChannelEmpty,
    BotDisconnected,
    Requested,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TeardownReason::Inactivity => "inactivity",
            TeardownReason::ChannelEmpty => "an empty voice channel",
            TeardownReason::BotDisconnected => "being removed from voice",
            TeardownReason::Requested => "a leave request",
        };
        f.write_str(text)
    }
}

/// What changed in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    NowPlaying,
    Queue,
    RadioNext,
    /// Not sent for silent enqueues.
    TrackQueued { title: String, position: usize },
    TornDown(TeardownReason),
    RadioGaveUp { failures: u32 },
}

/// Hook called on every session change. Must not block.
pub trait SessionObserver: Send + Sync {
    fn notify(&self, guild_id: GuildId, change: SessionChange);
}

/// Where the player message lives (Discord in production).
#[async_trait]
pub trait NowPlayingSink: Send + Sync {
    async fn edit(&self, message: UiMessageRef, view: &PlayerView) -> anyhow::Result<()>;

    async fn send(&self, channel_id: ChannelId, view: &PlayerView) -> anyhow::Result<UiMessageRef>;

    async fn delete(&self, message: UiMessageRef) -> anyhow::Result<()>;

    /// Short standalone text message.
    async fn notice(&self, channel_id: ChannelId, text: &str) -> anyhow::Result<()>;
}

/// Render-ready player state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub state: PlaybackState,
    /// `None` while idle.
    pub title: Option<String>,
    pub category: Option<String>,
    pub era: Option<String>,
    pub thumbnail: Option<String>,
    pub progress: Option<String>,
    pub requester: Option<UserId>,
    pub previous: Option<String>,
    pub queue_len: usize,
    pub up_next: Option<String>,
    pub radio_enabled: bool,
}

impl PlayerView {
    pub fn from_snapshot(snapshot: &SessionSnapshot, now: Instant) -> Self {
        let np = snapshot.now_playing.as_ref();

        let progress = np.and_then(|np| {
            let duration = np.track.duration?;
            let bar = progress_bar(np.elapsed_at(now), duration);
            Some(if np.is_paused() { format!("⏸️ {}", bar) } else { bar })
        });

        Self {
            state: snapshot.state,
            title: np.map(|np| np.track.title.clone()),
            category: np.and_then(|np| np.track.metadata.category.clone()),
            era: np.and_then(|np| np.track.metadata.era.clone()),
            thumbnail: np.and_then(|np| np.track.metadata.image_url.clone()),
            progress,
            requester: np.and_then(|np| np.requester),
            previous: snapshot.previous.as_ref().map(|t| t.title.clone()),
            queue_len: snapshot.queue.len(),
            up_next: snapshot.up_next().map(str::to_string),
            radio_enabled: snapshot.radio_enabled,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == PlaybackState::Idle
    }

    /// `"N track(s)\nUp Next: **x**"`, or just the radio candidate when the
    /// queue is empty.
    pub fn queue_field(&self) -> Option<String> {
        match (&self.up_next, self.queue_len) {
            (Some(next), 0) => Some(format!("Up Next: **{}**", next)),
            (Some(next), len) => Some(format!("{} track(s)\nUp Next: **{}**", len, next)),
            (None, 0) => None,
            (None, len) => Some(format!("{} track(s)", len)),
        }
    }

    pub fn footer(&self) -> &'static str {
        if self.radio_enabled {
            "Radio mode is ON"
        } else {
            "Radio mode is OFF"
        }
    }
}

/// `▮▮▮▯▯▯▯▯▯▯ 01:05 / 03:30`
pub fn progress_bar(elapsed: Duration, duration: Duration) -> String {
    let total = duration.as_secs();
    let current = elapsed.as_secs().min(total);

    if total == 0 || current == 0 {
        return format!("{} / {}", format_clock(Duration::ZERO), format_clock(duration));
    }

    let filled = (PROGRESS_WIDTH as u64 * current / total) as usize;
    format!(
        "{}{} {} / {}",
        "▮".repeat(filled),
        "▯".repeat(PROGRESS_WIDTH - filled),
        format_clock(Duration::from_secs(current)),
        format_clock(duration)
    )
}

/// `MM:SS`, or `H:MM:SS` past one hour.
pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[derive(Debug)]
enum SyncRequest {
    Render(GuildId),
    Notice(GuildId, String),
    TornDown(GuildId, TeardownReason),
}

impl SyncRequest {
    fn guild_id(&self) -> GuildId {
        match self {
            Self::Render(guild_id) | Self::Notice(guild_id, _) | Self::TornDown(guild_id, _) => *guild_id,
        }
    }
}

/// Observer half: cheap to clone, never blocks.
#[derive(Clone)]
pub struct NowPlayingSync {
    tx: mpsc::UnboundedSender<SyncRequest>,
}

impl NowPlayingSync {
    pub fn new(
        sessions: Arc<SessionStore>,
        gateway: Arc<dyn VoiceGateway>,
        sink: Arc<dyn NowPlayingSink>,
        refresh: Duration,
        delete_delay: Duration,
    ) -> (Self, NowPlayingWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = NowPlayingWorker {
            sessions,
            gateway,
            sink,
            rx,
            refresh,
            delete_delay,
            deferred: Mutex::new(Vec::new()),
        };
        (Self { tx }, worker)
    }

    fn push(&self, request: SyncRequest) {
        if self.tx.send(request).is_err() {
            debug!("Now-playing worker stopped; update dropped");
        }
    }
}

impl SessionObserver for NowPlayingSync {
    fn notify(&self, guild_id: GuildId, change: SessionChange) {
        match change {
            SessionChange::NowPlaying | SessionChange::Queue | SessionChange::RadioNext => {
                self.push(SyncRequest::Render(guild_id))
            }
            SessionChange::TrackQueued { title, position } => {
                self.push(SyncRequest::Notice(
                    guild_id,
                    format!("📥 Queued **{}** (position {})", title, position),
                ));
                self.push(SyncRequest::Render(guild_id));
            }
            SessionChange::RadioGaveUp { failures } => {
                self.push(SyncRequest::Notice(
                    guild_id,
                    format!("📻 Radio turned off after {} failed attempts", failures),
                ));
                self.push(SyncRequest::Render(guild_id));
            }
            SessionChange::TornDown(reason) => self.push(SyncRequest::TornDown(guild_id, reason)),
        }
    }
}

/// Worker half: owns every sink call.
///
/// Never waits on a session lock. A guild whose lock is held (the sequencer
/// may be talking to the catalog) has its requests parked until the next
/// tick, in arrival order, so other guilds keep updating.
pub struct NowPlayingWorker {
    sessions: Arc<SessionStore>,
    gateway: Arc<dyn VoiceGateway>,
    sink: Arc<dyn NowPlayingSink>,
    rx: mpsc::UnboundedReceiver<SyncRequest>,
    refresh: Duration,
    delete_delay: Duration,
    deferred: Mutex<Vec<SyncRequest>>,
}

impl NowPlayingWorker {
    pub async fn run(mut self) {
        let mut ticker = time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("🖼️ Now-playing sync started (refresh every {:?})", self.refresh);

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = ticker.tick() => self.tick().await,
            }
        }

        debug!("🛑 Now-playing sync stopped");
    }

    async fn handle(&self, request: SyncRequest) {
        let guild_id = request.guild_id();
        let parked = self.deferred.lock().iter().any(|r| r.guild_id() == guild_id);
        if parked {
            self.deferred.lock().push(request);
            return;
        }

        let done = match &request {
            SyncRequest::Render(guild_id) => self.render(*guild_id).await,
            SyncRequest::Notice(guild_id, text) => self.notice(*guild_id, text).await,
            SyncRequest::TornDown(guild_id, reason) => self.torn_down(*guild_id, *reason).await,
        };
        if !done {
            debug!("Guild {}: session busy, update parked until next tick", guild_id);
            self.deferred.lock().push(request);
        }
    }

    /// Replays parked requests, then refreshes progress for guilds whose
    /// transport is playing or paused. Busy guilds wait for the next tick.
    pub async fn tick(&self) {
        let parked = std::mem::take(&mut *self.deferred.lock());
        for request in parked {
            self.handle(request).await;
        }

        for guild_id in self.gateway.connected_guilds() {
            let Some(transport) = self.gateway.transport(guild_id) else {
                continue;
            };
            if transport.is_active().await && !self.render(guild_id).await {
                debug!("Guild {}: session busy, progress refresh skipped", guild_id);
            }
        }
    }

    /// Edits the cached message, sending a new one only when the edit fails.
    /// Returns `false`, without touching the sink, when the session is locked.
    pub async fn render(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.sessions.get(guild_id) else {
            return true;
        };
        let Ok(state) = session.try_lock() else {
            return false;
        };
        let snapshot = state.snapshot();
        drop(state);

        let Some(channel_id) = snapshot.text_channel else {
            debug!("Guild {}: no text channel bound, skipping render", guild_id);
            return true;
        };

        let view = PlayerView::from_snapshot(&snapshot, Instant::now());

        if let Some(existing) = snapshot.ui_message {
            match self.sink.edit(existing, &view).await {
                Ok(()) => return true,
                Err(e) => debug!("Guild {}: player edit failed ({:#}), sending new message", guild_id, e),
            }
        } else if view.is_idle() {
            // Nothing on screen and nothing to show.
            return true;
        }

        match self.sink.send(channel_id, &view).await {
            Ok(message) => {
                let stored = session
                    .try_lock()
                    .map(|mut state| state.ui_message = Some(message))
                    .is_ok();
                if !stored {
                    tokio::spawn(async move {
                        session.lock().await.ui_message = Some(message);
                    });
                }
            }
            Err(e) => warn!("⚠️ Guild {}: could not send player message: {:#}", guild_id, e),
        }
        true
    }

    async fn notice(&self, guild_id: GuildId, text: &str) -> bool {
        let Some(session) = self.sessions.get(guild_id) else {
            return true;
        };
        let Ok(state) = session.try_lock() else {
            return false;
        };
        let Some(channel_id) = state.text_channel else {
            return true;
        };
        drop(state);

        if let Err(e) = self.sink.notice(channel_id, text).await {
            warn!("⚠️ Guild {}: could not post notice: {:#}", guild_id, e);
        }
        true
    }

    async fn torn_down(&self, guild_id: GuildId, reason: TeardownReason) -> bool {
        let Some(session) = self.sessions.get(guild_id) else {
            return true;
        };
        let (message, channel_id) = match session.try_lock() {
            Ok(mut state) => (state.ui_message.take(), state.text_channel),
            Err(_) => return false,
        };

        if let Some(channel_id) = channel_id {
            if reason != TeardownReason::Requested {
                let text = format!("👋 Disconnected due to {}.", reason);
                if let Err(e) = self.sink.notice(channel_id, &text).await {
                    warn!("⚠️ Guild {}: could not post teardown notice: {:#}", guild_id, e);
                }
            }
        }

        if let Some(message) = message {
            let sink = self.sink.clone();
            let delay = self.delete_delay;
            tokio::spawn(async move {
                time::sleep(delay).await;
                if let Err(e) = sink.delete(message).await {
                    debug!("Player message already gone: {:#}", e);
                }
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::testing::{FakeGateway, RecordingSink, SinkCall},
        sources::{TrackInfo, TrackMetadata},
    };
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);
    const TEXT: ChannelId = ChannelId::new(50);

    fn track(title: &str, secs: u64) -> TrackInfo {
        TrackInfo::new(title, Some(format!("{}.mp3", title)))
            .with_duration(Duration::from_secs(secs))
            .with_metadata(TrackMetadata {
                category: Some("unreleased".into()),
                era: Some("DRFL".into()),
                ..TrackMetadata::default()
            })
    }

    fn worker(sink: Arc<RecordingSink>, gateway: Arc<FakeGateway>) -> (Arc<SessionStore>, NowPlayingWorker) {
        let sessions = Arc::new(SessionStore::new(10, 10));
        let (_sync, worker) = NowPlayingSync::new(
            sessions.clone(),
            gateway,
            sink,
            Duration::from_secs(5),
            Duration::from_secs(1),
        );
        (sessions, worker)
    }

    #[test]
    fn progress_bar_matches_player_format() {
        assert_eq!(
            progress_bar(Duration::from_secs(63), Duration::from_secs(210)),
            "▮▮▮▯▯▯▯▯▯▯ 01:03 / 03:30"
        );
        assert_eq!(progress_bar(Duration::ZERO, Duration::from_secs(90)), "00:00 / 01:30");
        assert_eq!(
            progress_bar(Duration::from_secs(500), Duration::from_secs(100)),
            "▮▮▮▮▮▮▮▮▮▮ 01:40 / 01:40"
        );
        assert_eq!(format_clock(Duration::from_secs(3723)), "1:02:03");
    }

    #[tokio::test(start_paused = true)]
    async fn view_shows_pause_marker_and_radio_candidate() {
        let mut state = crate::audio::session::SessionState::new(GUILD, 10, 10);
        let start = Instant::now();
        state.start_track(track("Lucid Dreams", 240), true, None, start);
        state.radio_enabled = true;
        state.radio_next = Some(track("Robbery", 200));
        if let Some(np) = state.now_playing_mut() {
            np.mark_paused(start + Duration::from_secs(24));
        }

        let view = PlayerView::from_snapshot(&state.snapshot(), start + Duration::from_secs(60));
        assert_eq!(view.title.as_deref(), Some("Lucid Dreams"));
        assert_eq!(view.progress.as_deref(), Some("⏸️ ▮▯▯▯▯▯▯▯▯▯ 00:24 / 04:00"));
        assert_eq!(view.queue_field().as_deref(), Some("Up Next: **Robbery**"));
        assert_eq!(view.footer(), "Radio mode is ON");
        assert_eq!(view.era.as_deref(), Some("DRFL"));
    }

    #[tokio::test]
    async fn render_edits_in_place_and_resends_only_on_failure() {
        let sink = Arc::new(RecordingSink::default());
        let gateway = Arc::new(FakeGateway::default());
        let (sessions, worker) = worker(sink.clone(), gateway);

        let session = sessions.get_or_create(GUILD);
        {
            let mut state = session.lock().await;
            state.text_channel = Some(TEXT);
            state.start_track(track("a", 100), false, None, Instant::now());
        }

        worker.render(GUILD).await;
        worker.render(GUILD).await;
        assert_eq!(sink.count(|c| matches!(c, SinkCall::Send(_))), 1);
        assert_eq!(sink.count(|c| matches!(c, SinkCall::Edit(_))), 1);

        sink.fail_edits(true);
        worker.render(GUILD).await;
        assert_eq!(sink.count(|c| matches!(c, SinkCall::Send(_))), 2);
        let current = session.lock().await.ui_message;
        assert_eq!(current.map(|m| m.message_id.get()), Some(2));
    }

    #[tokio::test]
    async fn idle_session_without_message_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let (sessions, worker) = worker(sink.clone(), Arc::new(FakeGateway::default()));
        sessions.get_or_create(GUILD).lock().await.text_channel = Some(TEXT);

        worker.render(GUILD).await;
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn tick_skips_inactive_guilds() {
        let sink = Arc::new(RecordingSink::default());
        let gateway = Arc::new(FakeGateway::default());
        let (sessions, worker) = worker(sink.clone(), gateway.clone());

        for id in [1u64, 2] {
            let guild = GuildId::new(id);
            let mut state = sessions.get_or_create(guild).lock_owned().await;
            state.text_channel = Some(TEXT);
            state.start_track(track("a", 100), false, None, Instant::now());
        }
        gateway.connect_fake(GuildId::new(1)).set_active(true);
        gateway.connect_fake(GuildId::new(2));

        worker.tick().await;
        assert_eq!(sink.count(|c| matches!(c, SinkCall::Send(_))), 1);
    }

    #[tokio::test]
    async fn busy_guild_does_not_hold_up_the_others() {
        let sink = Arc::new(RecordingSink::default());
        let gateway = Arc::new(FakeGateway::default());
        let (sessions, worker) = worker(sink.clone(), gateway.clone());

        for id in [1u64, 2] {
            let guild = GuildId::new(id);
            let mut state = sessions.get_or_create(guild).lock_owned().await;
            state.text_channel = Some(ChannelId::new(50 + id));
            state.start_track(track("a", 100), false, None, Instant::now());
            gateway.connect_fake(guild).set_active(true);
        }

        // Guild 1 is mid-transition, e.g. waiting on the catalog.
        let held = sessions.get(GuildId::new(1)).unwrap().lock_owned().await;
        worker.handle(SyncRequest::Notice(GuildId::new(1), "queued".into())).await;
        worker.tick().await;
        assert_eq!(sink.calls(), vec![SinkCall::Send(ChannelId::new(52))]);

        drop(held);
        worker.tick().await;
        let calls = sink.calls();
        assert_eq!(calls[1], SinkCall::Notice("queued".into()));
        assert_eq!(sink.count(|c| *c == SinkCall::Send(ChannelId::new(51))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_posts_notice_then_deletes_player() {
        let sink = Arc::new(RecordingSink::default());
        let (sessions, worker) = worker(sink.clone(), Arc::new(FakeGateway::default()));
        {
            let session = sessions.get_or_create(GUILD);
            let mut state = session.lock().await;
            state.text_channel = Some(TEXT);
            state.start_track(track("a", 100), false, None, Instant::now());
        }
        worker.render(GUILD).await;

        worker.handle(SyncRequest::TornDown(GUILD, TeardownReason::Inactivity)).await;
        assert_eq!(
            sink.calls().last(),
            Some(&SinkCall::Notice("👋 Disconnected due to inactivity.".into()))
        );
        assert_eq!(sink.count(|c| matches!(c, SinkCall::Delete(_))), 0);

        time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(sink.count(|c| matches!(c, SinkCall::Delete(_))), 1);
        assert!(sessions.snapshot(GUILD).await.unwrap().ui_message.is_none());
    }
}
