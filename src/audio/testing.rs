//! In-memory stand-ins for the voice, catalog and UI collaborators.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    now_playing::{NowPlayingSink, PlayerView, SessionChange, SessionObserver},
    queue::QueuedTrack,
    session::UiMessageRef,
    transport::{CompletionCallback, VoiceGateway, VoiceTransport},
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{CatalogTrack, MockStreamResolver, StreamResolution, TrackInfo},
};

/// Queue item with a catalog path and no pre-resolved URL.
pub fn queued(title: &str) -> QueuedTrack {
    let info = TrackInfo::new(title, Some(format!("{}.mp3", title))).with_duration(Duration::from_secs(180));
    QueuedTrack::new(info, None, None)
}

/// Catalog that resolves every path to `fresh:<path>` and hands out
/// `radio-0`, `radio-1`, ... as random picks.
pub fn catalog_mock() -> MockStreamResolver {
    let mut resolver = MockStreamResolver::new();
    resolver
        .expect_resolve()
        .returning(|path| StreamResolution::success(format!("fresh:{}", path)));

    let counter = AtomicUsize::new(0);
    resolver.expect_random_track().returning(move |_include_url| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let title = format!("radio-{}", n);
        Some(CatalogTrack {
            info: TrackInfo::new(&title, Some(format!("radio/{}.mp3", title)))
                .with_duration(Duration::from_secs(200)),
            // Always present so a stale prefetch URL would be noticed.
            stream_url: Some(format!("direct:{}", title)),
        })
    });

    resolver
}

#[derive(Default)]
struct TransportState {
    active: bool,
    paused: bool,
    plays: Vec<String>,
    overlapping: usize,
    callback: Option<CompletionCallback>,
    fail_next_play: bool,
}

/// Transport that records plays and fires completions on demand.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn set_active(&self, active: bool) {
        self.state.lock().active = active;
    }

    pub fn plays(&self) -> Vec<String> {
        self.state.lock().plays.clone()
    }

    /// Plays issued while another clip was still active.
    pub fn overlapping_plays(&self) -> usize {
        self.state.lock().overlapping
    }

    pub fn fail_next_play(&self) {
        self.state.lock().fail_next_play = true;
    }

    /// Ends the current clip as the driver would.
    pub fn finish(&self, error: Option<String>) {
        let callback = {
            let mut state = self.state.lock();
            state.active = false;
            state.paused = false;
            state.callback.take()
        };
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn is_active(&self) -> bool {
        self.state.lock().active
    }

    async fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    async fn play(&self, stream_url: &str, on_complete: CompletionCallback) -> PlaybackResult<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_play) {
            return Err(PlaybackError::TransportStart("fake refused".into()));
        }
        if state.active {
            state.overlapping += 1;
        }
        state.active = true;
        state.paused = false;
        state.plays.push(stream_url.to_string());
        state.callback = Some(on_complete);
        Ok(())
    }

    async fn pause(&self) -> PlaybackResult<()> {
        let mut state = self.state.lock();
        if !state.active {
            return Err(PlaybackError::NothingPlaying);
        }
        state.paused = true;
        Ok(())
    }

    async fn resume(&self) -> PlaybackResult<()> {
        self.state.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) {
        let active = self.state.lock().active;
        if active {
            self.finish(None);
        }
    }
}

#[derive(Default)]
pub struct FakeGateway {
    transports: DashMap<GuildId, Arc<FakeTransport>>,
    disconnects: Mutex<Vec<GuildId>>,
}

impl FakeGateway {
    pub fn connect_fake(&self, guild_id: GuildId) -> Arc<FakeTransport> {
        self.transports.entry(guild_id).or_default().clone()
    }

    pub fn fake(&self, guild_id: GuildId) -> Option<Arc<FakeTransport>> {
        self.transports.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn disconnected(&self) -> Vec<GuildId> {
        self.disconnects.lock().clone()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(&self, guild_id: GuildId, _channel_id: ChannelId) -> PlaybackResult<Arc<dyn VoiceTransport>> {
        Ok(self.connect_fake(guild_id))
    }

    fn transport(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceTransport>> {
        self.fake(guild_id).map(|t| t as Arc<dyn VoiceTransport>)
    }

    async fn disconnect(&self, guild_id: GuildId) {
        self.transports.remove(&guild_id);
        self.disconnects.lock().push(guild_id);
    }

    fn connected_guilds(&self) -> Vec<GuildId> {
        self.transports.iter().map(|entry| *entry.key()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Edit(UiMessageRef),
    Send(ChannelId),
    Delete(UiMessageRef),
    Notice(String),
}

/// Sink that records every call and hands out sequential message ids.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    fail_edits: AtomicBool,
    next_id: AtomicU64,
}

impl RecordingSink {
    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, filter: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| filter(call)).count()
    }
}

#[async_trait]
impl NowPlayingSink for RecordingSink {
    async fn edit(&self, message: UiMessageRef, _view: &PlayerView) -> anyhow::Result<()> {
        self.calls.lock().push(SinkCall::Edit(message));
        if self.fail_edits.load(Ordering::SeqCst) {
            anyhow::bail!("Unknown Message");
        }
        Ok(())
    }

    async fn send(&self, channel_id: ChannelId, _view: &PlayerView) -> anyhow::Result<UiMessageRef> {
        self.calls.lock().push(SinkCall::Send(channel_id));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UiMessageRef {
            channel_id,
            message_id: MessageId::new(id),
        })
    }

    async fn delete(&self, message: UiMessageRef) -> anyhow::Result<()> {
        self.calls.lock().push(SinkCall::Delete(message));
        Ok(())
    }

    async fn notice(&self, _channel_id: ChannelId, text: &str) -> anyhow::Result<()> {
        self.calls.lock().push(SinkCall::Notice(text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    changes: Mutex<Vec<(GuildId, SessionChange)>>,
}

impl RecordingObserver {
    pub fn changes(&self) -> Vec<SessionChange> {
        self.changes.lock().iter().map(|(_, change)| change.clone()).collect()
    }

    pub fn changes_for(&self, guild_id: GuildId) -> Vec<SessionChange> {
        self.changes
            .lock()
            .iter()
            .filter(|(guild, _)| *guild == guild_id)
            .map(|(_, change)| change.clone())
            .collect()
    }
}

impl SessionObserver for RecordingObserver {
    fn notify(&self, guild_id: GuildId, change: SessionChange) {
        self.changes.lock().push((guild_id, change));
    }
}
