//! Per-guild playback state machine.
//!
//! Every transition runs with the guild's session lock held, so commands,
//! completions and radio retries for one guild apply strictly one after
//! another while guilds progress independently.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    now_playing::{SessionChange, SessionObserver},
    queue::{QueuePage, QueuedTrack, TrackQueue},
    radio::{RadioBackoff, RadioController},
    scheduler::{CompletionBridge, SessionEvent},
    session::{NowPlaying, PlaybackState, SessionSnapshot, SessionState, SessionStore},
    stats::ListeningStats,
    transport::{VoiceGateway, VoiceTransport},
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{ResolveStatus, StreamResolver, TrackInfo},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    /// Stop whatever is playing and take over.
    Immediate,
    /// Wait behind the current track.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    Queued { position: usize },
    /// The current clip was stopped; the request plays once its completion lands.
    Replacing,
}

pub struct PlaybackSequencer {
    sessions: Arc<SessionStore>,
    gateway: Arc<dyn VoiceGateway>,
    resolver: Arc<dyn StreamResolver>,
    radio: RadioController,
    backoff: RadioBackoff,
    bridge: CompletionBridge,
    observer: Arc<dyn SessionObserver>,
    stats: Arc<ListeningStats>,
}

impl PlaybackSequencer {
    pub fn new(
        sessions: Arc<SessionStore>,
        gateway: Arc<dyn VoiceGateway>,
        resolver: Arc<dyn StreamResolver>,
        bridge: CompletionBridge,
        observer: Arc<dyn SessionObserver>,
        stats: Arc<ListeningStats>,
        backoff: RadioBackoff,
    ) -> Self {
        Self {
            radio: RadioController::new(resolver.clone()),
            sessions,
            gateway,
            resolver,
            backoff,
            bridge,
            observer,
            stats,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    fn notify(&self, guild_id: GuildId, change: SessionChange) {
        self.observer.notify(guild_id, change);
    }

    /// Remembers where the player message should be posted.
    pub async fn bind_text_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        let session = self.sessions.get_or_create(guild_id);
        session.lock().await.text_channel = Some(channel_id);
    }

    pub async fn request_play(
        &self,
        guild_id: GuildId,
        track: QueuedTrack,
        mode: PlayMode,
        voice_channel: Option<ChannelId>,
    ) -> PlaybackResult<PlayOutcome> {
        let session = self.sessions.get_or_create(guild_id);
        let mut state = session.lock().await;
        self.play_or_queue(&mut state, track, mode, false, voice_channel).await
    }

    /// Queue-style add. `silent` suppresses the per-track queued notice for
    /// bulk adds.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        track: QueuedTrack,
        silent: bool,
        voice_channel: Option<ChannelId>,
    ) -> PlaybackResult<PlayOutcome> {
        let session = self.sessions.get_or_create(guild_id);
        let mut state = session.lock().await;
        self.play_or_queue(&mut state, track, PlayMode::Queued, silent, voice_channel)
            .await
    }

    async fn play_or_queue(
        &self,
        state: &mut SessionState,
        track: QueuedTrack,
        mode: PlayMode,
        silent: bool,
        voice_channel: Option<ChannelId>,
    ) -> PlaybackResult<PlayOutcome> {
        let guild_id = state.guild_id;
        state.touch(Instant::now());

        if let Some(transport) = self.gateway.transport(guild_id) {
            if transport.is_active().await {
                return match mode {
                    PlayMode::Immediate => {
                        info!("⏭️ Guild {}: {} replaces the current track", guild_id, track.title());
                        state.queue.push_front(track);
                        self.notify(guild_id, SessionChange::Queue);
                        transport.stop().await;
                        Ok(PlayOutcome::Replacing)
                    }
                    PlayMode::Queued => {
                        let title = track.title().to_string();
                        let position = state.queue.enqueue(track)?;
                        if !silent {
                            self.notify(guild_id, SessionChange::TrackQueued { title, position });
                        }
                        self.notify(guild_id, SessionChange::Queue);
                        Ok(PlayOutcome::Queued { position })
                    }
                };
            }
        }

        let transport = self.ensure_connected(guild_id, voice_channel).await?;

        // A stopped clip whose completion is still in flight: earlier
        // requests keep their place.
        if let Some(head) = state.queue.peek() {
            debug!(
                "Guild {}: {} is still ahead in the queue, advancing instead",
                guild_id,
                head.title()
            );
            let title = track.title().to_string();
            let position = match mode {
                PlayMode::Immediate => {
                    state.queue.push_front(track);
                    1
                }
                PlayMode::Queued => state.queue.enqueue(track)?,
            };
            let pending = state.queue.len();
            self.notify(guild_id, SessionChange::Queue);
            self.advance(state, false).await;

            let taken = pending - state.queue.len();
            if taken >= position {
                return Ok(PlayOutcome::Started);
            }
            let position = position - taken;
            if !silent {
                self.notify(guild_id, SessionChange::TrackQueued { title, position });
            }
            return Ok(PlayOutcome::Queued { position });
        }

        let stream_url = match track.stream_url.clone() {
            Some(url) => url,
            None => self.resolve_track(&track.info).await?,
        };

        if let Err(e) = self
            .start_clip(state, transport.as_ref(), track.info, stream_url, false, track.requested_by)
            .await
        {
            // Same as a clip that ended with an error.
            self.advance(state, true).await;
            return Err(e);
        }

        Ok(PlayOutcome::Started)
    }

    async fn ensure_connected(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
    ) -> PlaybackResult<Arc<dyn VoiceTransport>> {
        if let Some(transport) = self.gateway.transport(guild_id) {
            return Ok(transport);
        }

        let channel_id = voice_channel.ok_or(PlaybackError::NotInVoice)?;
        info!("🔊 Guild {}: joining voice channel {}", guild_id, channel_id);
        self.gateway.connect(guild_id, channel_id).await
    }

    async fn resolve_track(&self, track: &TrackInfo) -> PlaybackResult<String> {
        let path = track.source_path.as_deref().ok_or_else(|| {
            PlaybackError::resolution(track.subject(), ResolveStatus::NotFound, "track has no catalog path")
        })?;
        self.resolver.resolve(path).await.into_url(&track.subject())
    }

    /// Starts one clip. Callers must have checked the transport is inactive.
    async fn start_clip(
        &self,
        state: &mut SessionState,
        transport: &dyn VoiceTransport,
        track: TrackInfo,
        stream_url: String,
        is_radio: bool,
        requester: Option<UserId>,
    ) -> PlaybackResult<()> {
        let guild_id = state.guild_id;
        let epoch = state.bump_epoch();
        let callback = self.bridge.completion_callback(guild_id, epoch);

        if let Err(e) = transport.play(&stream_url, callback).await {
            warn!("⚠️ Guild {}: could not start {}: {}", guild_id, track.title, e);
            return Err(e);
        }

        info!(
            "🎵 Guild {}: now playing {} ({})",
            guild_id,
            track.title,
            if is_radio { "radio" } else { "queue" }
        );
        if let Some(user_id) = requester {
            self.stats.record_listen(user_id, &track);
        }
        state.start_track(track, is_radio, requester, Instant::now());
        self.notify(guild_id, SessionChange::NowPlaying);
        Ok(())
    }

    /// Entry point for everything the bridge delivers.
    pub async fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::TrackFinished { guild_id, epoch, error } => {
                self.on_completion(guild_id, epoch, error).await
            }
            SessionEvent::RadioRetry { guild_id, epoch } => self.on_radio_retry(guild_id, epoch).await,
        }
    }

    pub async fn on_completion(&self, guild_id: GuildId, epoch: u64, error: Option<String>) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };
        let mut state = session.lock().await;

        if state.epoch != epoch {
            debug!("Guild {}: ignoring stale completion (epoch {} != {})", guild_id, epoch, state.epoch);
            return;
        }

        if let Some(error) = &error {
            warn!("⚠️ Guild {}: track ended with error: {}", guild_id, error);
        }

        self.advance(&mut state, error.is_some()).await;
    }

    async fn on_radio_retry(&self, guild_id: GuildId, epoch: u64) {
        let Some(session) = self.sessions.get(guild_id) else {
            return;
        };
        let mut state = session.lock().await;

        if state.epoch != epoch || !state.radio_enabled {
            debug!("Guild {}: radio retry no longer wanted", guild_id);
            return;
        }

        self.advance(&mut state, false).await;
    }

    /// Decides and starts what plays next: queue first, then radio, else idle.
    async fn advance(&self, state: &mut SessionState, clip_errored: bool) {
        let guild_id = state.guild_id;

        let Some(transport) = self.gateway.transport(guild_id) else {
            debug!("Guild {}: not connected, going idle", guild_id);
            self.go_idle(state);
            return;
        };

        if transport.is_active().await {
            debug!("Guild {}: transport still busy, nothing to do", guild_id);
            return;
        }

        while let Some(item) = state.queue.dequeue() {
            self.notify(guild_id, SessionChange::Queue);

            let stream_url = match item.stream_url.clone() {
                Some(url) => url,
                None => match self.resolve_track(&item.info).await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("⚠️ Guild {}: skipping queued track: {}", guild_id, e);
                        continue;
                    }
                },
            };

            if self
                .start_clip(state, transport.as_ref(), item.info, stream_url, false, item.requested_by)
                .await
                .is_ok()
            {
                if state.radio_enabled && state.radio_next.is_none() {
                    self.radio.prefetch_next(state).await;
                    self.notify(guild_id, SessionChange::RadioNext);
                }
                return;
            }
        }

        if state.radio_enabled {
            self.play_radio(state, transport.as_ref(), clip_errored).await;
            return;
        }

        self.go_idle(state);
    }

    async fn play_radio(&self, state: &mut SessionState, transport: &dyn VoiceTransport, clip_errored: bool) {
        let guild_id = state.guild_id;

        let failure = match self.radio.resolve_for_playback(state).await {
            Ok((track, url)) => match self.start_clip(state, transport, track, url, true, None).await {
                Ok(()) => {
                    state.radio_failures = 0;
                    self.radio.prefetch_next(state).await;
                    self.notify(guild_id, SessionChange::RadioNext);
                    return;
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        state.radio_failures = state.radio_failures.saturating_add(1);
        warn!(
            "📻 Guild {}: radio attempt {} failed: {}",
            guild_id, state.radio_failures, failure
        );
        self.go_idle(state);

        if self.backoff.exhausted(state.radio_failures) {
            let failures = state.radio_failures;
            state.radio_enabled = false;
            state.radio_next = None;
            state.radio_failures = 0;
            warn!("📻 Guild {}: giving up after {} failures, radio off", guild_id, failures);
            self.notify(guild_id, SessionChange::RadioGaveUp { failures });
            return;
        }

        let delay = self.backoff.delay(state.radio_failures, clip_errored);
        let epoch = state.bump_epoch();
        self.bridge.schedule_radio_retry(guild_id, epoch, delay);
    }

    fn go_idle(&self, state: &mut SessionState) {
        if state.now_playing().is_some() {
            info!("⏹️ Guild {}: playback idle", state.guild_id);
        }
        state.set_idle();
        self.notify(state.guild_id, SessionChange::NowPlaying);
    }

    /// Turning radio on never interrupts the current track.
    pub async fn toggle_radio(
        &self,
        guild_id: GuildId,
        on: bool,
        voice_channel: Option<ChannelId>,
    ) -> PlaybackResult<PlaybackState> {
        let session = self.sessions.get_or_create(guild_id);
        let mut state = session.lock().await;
        state.touch(Instant::now());

        if !on {
            state.radio_enabled = false;
            state.radio_next = None;
            state.radio_failures = 0;
            info!("📻 Guild {}: radio off", guild_id);
            self.notify(guild_id, SessionChange::RadioNext);
            return Ok(state.state());
        }

        let transport = self.ensure_connected(guild_id, voice_channel).await?;
        state.radio_enabled = true;
        state.radio_failures = 0;
        info!("📻 Guild {}: radio on", guild_id);

        if transport.is_active().await {
            if state.radio_next.is_none() {
                self.radio.prefetch_next(&mut state).await;
            }
            self.notify(guild_id, SessionChange::RadioNext);
            return Ok(state.state());
        }

        self.advance(&mut state, false).await;
        Ok(state.state())
    }

    /// Radio off, queue emptied, transport halted. Calling it again is a no-op.
    pub async fn stop(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let Some(session) = self.sessions.get(guild_id) else {
            return Ok(());
        };
        let mut state = session.lock().await;

        state.radio_enabled = false;
        state.radio_next = None;
        state.radio_failures = 0;
        state.queue.clear();

        if let Some(transport) = self.gateway.transport(guild_id) {
            if transport.is_active().await {
                transport.stop().await;
            }
        }

        self.go_idle(&mut state);
        self.notify(guild_id, SessionChange::Queue);
        info!("⏹️ Guild {}: stopped", guild_id);
        Ok(())
    }

    /// Halts the current clip; the completion path picks what comes next.
    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<Option<String>> {
        let transport = self
            .gateway
            .transport(guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;
        if !transport.is_active().await {
            return Err(PlaybackError::NothingPlaying);
        }

        let title = self
            .get_now_playing(guild_id)
            .await
            .map(|np| np.track.title);
        info!("⏭️ Guild {}: skipping {:?}", guild_id, title);
        transport.stop().await;
        Ok(title)
    }

    /// Returns `true` when the call paused, `false` when it resumed.
    pub async fn pause_resume(&self, guild_id: GuildId) -> PlaybackResult<bool> {
        let transport = self
            .gateway
            .transport(guild_id)
            .ok_or(PlaybackError::NotConnected)?;
        let session = self
            .sessions
            .get(guild_id)
            .ok_or(PlaybackError::NothingPlaying)?;
        let mut state = session.lock().await;

        if !transport.is_active().await {
            return Err(PlaybackError::NothingPlaying);
        }

        let now = Instant::now();
        state.touch(now);

        let paused = if transport.is_paused().await {
            transport.resume().await?;
            if let Some(np) = state.now_playing_mut() {
                np.mark_resumed(now);
            }
            false
        } else {
            transport.pause().await?;
            if let Some(np) = state.now_playing_mut() {
                np.mark_paused(now);
            }
            true
        };

        info!("{} Guild {}", if paused { "⏸️ Paused" } else { "▶️ Resumed" }, guild_id);
        self.notify(guild_id, SessionChange::NowPlaying);
        Ok(paused)
    }

    /// Replays the previous track now, with a freshly resolved URL. Radio is
    /// switched off first.
    pub async fn rewind(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
    ) -> PlaybackResult<(TrackInfo, PlayOutcome)> {
        let session = self.sessions.get(guild_id).ok_or(PlaybackError::NoPrevious)?;
        let mut state = session.lock().await;

        let previous = state.previous().cloned().ok_or(PlaybackError::NoPrevious)?;
        let stream_url = self.resolve_track(&previous).await?;

        if state.radio_enabled {
            state.radio_enabled = false;
            state.radio_next = None;
            state.radio_failures = 0;
            info!("📻 Guild {}: radio off for rewind", guild_id);
            self.notify(guild_id, SessionChange::RadioNext);
        }

        let track = QueuedTrack::new(previous.clone(), Some(stream_url), None);
        let outcome = self
            .play_or_queue(&mut state, track, PlayMode::Immediate, false, voice_channel)
            .await?;
        Ok((previous, outcome))
    }

    /// Shuffles pending items only; returns how many were shuffled.
    pub async fn shuffle_queue(&self, guild_id: GuildId) -> PlaybackResult<usize> {
        let session = self
            .sessions
            .get(guild_id)
            .ok_or(PlaybackError::NotEnoughToShuffle)?;
        let mut state = session.lock().await;
        state.queue.shuffle()?;
        self.notify(guild_id, SessionChange::Queue);
        Ok(state.queue.len())
    }

    pub async fn get_now_playing(&self, guild_id: GuildId) -> Option<NowPlaying> {
        let session = self.sessions.get(guild_id)?;
        let state = session.lock().await;
        state.now_playing().cloned()
    }

    pub async fn get_queue_page(&self, guild_id: GuildId, page: usize, per_page: usize) -> QueuePage {
        match self.sessions.get(guild_id) {
            Some(session) => session.lock().await.queue.page(page, per_page),
            None => TrackQueue::new(0).page(page, per_page),
        }
    }

    pub async fn get_history(&self, guild_id: GuildId) -> Vec<TrackInfo> {
        match self.sessions.get(guild_id) {
            Some(session) => session.lock().await.history(),
            None => Vec::new(),
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<SessionSnapshot> {
        self.sessions.snapshot(guild_id).await
    }
}
