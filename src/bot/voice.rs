//! Songbird-backed voice connections.
//!
//! Each connected guild owns one [`SongbirdTransport`] wrapping its `Call`.
//! Clips are streamed straight from their HTTP URL; songbird decodes them
//! with symphonia on its own driver threads.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::transport::{CompletionCallback, VoiceGateway, VoiceTransport},
    error::{PlaybackError, PlaybackResult},
};

type SharedCallback = Arc<Mutex<Option<CompletionCallback>>>;

/// Fires the clip's completion callback at most once, whichever of the
/// end/error events arrives first.
struct ClipFinished {
    guild_id: GuildId,
    callback: SharedCallback,
}

#[async_trait]
impl VoiceEventHandler for ClipFinished {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut error = None;
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                if let PlayMode::Errored(e) = &state.playing {
                    error = Some(format!("{:?}", e));
                }
            }
        }

        // Soltar el lock antes de llamar al callback
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                debug!("🎵 Clip finished in guild {} (error: {:?})", self.guild_id, error);
                callback(error);
            }
            None => debug!("Clip event for guild {} already handled", self.guild_id),
        }

        None
    }
}

/// One guild's songbird call.
pub struct SongbirdTransport {
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn is_active(&self) -> bool {
        let Some(handle) = self.current() else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn is_paused(&self) -> bool {
        let Some(handle) = self.current() else {
            return false;
        };
        matches!(handle.get_info().await, Ok(info) if matches!(info.playing, PlayMode::Pause))
    }

    async fn play(&self, stream_url: &str, on_complete: CompletionCallback) -> PlaybackResult<()> {
        let input = HttpRequest::new(self.http.clone(), stream_url.to_string());
        let handle = self.call.lock().await.play_input(input.into());

        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ Guild {}: could not set volume: {}", self.guild_id, e);
        }

        let callback: SharedCallback = Arc::new(Mutex::new(Some(on_complete)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let handler = ClipFinished {
                guild_id: self.guild_id,
                callback: callback.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), handler) {
                // Sin handler la sesión nunca avanzaría
                callback.lock().take();
                let _ = handle.stop();
                return Err(PlaybackError::TransportStart(e.to_string()));
            }
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> PlaybackResult<()> {
        let handle = self.current().ok_or(PlaybackError::NothingPlaying)?;
        handle.pause().map_err(|_| PlaybackError::NothingPlaying)
    }

    async fn resume(&self) -> PlaybackResult<()> {
        let handle = self.current().ok_or(PlaybackError::NothingPlaying)?;
        handle.play().map_err(|_| PlaybackError::NothingPlaying)
    }

    async fn stop(&self) {
        if let Some(handle) = self.current() {
            if let Err(e) = handle.stop() {
                debug!("Guild {}: stop on a finished clip ({})", self.guild_id, e);
            }
        }
    }
}

/// Voice connections for every guild, through the shared songbird manager.
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
    transports: DashMap<GuildId, Arc<SongbirdTransport>>,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            manager,
            http,
            volume,
            transports: DashMap::new(),
        }
    }

    /// Voice channel the bot currently sits in, as songbird sees it.
    pub async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<Arc<dyn VoiceTransport>> {
        if let Some(existing) = self.transports.get(&guild_id) {
            return Ok(existing.value().clone());
        }

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::VoiceConnect(e.to_string()))?;

        info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);

        let transport = Arc::new(SongbirdTransport {
            guild_id,
            call,
            http: self.http.clone(),
            volume: self.volume,
            current: Mutex::new(None),
        });
        self.transports.insert(guild_id, transport.clone());
        Ok(transport)
    }

    fn transport(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceTransport>> {
        self.transports
            .get(&guild_id)
            .map(|entry| entry.value().clone() as Arc<dyn VoiceTransport>)
    }

    async fn disconnect(&self, guild_id: GuildId) {
        self.transports.remove(&guild_id);
        match self.manager.remove(guild_id).await {
            Ok(()) => info!("👋 Left voice in guild {}", guild_id),
            Err(e) => debug!("Guild {}: voice already gone ({:?})", guild_id, e),
        }
    }

    fn connected_guilds(&self) -> Vec<GuildId> {
        self.transports.iter().map(|entry| *entry.key()).collect()
    }
}
