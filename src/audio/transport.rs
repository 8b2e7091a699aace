use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;

use crate::error::PlaybackResult;

/// Fired exactly once per `play`, on natural end, on `stop()` or on a
/// decode error (`Some(reason)`). May run on any thread; it must only hand
/// off and return.
pub type CompletionCallback = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// One guild's live voice connection.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Playing or paused.
    async fn is_active(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// Starts streaming `stream_url`. On error the callback is dropped unfired.
    async fn play(&self, stream_url: &str, on_complete: CompletionCallback) -> PlaybackResult<()>;

    async fn pause(&self) -> PlaybackResult<()>;

    async fn resume(&self) -> PlaybackResult<()>;

    /// Halts the current clip, which fires its completion callback.
    async fn stop(&self);
}

/// Voice connection manager across guilds.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<Arc<dyn VoiceTransport>>;

    /// The live transport of a guild, if connected.
    fn transport(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceTransport>>;

    async fn disconnect(&self, guild_id: GuildId);

    fn connected_guilds(&self) -> Vec<GuildId>;
}
