use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::ChannelId,
};
use std::sync::Arc;

use super::{buttons::create_player_buttons, embeds::create_player_embed};
use crate::audio::{
    now_playing::{NowPlayingSink, PlayerView},
    session::UiMessageRef,
};

/// Discord-backed player message.
pub struct DiscordPlayerSink {
    http: Arc<Http>,
}

impl DiscordPlayerSink {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NowPlayingSink for DiscordPlayerSink {
    async fn edit(&self, message: UiMessageRef, view: &PlayerView) -> anyhow::Result<()> {
        let builder = EditMessage::new()
            .embed(create_player_embed(view))
            .components(create_player_buttons(view));
        message
            .channel_id
            .edit_message(self.http.as_ref(), message.message_id, builder)
            .await?;
        Ok(())
    }

    async fn send(&self, channel_id: ChannelId, view: &PlayerView) -> anyhow::Result<UiMessageRef> {
        let builder = CreateMessage::new()
            .embed(create_player_embed(view))
            .components(create_player_buttons(view));
        let sent = channel_id.send_message(self.http.as_ref(), builder).await?;
        Ok(UiMessageRef {
            channel_id,
            message_id: sent.id,
        })
    }

    async fn delete(&self, message: UiMessageRef) -> anyhow::Result<()> {
        message
            .channel_id
            .delete_message(self.http.as_ref(), message.message_id)
            .await?;
        Ok(())
    }

    async fn notice(&self, channel_id: ChannelId, text: &str) -> anyhow::Result<()> {
        channel_id.say(self.http.as_ref(), text).await?;
        Ok(())
    }
}
