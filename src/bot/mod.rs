//! # Bot Module
//!
//! Discord-facing side of WRLD Radio.
//!
//! This module contains:
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - The songbird-backed voice gateway ([`voice`])
//! - Voice state tracking that feeds the idle reaper
//!
//! ## Architecture
//!
//! [`RadioBot`] implements Serenity's [`EventHandler`]. It owns no playback
//! state of its own: every command is forwarded to the
//! [`PlaybackSequencer`], and every voice departure to the [`IdleReaper`].

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{
        now_playing::TeardownReason, player::PlaybackSequencer, reaper::IdleReaper,
        stats::ListeningStats, transport::VoiceGateway,
    },
    config::Config,
    sources::catalog::CatalogClient,
};
use voice::SongbirdGateway;

/// Serenity event handler for the radio bot.
pub struct RadioBot {
    config: Arc<Config>,
    pub sequencer: Arc<PlaybackSequencer>,
    pub reaper: Arc<IdleReaper>,
    pub catalog: Arc<CatalogClient>,
    pub gateway: Arc<SongbirdGateway>,
    pub stats: Arc<ListeningStats>,
}

impl RadioBot {
    pub fn new(
        config: Config,
        sequencer: Arc<PlaybackSequencer>,
        reaper: Arc<IdleReaper>,
        catalog: Arc<CatalogClient>,
        gateway: Arc<SongbirdGateway>,
        stats: Arc<ListeningStats>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sequencer,
            reaper,
            catalog,
            gateway,
            stats,
        }
    }

    /// Registers slash commands globally, or for one guild when `GUILD_ID`
    /// is set (faster propagation while developing).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not in the configured guild {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Guild command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register guild commands. Check the bot has 'applications.commands' in that guild."
                    )
                })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!("Could not register global commands. Check the 'applications.commands' scope.")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error handling component: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Bot removed from voice tears the session down; a user leaving the
    /// bot's channel lets the reaper check whether anyone is left.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        if new.user_id == bot_id {
            if new.channel_id.is_none() && self.gateway.transport(guild_id).is_some() {
                info!("🔌 Bot was disconnected from voice in guild {}", guild_id);
                self.reaper.teardown(guild_id, TeardownReason::BotDisconnected).await;
            }
            return;
        }

        let Some(left_channel) = old.and_then(|old| old.channel_id) else {
            return;
        };
        if new.channel_id == Some(left_channel) {
            return;
        }
        let Some(bot_channel) = self.gateway.current_channel(guild_id).await else {
            return;
        };
        if left_channel != bot_channel {
            return;
        }

        match humans_in_channel(&ctx, guild_id, bot_channel, bot_id) {
            Some(humans) => {
                debug!("Guild {}: {} listener(s) left in {}", guild_id, humans, bot_channel);
                self.reaper.on_participant_left(guild_id, humans).await;
            }
            None => debug!("Guild {} not cached, skipping empty-channel check", guild_id),
        }
    }
}

/// Non-bot members in `channel_id`, read from the cache.
fn humans_in_channel(ctx: &Context, guild_id: GuildId, channel_id: ChannelId, bot_id: UserId) -> Option<usize> {
    let guild = ctx.cache.guild(guild_id)?;
    let count = guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| {
            let member_bot = state.member.as_ref().map(|member| member.user.bot);
            let user_bot = || ctx.cache.user(state.user_id).map(|user| user.bot);
            counts_as_human(member_bot, user_bot)
        })
        .count();
    Some(count)
}

/// The voice state's member wins; without one, fall back to the cached user.
/// Someone unknown to both counts as a listener.
fn counts_as_human(member_bot: Option<bool>, user_bot: impl FnOnce() -> Option<bool>) -> bool {
    match member_bot {
        Some(bot) => !bot,
        None => !user_bot().unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncached_member_is_classified_through_the_user_cache() {
        assert!(!counts_as_human(None, || Some(true)));
        assert!(counts_as_human(None, || Some(false)));
        assert!(counts_as_human(None, || None));
    }

    #[test]
    fn cached_member_decides_without_the_user_cache() {
        assert!(!counts_as_human(Some(true), || panic!("user cache consulted")));
        assert!(counts_as_human(Some(false), || Some(true)));
    }
}
