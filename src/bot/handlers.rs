use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::path::Path;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::{
    audio::{
        now_playing::{PlayerView, TeardownReason},
        player::{PlayMode, PlayOutcome},
        queue::QueuedTrack,
        session::PlaybackState,
        transport::VoiceGateway,
    },
    bot::RadioBot,
    error::PlaybackError,
    sources::{StreamResolver, TrackInfo},
    ui::{
        buttons::{create_player_buttons, PlayerAction},
        embeds,
    },
};

const QUEUE_PAGE_SIZE: usize = 10;

/// Commands that may wait on the catalog and must answer with a deferral.
const SLOW_COMMANDS: &[&str] = &["play", "playfile", "enqueue", "radio", "rewind"];

struct Reply {
    content: Option<String>,
    embed: Option<CreateEmbed>,
    components: Vec<CreateActionRow>,
    ephemeral: bool,
}

impl Reply {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
            components: Vec::new(),
            ephemeral: false,
        }
    }

    fn embed(embed: CreateEmbed) -> Self {
        Self {
            content: None,
            embed: Some(embed),
            components: Vec::new(),
            ephemeral: false,
        }
    }

    fn error(e: &anyhow::Error) -> Self {
        Self {
            ephemeral: true,
            ..Self::text(format!("❌ {}", e))
        }
    }

    fn with_components(mut self, components: Vec<CreateActionRow>) -> Self {
        self.components = components;
        self
    }

    fn into_message(self) -> CreateInteractionResponseMessage {
        let mut message = CreateInteractionResponseMessage::new().ephemeral(self.ephemeral);
        if let Some(content) = self.content {
            message = message.content(content);
        }
        if let Some(embed) = self.embed {
            message = message.embed(embed);
        }
        if !self.components.is_empty() {
            message = message.components(self.components);
        }
        message
    }

    fn into_edit(self) -> EditInteractionResponse {
        let mut edit = EditInteractionResponse::new();
        if let Some(content) = self.content {
            edit = edit.content(content);
        }
        if let Some(embed) = self.embed {
            edit = edit.embed(embed);
        }
        if !self.components.is_empty() {
            edit = edit.components(self.components);
        }
        edit
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &RadioBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside of a server"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    let deferred = SLOW_COMMANDS.contains(&command.data.name.as_str());
    if deferred {
        command.defer(&ctx.http).await?;
    }

    bot.sequencer.bind_text_channel(guild_id, command.channel_id).await;

    let reply = match run_command(ctx, &command, guild_id, bot).await {
        Ok(reply) => reply,
        Err(e) => {
            log_failure(&command.data.name, guild_id, &e);
            Reply::error(&e)
        }
    };

    if deferred {
        command.edit_response(&ctx.http, reply.into_edit()).await?;
    } else {
        command
            .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_message()))
            .await?;
    }

    Ok(())
}

/// Maneja interacciones con los botones del reproductor
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &RadioBot) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Button used outside of a server"))?;

    info!(
        "🔘 Button {} pressed by {} in guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let content = match PlayerAction::from_custom_id(&component.data.custom_id) {
        Some(action) => {
            bot.sequencer.bind_text_channel(guild_id, component.channel_id).await;
            let voice = get_user_voice_channel(ctx, guild_id, component.user.id);
            match run_action(bot, guild_id, voice, action).await {
                Ok(text) => text,
                Err(e) => {
                    log_failure(&component.data.custom_id, guild_id, &e);
                    format!("❌ {}", e)
                }
            }
        }
        None => "❌ Unknown action".to_string(),
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content).ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

async fn run_command(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &RadioBot) -> Result<Reply> {
    let user_id = command.user.id;
    let voice = get_user_voice_channel(ctx, guild_id, user_id);

    let reply = match command.data.name.as_str() {
        "play" => {
            let song_id = int_option(command, "song_id")
                .filter(|id| *id > 0)
                .ok_or_else(|| anyhow::anyhow!("A valid song ID is required"))?;
            play_song(bot, guild_id, user_id, voice, song_id as u64).await?
        }
        "playfile" => {
            let path = str_option(command, "path")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| anyhow::anyhow!("A file path is required"))?;
            play_file(bot, guild_id, user_id, voice, path).await?
        }
        "queue" => {
            let page = int_option(command, "page").unwrap_or(1).max(1) as usize;
            show_queue(bot, guild_id, page).await
        }
        "enqueue" => {
            let song_ids = str_option(command, "song_ids")
                .and_then(parse_song_ids)
                .ok_or_else(|| anyhow::anyhow!("Song IDs must be positive numbers, e.g. `12 34 56`"))?;
            enqueue_songs(bot, guild_id, user_id, voice, &song_ids).await?
        }
        "radio" => {
            let on = str_option(command, "mode") == Some("on");
            Reply::text(set_radio(bot, guild_id, voice, on).await?)
        }
        "stop" => Reply::text(run_action(bot, guild_id, voice, PlayerAction::Stop).await?),
        "skip" => Reply::text(run_action(bot, guild_id, voice, PlayerAction::Skip).await?),
        "pause" => Reply::text(run_action(bot, guild_id, voice, PlayerAction::PlayPause).await?),
        "rewind" => Reply::text(run_action(bot, guild_id, voice, PlayerAction::Rewind).await?),
        "shuffle" => Reply::text(run_action(bot, guild_id, voice, PlayerAction::Shuffle).await?),
        "nowplaying" => {
            let snapshot = bot
                .sequencer
                .snapshot(guild_id)
                .await
                .ok_or(PlaybackError::NothingPlaying)?;
            let view = PlayerView::from_snapshot(&snapshot, Instant::now());
            Reply::embed(embeds::create_player_embed(&view)).with_components(create_player_buttons(&view))
        }
        "history" => {
            let history = bot.sequencer.get_history(guild_id).await;
            Reply::embed(embeds::create_history_embed(&history))
        }
        "stats" => {
            let target = command
                .data
                .options
                .iter()
                .find(|opt| opt.name == "user")
                .and_then(|opt| opt.value.as_user_id())
                .unwrap_or(user_id);
            let name = command
                .data
                .resolved
                .users
                .get(&target)
                .map(|user| user.name.clone())
                .unwrap_or_else(|| command.user.name.clone());
            let stats = bot.stats.get(target);
            Reply {
                ephemeral: true,
                ..Reply::embed(embeds::create_stats_embed(&name, stats.as_ref()))
            }
        }
        "leave" => {
            if bot.gateway.transport(guild_id).is_none() {
                return Err(PlaybackError::NotConnected.into());
            }
            bot.reaper.teardown(guild_id, TeardownReason::Requested).await;
            Reply::text("👋 Left the voice channel")
        }
        other => Reply {
            ephemeral: true,
            ..Reply::text(format!("❌ Unknown command `{}`", other))
        },
    };

    Ok(reply)
}

/// Shared by slash commands and player buttons.
async fn run_action(
    bot: &RadioBot,
    guild_id: GuildId,
    voice: Option<ChannelId>,
    action: PlayerAction,
) -> Result<String> {
    let sequencer = &bot.sequencer;

    let text = match action {
        PlayerAction::PlayPause => {
            if sequencer.pause_resume(guild_id).await? {
                "⏸️ Paused".to_string()
            } else {
                "▶️ Resumed".to_string()
            }
        }
        PlayerAction::Skip => match sequencer.skip(guild_id).await? {
            Some(title) => format!("⏭️ Skipped **{}**", title),
            None => "⏭️ Skipped".to_string(),
        },
        PlayerAction::Stop => {
            sequencer.stop(guild_id).await?;
            "⏹️ Stopped playback and cleared the queue".to_string()
        }
        PlayerAction::Rewind => {
            let (track, _) = sequencer.rewind(guild_id, voice).await?;
            format!("⏮️ Replaying **{}**", track.title)
        }
        PlayerAction::Shuffle => {
            let count = sequencer.shuffle_queue(guild_id).await?;
            format!("🔀 Shuffled {} songs", count)
        }
        PlayerAction::ToggleRadio => {
            let enabled = sequencer
                .snapshot(guild_id)
                .await
                .is_some_and(|s| s.radio_enabled);
            set_radio(bot, guild_id, voice, !enabled).await?
        }
    };

    Ok(text)
}

async fn set_radio(bot: &RadioBot, guild_id: GuildId, voice: Option<ChannelId>, on: bool) -> Result<String> {
    let state = bot.sequencer.toggle_radio(guild_id, on, voice).await?;
    Ok(radio_reply(on, state).to_string())
}

fn radio_reply(on: bool, state: PlaybackState) -> &'static str {
    if !on {
        return "📻 Radio mode disabled.";
    }
    match state {
        PlaybackState::PlayingQueued | PlaybackState::Paused => {
            "📻 Radio enabled. Current song will finish, then radio starts."
        }
        PlaybackState::PlayingRadio => "📻 Radio mode enabled.",
        PlaybackState::Idle => "📻 Radio enabled, but nothing could be streamed yet. Retrying shortly.",
    }
}

async fn play_song(
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    voice: Option<ChannelId>,
    song_id: u64,
) -> Result<Reply> {
    ensure_reachable(bot, guild_id, voice)?;

    let (info, stream_url) = resolve_song(bot, song_id).await?;
    request_track(bot, guild_id, user_id, voice, info, stream_url).await
}

/// Queue-only adds: radio stays on and picks up again once the queue drains.
/// A single ID gets the usual queued notice, a batch only a summary.
async fn enqueue_songs(
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    voice: Option<ChannelId>,
    song_ids: &[u64],
) -> Result<Reply> {
    ensure_reachable(bot, guild_id, voice)?;

    if let [song_id] = song_ids {
        let (info, stream_url) = resolve_song(bot, *song_id).await?;
        let title = info.title.clone();
        let track = QueuedTrack::new(info, Some(stream_url), Some(user_id));
        let outcome = bot.sequencer.enqueue(guild_id, track, false, voice).await?;
        return Ok(Reply::text(outcome_text(&title, outcome)));
    }

    let mut added = 0;
    let mut failed = Vec::new();
    for &song_id in song_ids {
        let track = match resolve_song(bot, song_id).await {
            Ok((info, stream_url)) => QueuedTrack::new(info, Some(stream_url), Some(user_id)),
            Err(e) => {
                warn!("⚠️ Guild {}: could not add song {}: {:#}", guild_id, song_id, e);
                failed.push(song_id);
                continue;
            }
        };
        match bot.sequencer.enqueue(guild_id, track, true, voice).await {
            Ok(_) => added += 1,
            Err(e @ PlaybackError::QueueFull(_)) if added > 0 => {
                info!("📭 Guild {}: batch stopped after {} song(s): {}", guild_id, added, e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Reply::text(batch_text(added, song_ids.len(), &failed)))
}

async fn resolve_song(bot: &RadioBot, song_id: u64) -> Result<(TrackInfo, String)> {
    let song = bot.catalog.get_song(song_id).await?;
    let path = song
        .path
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Song `{}` has no playable file", song_id))?;
    let stream_url = bot
        .catalog
        .resolve(&path)
        .await
        .into_url(&format!("song `{}`", song_id))?;

    let info = bot
        .catalog
        .track_from_song(&song, Some(path), &format!("Song ID {}", song_id));
    Ok((info, stream_url))
}

async fn play_file(
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    voice: Option<ChannelId>,
    path: &str,
) -> Result<Reply> {
    ensure_reachable(bot, guild_id, voice)?;

    let stream_url = bot
        .catalog
        .resolve(path)
        .await
        .into_url(&format!("file `{}`", path))?;

    let info = TrackInfo::new(file_title(path), Some(path.to_string()));
    request_track(bot, guild_id, user_id, voice, info, stream_url).await
}

/// Explicit requests switch radio off, then play now or wait in the queue.
async fn request_track(
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    voice: Option<ChannelId>,
    info: TrackInfo,
    stream_url: String,
) -> Result<Reply> {
    let radio_on = bot
        .sequencer
        .snapshot(guild_id)
        .await
        .is_some_and(|s| s.radio_enabled);
    if radio_on {
        bot.sequencer.toggle_radio(guild_id, false, None).await?;
    }

    let title = info.title.clone();
    let track = QueuedTrack::new(info, Some(stream_url), Some(user_id));
    let outcome = bot
        .sequencer
        .request_play(guild_id, track, PlayMode::Queued, voice)
        .await?;

    Ok(Reply::text(outcome_text(&title, outcome)))
}

fn outcome_text(title: &str, outcome: PlayOutcome) -> String {
    match outcome {
        PlayOutcome::Started => format!("▶️ Now playing **{}**", title),
        PlayOutcome::Queued { position } => {
            format!("📥 Added **{}** to the queue (position {})", title, position)
        }
        PlayOutcome::Replacing => format!("⏭️ Playing **{}** next", title),
    }
}

fn batch_text(added: usize, requested: usize, failed: &[u64]) -> String {
    let mut text = format!("📥 Added {} of {} songs to the queue", added, requested);
    if !failed.is_empty() {
        let ids: Vec<String> = failed.iter().map(|id| format!("`{}`", id)).collect();
        text.push_str(&format!("\n⚠️ Could not add: {}", ids.join(", ")));
    }
    text
}

/// `"12 34,56"` -> `[12, 34, 56]`. Any non-numeric or zero ID rejects the lot.
fn parse_song_ids(raw: &str) -> Option<Vec<u64>> {
    let ids = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().ok().filter(|id| *id > 0))
        .collect::<Option<Vec<_>>>()?;
    (!ids.is_empty()).then_some(ids)
}

async fn show_queue(bot: &RadioBot, guild_id: GuildId, page: usize) -> Reply {
    let page = bot.sequencer.get_queue_page(guild_id, page, QUEUE_PAGE_SIZE).await;
    let current = bot.sequencer.get_now_playing(guild_id).await;
    Reply::embed(embeds::create_queue_embed(&page, current.as_ref()))
}

/// Either the bot is already in voice or the caller is.
fn ensure_reachable(bot: &RadioBot, guild_id: GuildId, voice: Option<ChannelId>) -> Result<(), PlaybackError> {
    if voice.is_none() && bot.gateway.transport(guild_id).is_none() {
        return Err(PlaybackError::NotInVoice);
    }
    Ok(())
}

/// `"Unreleased/Lucid Dreams.mp3"` is shown as `Lucid Dreams`.
fn file_title(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(path)
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn log_failure(what: &str, guild_id: GuildId, e: &anyhow::Error) {
    match e.downcast_ref::<PlaybackError>() {
        Some(playback) if playback.is_user_error() => {
            info!("🙅 {} rejected in guild {}: {}", what, guild_id, playback)
        }
        Some(PlaybackError::Resolution { .. }) => warn!("⚠️ {} failed in guild {}: {}", what, guild_id, e),
        _ => error!("❌ {} failed in guild {}: {:#}", what, guild_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_title_uses_the_stem() {
        assert_eq!(file_title("Unreleased/Lucid Dreams.mp3"), "Lucid Dreams");
        assert_eq!(file_title("no_extension"), "no_extension");
    }

    #[test]
    fn radio_reply_depends_on_what_is_playing() {
        assert_eq!(radio_reply(false, PlaybackState::PlayingRadio), "📻 Radio mode disabled.");
        assert_eq!(
            radio_reply(true, PlaybackState::PlayingQueued),
            "📻 Radio enabled. Current song will finish, then radio starts."
        );
        assert_eq!(radio_reply(true, PlaybackState::PlayingRadio), "📻 Radio mode enabled.");
        assert!(radio_reply(true, PlaybackState::Idle).contains("Retrying"));
    }

    #[test]
    fn song_ids_accept_spaces_and_commas() {
        assert_eq!(parse_song_ids("12 34,56"), Some(vec![12, 34, 56]));
        assert_eq!(parse_song_ids(" 7 , "), Some(vec![7]));
        assert_eq!(parse_song_ids("12 abc"), None);
        assert_eq!(parse_song_ids("0"), None);
        assert_eq!(parse_song_ids(" , "), None);
    }

    #[test]
    fn batch_text_lists_failed_ids() {
        assert_eq!(batch_text(3, 3, &[]), "📥 Added 3 of 3 songs to the queue");
        assert_eq!(
            batch_text(1, 3, &[12, 99]),
            "📥 Added 1 of 3 songs to the queue\n⚠️ Could not add: `12`, `99`"
        );
    }

    #[test]
    fn outcome_text_reports_queue_position() {
        assert_eq!(
            outcome_text("Wishing Well", PlayOutcome::Queued { position: 3 }),
            "📥 Added **Wishing Well** to the queue (position 3)"
        );
        assert_eq!(outcome_text("Wishing Well", PlayOutcome::Started), "▶️ Now playing **Wishing Well**");
    }
}
