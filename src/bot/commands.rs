use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::{Command, CommandOptionType},
        id::GuildId,
    },
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        playfile_command(),
        queue_command(),
        enqueue_command(),
        radio_command(),
        stop_command(),
        skip_command(),
        pause_command(),
        rewind_command(),
        shuffle_command(),
        nowplaying_command(),
        history_command(),
        stats_command(),
        leave_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song from the catalog by its ID")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "song_id", "Catalog song ID")
                .min_int_value(1)
                .required(true),
        )
}

fn playfile_command() -> CreateCommand {
    CreateCommand::new("playfile")
        .description("Play a catalog file by its path")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "path", "File path in the catalog")
                .required(true),
        )
}

fn radio_command() -> CreateCommand {
    CreateCommand::new("radio")
        .description("Turn radio mode on or off")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "on or off")
                .add_string_choice("on", "on")
                .add_string_choice("off", "off")
                .required(true),
        )
}

// Comandos de control

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and turn radio off")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause or resume playback")
}

fn rewind_command() -> CreateCommand {
    CreateCommand::new("rewind").description("Replay the previous song")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Page number")
                .min_int_value(1),
        )
}

fn enqueue_command() -> CreateCommand {
    CreateCommand::new("enqueue")
        .description("Add songs to the queue without turning radio off")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "song_ids",
                "One or more catalog song IDs, separated by spaces or commas",
            )
            .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffle the queued songs")
}

// Comandos de información

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show what is playing")
}

fn history_command() -> CreateCommand {
    CreateCommand::new("history").description("Show recently played songs")
}

fn stats_command() -> CreateCommand {
    CreateCommand::new("stats")
        .description("Show listening stats")
        .add_option(CreateCommandOption::new(
            CommandOptionType::User,
            "user",
            "Whose stats to show (defaults to you)",
        ))
}

// Comandos de conexión

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Leave the voice channel")
}
