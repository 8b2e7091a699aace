use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        now_playing::{format_clock, PlayerView},
        queue::QueuePage,
        session::{NowPlaying, PlaybackState},
        stats::UserStats,
    },
    sources::TrackInfo,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const RADIO_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para embeds informativos
const STANDARD_FOOTER: &str = "📻 WRLD Radio";

/// The player message. Idle sessions get a "Nothing playing" card instead of
/// disappearing.
pub fn create_player_embed(view: &PlayerView) -> CreateEmbed {
    let Some(title) = &view.title else {
        return CreateEmbed::default()
            .title("Now Playing")
            .description("Nothing playing")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(view.footer()));
    };

    let color = match view.state {
        PlaybackState::Paused => colors::WARNING_ORANGE,
        PlaybackState::PlayingRadio => colors::RADIO_PURPLE,
        _ => colors::SUCCESS_GREEN,
    };

    let mut embed = CreateEmbed::default()
        .title("Now Playing")
        .description(title)
        .color(color);

    if let Some(thumbnail) = &view.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(category) = &view.category {
        embed = embed.field("Category", category, true);
    }
    if let Some(era) = &view.era {
        embed = embed.field("Era", era, true);
    }
    if let Some(progress) = &view.progress {
        embed = embed.field("Progress", progress, false);
    }
    if let Some(requester) = view.requester {
        embed = embed.field("Requested by", format!("<@{}>", requester), true);
    }
    if let Some(previous) = &view.previous {
        embed = embed.field("Previous", format!("**{}**", previous), true);
    }
    if let Some(queue) = view.queue_field() {
        let name = if view.queue_len == 0 { "Up Next" } else { "Queue" };
        embed = embed.field(name, queue, true);
    }

    embed.footer(CreateEmbedFooter::new(view.footer()))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(page: &QueuePage, current: Option<&NowPlaying>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if let Some(current) = current {
        embed = embed.field(
            if current.is_radio { "📻 Playing (radio)" } else { "▶️ Playing" },
            format!("**{}**", current.track.title),
            false,
        );
    }

    if page.total_items == 0 {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song_id>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut description = String::new();
    for (i, item) in page.items.iter().enumerate() {
        let duration = item
            .info
            .duration
            .map(|d| format!(" `[{}]`", format_clock(d)))
            .unwrap_or_default();
        description.push_str(&format!("**{}**. {}{}\n", page.offset + i + 1, item.info.title, duration));
    }
    embed = embed.field("Up next", description, false);

    let mut info = format!("**Total:** {} track(s)", page.total_items);
    if page.total_duration > Duration::ZERO {
        info.push_str(&format!(" • **Duration:** {}", format_clock(page.total_duration)));
    }
    embed = embed.field("Info", info, false);

    let footer = if page.total_pages > 1 {
        format!("Page {} of {} • WRLD Radio", page.current_page, page.total_pages)
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

pub fn create_history_embed(history: &[TrackInfo]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🕘 Recently played")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if history.is_empty() {
        return embed
            .description("Nothing has been played yet")
            .color(colors::NEUTRAL_GRAY);
    }

    let lines: Vec<String> = history
        .iter()
        .enumerate()
        .map(|(i, track)| match &track.metadata.era {
            Some(era) => format!("**{}**. {} _({})_", i + 1, track.title, era),
            None => format!("**{}**. {}", i + 1, track.title),
        })
        .collect();

    embed.description(lines.join("\n"))
}

/// Estadísticas de escucha de un usuario
pub fn create_stats_embed(display_name: &str, stats: Option<&UserStats>) -> CreateEmbed {
    let title = format!("📊 {}'s Listening Stats", display_name);

    let Some(stats) = stats.filter(|s| s.total_plays > 0) else {
        return CreateEmbed::default()
            .title(title)
            .description("No listening history yet. Play some songs to start tracking!")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .color(colors::RADIO_PURPLE)
        .field("Total Plays", stats.total_plays.to_string(), true)
        .field("Listen Time", format_listen_time(stats.total_listened), true);

    let songs = stats.top_songs(5);
    if !songs.is_empty() {
        embed = embed.field("Top Songs", ranking(&songs), false);
    }
    let eras = stats.top_eras(3);
    if !eras.is_empty() {
        embed = embed.field("Top Eras", ranking(&eras), false);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn ranking(entries: &[(String, u32)]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, (name, count))| {
            let plural = if *count == 1 { "" } else { "s" };
            format!("`{}.` **{}** • {} play{}", i + 1, name, count, plural)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `2h 5m`, `4m 10s` o `42s`
fn format_listen_time(total: Duration) -> String {
    let secs = total.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn listen_time_drops_seconds_once_past_an_hour() {
        assert_eq!(format_listen_time(Duration::from_secs(7530)), "2h 5m");
        assert_eq!(format_listen_time(Duration::from_secs(250)), "4m 10s");
        assert_eq!(format_listen_time(Duration::from_secs(42)), "42s");
    }

    #[test]
    fn ranking_pluralizes_play_counts() {
        let entries = vec![("Lucid Dreams".to_string(), 3), ("Robbery".to_string(), 1)];
        assert_eq!(
            ranking(&entries),
            "`1.` **Lucid Dreams** • 3 plays\n`2.` **Robbery** • 1 play"
        );
    }
}
