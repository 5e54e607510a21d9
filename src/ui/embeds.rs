use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::sources::{search_link, Track};

/// Bot colour palette
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

const STANDARD_FOOTER: &str = "🎵 guildtune";

/// Embed posted to the text channel when a track starts.
pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duration", format_duration(duration), true),
        None => embed.field("⏱️ Duration", "🔴 Live", true),
    };

    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&track.source_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Plain-text listing for `/queue`, head first.
pub fn queue_listing(tracks: &[Track]) -> String {
    let Some(head) = tracks.first() else {
        return "The queue is empty!".to_string();
    };

    let lines: Vec<String> = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| match track.duration() {
            Some(duration) => format!("{}. **{}** ({})", i + 1, track.title, format_duration(duration)),
            None => format!("{}. **{}**", i + 1, track.title),
        })
        .collect();

    format!(
        "📜 **Song Queue**\nNow playing: **{}**\n\n{}",
        head.title,
        lines.join("\n")
    )
}

/// Reply for a search that found nothing.
pub fn not_found_message(query: &str) -> String {
    format!(
        "❌ No songs found! You can search directly on YouTube: <{}>",
        search_link(query)
    )
}

/// `m:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
