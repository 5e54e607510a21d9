use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::{EnqueueOutcome, QueueTarget, SessionManager};
use crate::error::MusicError;
use crate::sources::Resolver;
use crate::ui::embeds;

/// The six slash commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Skip,
    Stop,
    Queue,
    Pause,
    Resume,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Play,
        Command::Skip,
        Command::Stop,
        Command::Queue,
        Command::Pause,
        Command::Resume,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Skip => "skip",
            Command::Stop => "stop",
            Command::Queue => "queue",
            Command::Pause => "pause",
            Command::Resume => "resume",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Command::Play => "Play a song from YouTube",
            Command::Skip => "Skip the current song",
            Command::Stop => "Stop playing music and clear the queue",
            Command::Queue => "Show the current song queue",
            Command::Pause => "Pause the current song",
            Command::Resume => "Resume the paused song",
        }
    }

    /// Reply when the caller is not in a voice channel. `queue` has none.
    fn needs_voice(&self) -> Option<&'static str> {
        match self {
            Command::Play => Some("You need to be in a voice channel to play music!"),
            Command::Skip => Some("You need to be in a voice channel to skip songs!"),
            Command::Stop => Some("You need to be in a voice channel to stop the music!"),
            Command::Pause => Some("You need to be in a voice channel to pause music!"),
            Command::Resume => Some("You need to be in a voice channel to resume music!"),
            Command::Queue => None,
        }
    }
}

/// What the dispatcher needs from one incoming slash command.
#[async_trait]
pub trait CommandContext: Send + Sync {
    fn command_name(&self) -> &str;

    fn string_option(&self, name: &str) -> Option<String>;

    fn guild_id(&self) -> Option<GuildId>;

    /// Text channel the command was issued in
    fn channel_id(&self) -> ChannelId;

    /// Voice channel the caller is currently in
    fn caller_voice_channel(&self) -> Option<ChannelId>;

    /// Whether the bot may connect and speak in `channel_id`
    async fn bot_can_speak_in(&self, channel_id: ChannelId) -> bool;

    async fn reply(&self, content: &str, ephemeral: bool) -> Result<()>;

    async fn edit_reply(&self, content: &str) -> Result<()>;
}

/// Maps slash commands to queue operations and renders the replies.
pub struct Dispatcher {
    resolver: Arc<Resolver>,
    sessions: Arc<SessionManager>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<Resolver>, sessions: Arc<SessionManager>) -> Self {
        Self { resolver, sessions }
    }

    pub async fn dispatch(&self, ctx: &dyn CommandContext) -> Result<()> {
        let Some(guild_id) = ctx.guild_id() else {
            return ctx
                .reply("This command can only be used in a server!", true)
                .await;
        };

        let Some(command) = Command::parse(ctx.command_name()) else {
            warn!("⚠️ Unknown command /{} in guild {}", ctx.command_name(), guild_id);
            return ctx.reply("Unknown command!", true).await;
        };

        info!("📝 /{} used in guild {}", command.name(), guild_id);

        let voice_channel = ctx.caller_voice_channel();
        if let (Some(message), None) = (command.needs_voice(), voice_channel) {
            return ctx.reply(message, true).await;
        }

        match (command, voice_channel) {
            (Command::Play, Some(voice_channel)) => self.play(ctx, guild_id, voice_channel).await,
            (Command::Skip, _) => {
                let reply = match self.sessions.skip(guild_id).await {
                    Ok(()) => Ok("⏭️ Skipped the current song!".to_string()),
                    Err(MusicError::EmptyQueue) => Err("There are no songs to skip!".to_string()),
                    Err(e) => Err(e.user_message()),
                };
                respond(ctx, reply).await
            }
            (Command::Stop, _) => {
                let reply = match self.sessions.stop(guild_id).await {
                    Ok(()) => Ok("⏹️ Music playback stopped and queue cleared!".to_string()),
                    Err(MusicError::EmptyQueue) => Err("There are no songs playing!".to_string()),
                    Err(e) => Err(e.user_message()),
                };
                respond(ctx, reply).await
            }
            (Command::Queue, _) => {
                let reply = self
                    .sessions
                    .peek(guild_id)
                    .await
                    .map(|tracks| embeds::queue_listing(&tracks))
                    .map_err(|e| e.user_message());
                respond(ctx, reply).await
            }
            (Command::Pause, _) => {
                let reply = self
                    .sessions
                    .pause(guild_id)
                    .await
                    .map(|()| "⏸️ Paused the current song!".to_string())
                    .map_err(|e| e.user_message());
                respond(ctx, reply).await
            }
            (Command::Resume, _) => {
                let reply = self
                    .sessions
                    .resume(guild_id)
                    .await
                    .map(|()| "▶️ Resumed the current song!".to_string())
                    .map_err(|e| e.user_message());
                respond(ctx, reply).await
            }
            // rejected above
            (Command::Play, None) => Ok(()),
        }
    }

    async fn play(&self, ctx: &dyn CommandContext, guild_id: GuildId, voice_channel: ChannelId) -> Result<()> {
        if !ctx.bot_can_speak_in(voice_channel).await {
            return ctx.reply(&MusicError::Permission.to_string(), true).await;
        }

        let query = ctx.string_option("song").unwrap_or_default();
        let query = query.trim();
        if query.is_empty() {
            return ctx.reply(&MusicError::InvalidInput.to_string(), true).await;
        }

        ctx.reply(&format!("🔍 Searching for `{}`...", query), false)
            .await?;

        let track = match self.resolver.resolve(query).await {
            Ok(track) => track,
            Err(MusicError::NotFound(_)) => {
                return ctx.edit_reply(&embeds::not_found_message(query)).await;
            }
            Err(e) => {
                return ctx.edit_reply(&format!("❌ Error: {}", e.user_message())).await;
            }
        };

        let target = QueueTarget {
            guild_id,
            voice_channel,
            text_channel: ctx.channel_id(),
        };
        let title = track.title.clone();

        let content = match self.sessions.enqueue(target, track).await {
            Ok(EnqueueOutcome::Created) => format!("🎵 Added to queue: **{}**", title),
            Ok(EnqueueOutcome::Queued { .. }) => format!("✅ Added to queue: **{}**", title),
            Err(e @ MusicError::ConnectionLost(_)) => {
                format!("❌ Error connecting to voice channel: {}", e.user_message())
            }
            Err(e) => format!("❌ Error: {}", e.user_message()),
        };
        ctx.edit_reply(&content).await
    }
}

/// Successes are public, failures private.
async fn respond(ctx: &dyn CommandContext, reply: std::result::Result<String, String>) -> Result<()> {
    match reply {
        Ok(content) => ctx.reply(&content, false).await,
        Err(content) => ctx.reply(&content, true).await,
    }
}
