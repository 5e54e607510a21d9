//! # Bot Module
//!
//! Discord glue for guildtune.
//!
//! [`MusicBot`] implements serenity's [`EventHandler`]: it registers the
//! slash commands on `ready`, hands every command interaction to the
//! [`dispatcher::Dispatcher`] and reports the bot being dropped from voice to
//! the session manager. The songbird side lives in [`voice`] and [`events`].

use serenity::{
    all::{Context, EventHandler, Interaction, Ready, VoiceState},
    async_trait,
    model::id::GuildId,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod interaction;
pub mod voice;

use crate::audio::SessionManager;
use dispatcher::Dispatcher;
use interaction::InteractionContext;

pub struct MusicBot {
    dispatcher: Dispatcher,
    sessions: Arc<SessionManager>,
    /// Register commands for this guild only instead of globally
    guild_id: Option<GuildId>,
}

impl MusicBot {
    pub fn new(dispatcher: Dispatcher, sessions: Arc<SessionManager>, guild_id: Option<GuildId>) -> Self {
        Self {
            dispatcher,
            sessions,
            guild_id,
        }
    }

    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registering slash commands...");

        match self.guild_id {
            Some(guild_id) => {
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ The bot is not in guild {}, skipping registration", guild_id);
                    return Ok(());
                }
                commands::register_guild_commands(&ctx.http, guild_id).await
            }
            None => commands::register_global_commands(&ctx.http).await,
        }
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error registering commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let context = InteractionContext::new(&ctx, &command);
            if let Err(e) = self.dispatcher.dispatch(&context).await {
                error!("❌ Error handling /{}: {:?}", command.data.name, e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot was disconnected from voice in guild {}", guild_id);
            self.sessions.notify_disconnect(guild_id).await;
        }
    }
}
