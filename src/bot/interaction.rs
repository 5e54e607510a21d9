use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId},
        permissions::Permissions,
    },
    prelude::Context,
};
use tracing::warn;

use super::dispatcher::CommandContext;

/// A slash command as received from the gateway.
pub struct InteractionContext<'a> {
    ctx: &'a Context,
    command: &'a CommandInteraction,
}

impl<'a> InteractionContext<'a> {
    pub fn new(ctx: &'a Context, command: &'a CommandInteraction) -> Self {
        Self { ctx, command }
    }
}

#[async_trait]
impl CommandContext for InteractionContext<'_> {
    fn command_name(&self) -> &str {
        &self.command.data.name
    }

    fn string_option(&self, name: &str) -> Option<String> {
        self.command
            .data
            .options
            .iter()
            .find(|opt| opt.name == name)
            .and_then(|opt| opt.value.as_str())
            .map(str::to_string)
    }

    fn guild_id(&self) -> Option<GuildId> {
        self.command.guild_id
    }

    fn channel_id(&self) -> ChannelId {
        self.command.channel_id
    }

    fn caller_voice_channel(&self) -> Option<ChannelId> {
        let guild = self.command.guild_id?.to_guild_cached(&self.ctx.cache)?;
        guild
            .voice_states
            .get(&self.command.user.id)
            .and_then(|voice_state| voice_state.channel_id)
    }

    async fn bot_can_speak_in(&self, channel_id: ChannelId) -> bool {
        let Some(guild_id) = self.command.guild_id else {
            return false;
        };
        let bot_id = self.ctx.cache.current_user().id;

        let member = match guild_id.member(self.ctx, bot_id).await {
            Ok(member) => member,
            Err(e) => {
                warn!("⚠️ Could not look up bot member in guild {}: {:?}", guild_id, e);
                return false;
            }
        };

        let Some(guild) = guild_id.to_guild_cached(&self.ctx.cache) else {
            return false;
        };
        let Some(channel) = guild.channels.get(&channel_id) else {
            return false;
        };

        guild
            .user_permissions_in(channel, &member)
            .contains(Permissions::CONNECT | Permissions::SPEAK)
    }

    async fn reply(&self, content: &str, ephemeral: bool) -> Result<()> {
        self.command
            .create_response(
                &self.ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(content)
                        .ephemeral(ephemeral),
                ),
            )
            .await?;
        Ok(())
    }

    async fn edit_reply(&self, content: &str) -> Result<()> {
        self.command
            .edit_response(&self.ctx.http, EditInteractionResponse::new().content(content))
            .await?;
        Ok(())
    }
}
