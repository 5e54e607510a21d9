use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    http::Http,
    model::{
        application::{Command as ApplicationCommand, CommandOptionType},
        id::GuildId,
    },
};
use tracing::info;

use super::dispatcher::Command;

/// Builds the slash command definitions.
pub fn definitions() -> Vec<CreateCommand> {
    Command::ALL
        .into_iter()
        .map(|command| {
            let definition = CreateCommand::new(command.name()).description(command.description());
            match command {
                Command::Play => definition.add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "song",
                        "The song name or YouTube URL",
                    )
                    .required(true),
                ),
                _ => definition,
            }
        })
        .collect()
}

/// Registers the commands globally.
pub async fn register_global_commands(http: &Http) -> Result<()> {
    let registered = ApplicationCommand::set_global_commands(http, definitions()).await?;
    info!("🌐 {} global commands registered", registered.len());
    Ok(())
}

/// Registers the commands for a single guild, for development.
pub async fn register_guild_commands(http: &Http, guild_id: GuildId) -> Result<()> {
    let registered = guild_id.set_commands(http, definitions()).await?;
    info!("🏠 {} commands registered for guild {}", registered.len(), guild_id);
    Ok(())
}

pub async fn delete_global_commands(http: &Http) -> Result<()> {
    ApplicationCommand::set_global_commands(http, Vec::new()).await?;
    info!("🗑️ Global commands deleted");
    Ok(())
}

pub async fn delete_guild_commands(http: &Http, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(http, Vec::new()).await?;
    info!("🗑️ Commands deleted for guild {}", guild_id);
    Ok(())
}

/// One-shot command maintenance requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maintenance {
    DeleteGlobal,
    DeleteGuild,
    ForceGlobal,
    ForceGuild,
}

impl Maintenance {
    pub fn from_args<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().find_map(|arg| match arg.as_ref() {
            "--delete-global" => Some(Self::DeleteGlobal),
            "--delete-guild" => Some(Self::DeleteGuild),
            "--force-global" => Some(Self::ForceGlobal),
            "--force-guild" => Some(Self::ForceGuild),
            _ => None,
        })
    }

    pub fn needs_guild(&self) -> bool {
        matches!(self, Self::DeleteGuild | Self::ForceGuild)
    }

    /// Runs the action. Guild actions require `guild_id`.
    pub async fn run(&self, http: &Http, guild_id: Option<GuildId>) -> Result<()> {
        if self.needs_guild() && guild_id.is_none() {
            anyhow::bail!("GUILD_ID is required for {:?}", self);
        }

        match (self, guild_id) {
            (Self::DeleteGuild, Some(guild_id)) => delete_guild_commands(http, guild_id).await,
            (Self::ForceGuild, Some(guild_id)) => register_guild_commands(http, guild_id).await,
            (Self::DeleteGlobal, _) => delete_global_commands(http).await,
            (Self::ForceGlobal, _) => register_global_commands(http).await,
            (Self::DeleteGuild | Self::ForceGuild, None) => Ok(()),
        }
    }
}
