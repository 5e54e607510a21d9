use anyhow::{Context as _, Result};
use std::time::Duration;

use crate::audio::SessionSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // commands scoped to one guild

    // Audio
    pub default_volume: u8,
    pub idle_timeout: Duration,
    pub reconnect_timeout: Duration,

    // Providers
    pub ytdlp_path: String,
    pub http_timeout: Duration,
    pub stream_buffer_bytes: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Used by `load` with the
    /// process environment.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let duration = |key: &str, default: &str| -> Result<Duration> {
            let raw = or_default(key, default);
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("{} is not a valid duration: {}", key, raw))
        };

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .trim()
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID")
                .map(|id| id.trim().parse())
                .transpose()
                .context("GUILD_ID must be a number")?,

            // Audio
            default_volume: or_default("DEFAULT_VOLUME", "5")
                .trim()
                .parse()
                .context("DEFAULT_VOLUME must be a number between 0 and 10")?,
            idle_timeout: duration("IDLE_TIMEOUT", "5m")?,
            reconnect_timeout: duration("RECONNECT_TIMEOUT", "5s")?,

            // Providers
            ytdlp_path: or_default("YTDLP_PATH", "yt-dlp"),
            http_timeout: duration("HTTP_TIMEOUT", "15s")?,
            stream_buffer_bytes: or_default("STREAM_BUFFER_BYTES", "33554432")
                .trim()
                .parse()
                .context("STREAM_BUFFER_BYTES must be a number")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.application_id == 0 {
            anyhow::bail!("APPLICATION_ID must not be 0");
        }

        if self.guild_id == Some(0) {
            anyhow::bail!("GUILD_ID must not be 0");
        }

        if self.default_volume > 10 {
            anyhow::bail!("Default volume must be between 0 and 10, got: {}", self.default_volume);
        }

        if self.idle_timeout.is_zero() || self.reconnect_timeout.is_zero() {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.stream_buffer_bytes == 0 {
            anyhow::bail!("Stream buffer must be greater than 0");
        }

        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: self.default_volume,
            idle_timeout: self.idle_timeout,
            reconnect_timeout: self.reconnect_timeout,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (commands: {})\n  \
            Audio: volume {}/10, idle {}, reconnect {}\n  \
            Providers: {} (http timeout {}, buffer {} KiB)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.default_volume,
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.reconnect_timeout),
            self.ytdlp_path,
            humantime::format_duration(self.http_timeout),
            self.stream_buffer_bytes / 1024,
        )
    }
}
