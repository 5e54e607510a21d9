//! Interfaces to the voice transport and the guild text channel.
//!
//! The queue never talks to songbird or serenity directly. Connections
//! report back through an [`EventSink`], which turns every engine callback
//! into one of the [`QueueEvent`] variants and tags it with the guild and
//! session it belongs to.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;
use tracing::debug;

use super::stream::AudioSource;
use crate::error::Result;
use crate::sources::Track;

/// Closed set of transition inputs coming from outside the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// Connection is up (first join or recovery)
    Ready,
    /// Connection dropped; may still recover
    Disconnected,
    /// Track handed over with `epoch` finished or was stopped
    TrackEnded { epoch: u64 },
    /// Track handed over with `epoch` failed inside the engine
    TrackErrored { epoch: u64, message: String },
    IdleExpired { ticket: u64 },
    ReconnectExpired { ticket: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildEvent {
    pub guild_id: GuildId,
    pub session: u64,
    pub event: QueueEvent,
}

/// Sender bound to one guild session.
#[derive(Debug, Clone)]
pub struct EventSink {
    guild_id: GuildId,
    session: u64,
    tx: mpsc::UnboundedSender<GuildEvent>,
}

impl EventSink {
    pub fn new(guild_id: GuildId, session: u64, tx: mpsc::UnboundedSender<GuildEvent>) -> Self {
        Self {
            guild_id,
            session,
            tx,
        }
    }

    pub fn emit(&self, event: QueueEvent) {
        let event = GuildEvent {
            guild_id: self.guild_id,
            session: self.session,
            event,
        };
        if let Err(e) = self.tx.send(event) {
            debug!("Event loop gone, dropping {:?}", e.0.event);
        }
    }
}

/// Joins voice channels.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Joins `channel_id` and subscribes a fresh player to the connection.
    /// Connection and player events are reported through `events`.
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn VoiceConnection>>;
}

/// A joined voice connection together with its player.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Starts `source` at `volume` (0.0–1.0). End and error events for it
    /// carry `epoch`.
    async fn play(&self, source: AudioSource, volume: f32, epoch: u64) -> Result<()>;

    async fn pause(&self);

    async fn unpause(&self);

    /// Stops the current track; the engine then reports it as ended.
    async fn stop(&self);

    /// Leaves the channel and releases the connection.
    async fn leave(&self);
}

/// Messages posted to a guild's text channel outside command replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NowPlaying(Track),
    PlaybackFailed { title: String, reason: String },
    ConnectionLost,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: ChannelId, notice: Notice);
}
