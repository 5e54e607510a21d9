//! songbird and serenity implementations of the audio transport traits.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::{tracks::TrackHandle, Call, CoreEvent, Event, Songbird, TrackEvent};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::events::{DriverHandler, TrackEndHandler, TrackErrorHandler};
use crate::audio::stream::AudioSource;
use crate::audio::transport::{
    EventSink, Notice, Notifier, QueueEvent, VoiceConnection, VoiceTransport,
};
use crate::error::{MusicError, Result};
use crate::ui::embeds;

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn VoiceConnection>> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::ConnectionLost(format!("voice connection failed: {}", e)))?;

        {
            let mut handler = call.lock().await;
            // a call left over from an earlier session keeps its handlers
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverHandler {
                    events: events.clone(),
                    event: QueueEvent::Disconnected,
                },
            );
            handler.add_global_event(
                Event::Core(CoreEvent::DriverReconnect),
                DriverHandler {
                    events: events.clone(),
                    event: QueueEvent::Ready,
                },
            );
            handler.add_global_event(
                Event::Core(CoreEvent::DriverConnect),
                DriverHandler {
                    events: events.clone(),
                    event: QueueEvent::Ready,
                },
            );
        }

        info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);
        events.emit(QueueEvent::Ready);

        Ok(Box::new(SongbirdConnection {
            guild_id,
            manager: self.manager.clone(),
            call,
            events,
            current: Mutex::new(None),
        }))
    }
}

pub struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    events: EventSink,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&self, source: AudioSource, volume: f32, epoch: u64) -> Result<()> {
        let provider = source.provider();
        let handle = {
            let mut call = self.call.lock().await;
            call.stop();
            call.play_input(source.into_input())
        };

        let engine = |e: songbird::tracks::ControlError| MusicError::provider("songbird", e.to_string());
        handle.set_volume(volume).map_err(engine)?;
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    events: self.events.clone(),
                    epoch,
                },
            )
            .map_err(engine)?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    events: self.events.clone(),
                    epoch,
                },
            )
            .map_err(engine)?;

        info!("▶️ Playing via {} in guild {} (epoch {})", provider, self.guild_id, epoch);
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) {
        if let Some(handle) = self.current() {
            if let Err(e) = handle.pause() {
                warn!("⚠️ Could not pause in guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn unpause(&self) {
        if let Some(handle) = self.current() {
            if let Err(e) = handle.play() {
                warn!("⚠️ Could not resume in guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn stop(&self) {
        if let Some(handle) = self.current() {
            if let Err(e) = handle.stop() {
                warn!("⚠️ Could not stop in guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn leave(&self) {
        self.call.lock().await.stop();
        self.current.lock().take();

        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Leaving voice in guild {} failed: {}", self.guild_id, e);
        }
        info!("👋 Left voice channel in guild {}", self.guild_id);
    }
}

/// Posts queue notices to the guild's text channel.
pub struct SerenityNotifier {
    http: Arc<Http>,
}

impl SerenityNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for SerenityNotifier {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) {
        let message = match notice {
            Notice::NowPlaying(track) => CreateMessage::new()
                .content(format!("🎵 Now playing: **{}**", track.title))
                .embed(embeds::now_playing_embed(&track)),
            Notice::PlaybackFailed { title, reason } => {
                let mut message =
                    CreateMessage::new().content(format!("❌ Error playing song: {}", reason));
                if !title.is_empty() {
                    message = message
                        .embed(embeds::error_embed("Skipped", &format!("**{}**", title)));
                }
                message
            }
            Notice::ConnectionLost => CreateMessage::new().content(
                "🔌 Lost the voice connection and could not reconnect. The queue was cleared.",
            ),
        };

        if let Err(e) = channel_id.send_message(&self.http, message).await {
            error!("❌ Could not post to channel {}: {:?}", channel_id, e);
        }
    }
}
