use serenity::async_trait;
use songbird::{
    tracks::PlayMode, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use tracing::{debug, error, warn};

use crate::audio::transport::{EventSink, QueueEvent};

/// Reports a track reaching its end.
pub struct TrackEndHandler {
    pub events: EventSink,
    pub epoch: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        debug!("🎵 Track {} ended", self.epoch);
        self.events.emit(QueueEvent::TrackEnded { epoch: self.epoch });
        None
    }
}

/// Reports a track the player could not continue.
pub struct TrackErrorHandler {
    pub events: EventSink,
    pub epoch: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        let mut message = "audio resource failed during playback".to_string();
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                error!("❌ Track {} failed: {:?}", self.epoch, state.playing);
                if let PlayMode::Errored(e) = &state.playing {
                    message = format!("{:?}", e);
                }
            }
        }

        self.events.emit(QueueEvent::TrackErrored {
            epoch: self.epoch,
            message,
        });
        None
    }
}

/// Reports voice driver connection changes.
pub struct DriverHandler {
    pub events: EventSink,
    pub event: QueueEvent,
}

#[async_trait]
impl VoiceEventHandler for DriverHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match ctx {
            EventContext::DriverDisconnect(data) => {
                warn!("🔌 Voice driver disconnected: {:?}", data.reason);
            }
            EventContext::DriverReconnect(_) => debug!("🔌 Voice driver reconnected"),
            _ => {}
        }

        self.events.emit(self.event.clone());
        None
    }
}
