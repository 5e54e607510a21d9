//! In-memory stand-ins for songbird and serenity used by the audio tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::{File, Input};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::stream::{AudioSource, StreamProvider};
use super::transport::{EventSink, Notice, Notifier, QueueEvent, VoiceConnection, VoiceTransport};
use crate::error::{MusicError, Result};
use crate::sources::Track;

pub fn silent_source(provider: &'static str) -> AudioSource {
    AudioSource::new(Input::from(File::new("silence.mp3")), provider)
}

/// Lets spawned playback tasks and the event loop run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Join(ChannelId),
    Play { epoch: u64, volume: f32 },
    Pause,
    Unpause,
    Stop,
    Leave,
}

#[derive(Default)]
struct TransportState {
    calls: Vec<Call>,
    sinks: HashMap<GuildId, EventSink>,
    playing: HashMap<GuildId, u64>,
}

/// Transport whose connections become ready immediately and report a
/// stopped track as ended, like songbird does.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
    refuse_join: Arc<Mutex<Option<String>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_joins(&self, reason: &str) {
        *self.refuse_join.lock() = Some(reason.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn plays(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Play { .. }))
            .count()
    }

    /// Pushes an engine or connection event as if the driver raised it.
    pub fn emit(&self, guild_id: GuildId, event: QueueEvent) {
        let sink = self.state.lock().sinks.get(&guild_id).cloned();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    /// Simulates the current track running to its natural end.
    pub fn finish_track(&self, guild_id: GuildId) {
        let epoch = self.state.lock().playing.get(&guild_id).copied();
        if let Some(epoch) = epoch {
            self.emit(guild_id, QueueEvent::TrackEnded { epoch });
        }
    }

    pub fn current_epoch(&self, guild_id: GuildId) -> Option<u64> {
        self.state.lock().playing.get(&guild_id).copied()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: EventSink,
    ) -> Result<Box<dyn VoiceConnection>> {
        if let Some(reason) = self.refuse_join.lock().clone() {
            return Err(MusicError::ConnectionLost(reason));
        }

        {
            let mut state = self.state.lock();
            state.calls.push(Call::Join(channel_id));
            state.sinks.insert(guild_id, events.clone());
        }
        events.emit(QueueEvent::Ready);

        Ok(Box::new(FakeConnection {
            guild_id,
            events,
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    guild_id: GuildId,
    events: EventSink,
    state: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&self, _source: AudioSource, volume: f32, epoch: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Play { epoch, volume });
        state.playing.insert(self.guild_id, epoch);
        Ok(())
    }

    async fn pause(&self) {
        self.state.lock().calls.push(Call::Pause);
    }

    async fn unpause(&self) {
        self.state.lock().calls.push(Call::Unpause);
    }

    async fn stop(&self) {
        let epoch = {
            let mut state = self.state.lock();
            state.calls.push(Call::Stop);
            state.playing.remove(&self.guild_id)
        };
        if let Some(epoch) = epoch {
            self.events.emit(QueueEvent::TrackEnded { epoch });
        }
    }

    async fn leave(&self) {
        let mut state = self.state.lock();
        state.calls.push(Call::Leave);
        state.playing.remove(&self.guild_id);
    }
}

/// Stream provider that fails for any title containing "broken" and can
/// be slowed down to widen the `Starting` window.
pub struct FakeStreams {
    name: &'static str,
    delay: Option<Duration>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl FakeStreams {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            delay: None,
            opened: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn opened(&self) -> Arc<Mutex<Vec<String>>> {
        self.opened.clone()
    }
}

#[async_trait]
impl StreamProvider for FakeStreams {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn open(&self, track: &Track) -> Result<AudioSource> {
        self.opened.lock().push(track.title.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if track.title.contains("broken") {
            return Err(MusicError::provider(self.name, "RESOURCE_ERROR"));
        }
        Ok(silent_source(self.name))
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<(ChannelId, Notice)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn now_playing(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::NowPlaying(track) => Some(track.title),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel_id: ChannelId, notice: Notice) {
        self.notices.lock().push((channel_id, notice));
    }
}
