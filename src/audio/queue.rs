use serenity::model::id::{ChannelId, GuildId};
use std::{collections::VecDeque, sync::Arc};
use tokio_util::sync::DropGuard;
use tracing::{debug, info};

use super::transport::VoiceConnection;
use crate::error::{MusicError, Result};
use crate::sources::Track;

/// Lifecycle of a [`GuildQueue`].
///
/// `Starting` covers the window in which the head track's stream is being
/// opened. Entering it is a claim taken under the guild lock through
/// [`GuildQueue::claim_start`], so at most one stream open per queue holds
/// the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Connecting,
    Starting,
    Playing,
    Paused,
    Idle,
    Destroyed,
}

/// One-shot timer owned by the queue. Dropping it cancels the timer task.
#[derive(Debug)]
pub struct Deadline {
    ticket: u64,
    _guard: DropGuard,
}

impl Deadline {
    pub fn new(ticket: u64, guard: DropGuard) -> Self {
        Self {
            ticket,
            _guard: guard,
        }
    }
}

/// Playback state for one guild.
pub struct GuildQueue {
    guild_id: GuildId,
    session: u64,
    text_channel: ChannelId,
    voice_channel: ChannelId,
    tracks: VecDeque<Track>,
    connection: Option<Arc<dyn VoiceConnection>>,
    volume: u8,
    state: QueueState,
    is_playing: bool,
    load_epoch: u64,
    playing_epoch: Option<u64>,
    idle_timer: Option<Deadline>,
    reconnect_timer: Option<Deadline>,
}

impl GuildQueue {
    pub fn new(
        guild_id: GuildId,
        session: u64,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        volume: u8,
    ) -> Self {
        Self {
            guild_id,
            session,
            text_channel,
            voice_channel,
            tracks: VecDeque::new(),
            connection: None,
            volume: volume.min(10),
            state: QueueState::Connecting,
            is_playing: false,
            load_epoch: 0,
            playing_epoch: None,
            idle_timer: None,
            reconnect_timer: None,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == QueueState::Destroyed
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Track that is playing or about to play.
    pub fn head(&self) -> Option<&Track> {
        self.tracks.front()
    }

    pub fn text_channel(&self) -> ChannelId {
        self.text_channel
    }

    pub fn voice_channel(&self) -> ChannelId {
        self.voice_channel
    }

    /// Playback gain for the engine.
    pub fn volume_scale(&self) -> f32 {
        f32::from(self.volume) / 10.0
    }

    pub fn connection(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.connection.clone()
    }

    pub fn attach(&mut self, connection: Box<dyn VoiceConnection>) {
        self.connection = Some(Arc::from(connection));
    }

    /// Appends a track and returns its 1-based position.
    pub fn push(&mut self, track: Track) -> usize {
        if self.idle_timer.take().is_some() {
            debug!("⏱️ Idle timer cancelled for guild {}", self.guild_id);
        }
        info!("➕ Queued for guild {}: {}", self.guild_id, track.title);
        self.tracks.push_back(track);
        self.tracks.len()
    }

    /// Claims playback of the head track and moves to `Starting`. Returns the
    /// track with the epoch its engine events will carry, or `None` when the
    /// queue is empty. Any earlier claim stops being current.
    pub fn claim_start(&mut self) -> Option<(Track, u64)> {
        let head = self.tracks.front()?.clone();
        self.load_epoch += 1;
        self.state = QueueState::Starting;
        self.is_playing = false;
        self.playing_epoch = None;
        Some((head, self.load_epoch))
    }

    /// Whether a stream opened for `epoch` may still be played.
    pub fn is_current_load(&self, epoch: u64) -> bool {
        self.state == QueueState::Starting && self.load_epoch == epoch
    }

    /// Discards any stream open still in flight.
    pub fn invalidate_load(&mut self) {
        self.load_epoch += 1;
    }

    pub fn mark_playing(&mut self, epoch: u64) {
        self.state = QueueState::Playing;
        self.is_playing = true;
        self.playing_epoch = Some(epoch);
    }

    /// Drops the head track.
    pub fn drop_head(&mut self) -> Option<Track> {
        let dropped = self.tracks.pop_front();
        if self.tracks.is_empty() {
            self.is_playing = false;
        }
        dropped
    }

    /// Accepts an end/error report for the engine's current track and drops
    /// it. Reports for any other epoch are stale and ignored.
    pub fn finish_current(&mut self, epoch: u64) -> bool {
        if self.playing_epoch != Some(epoch) {
            return false;
        }
        self.playing_epoch = None;
        self.is_playing = false;
        self.drop_head();
        true
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            QueueState::Playing => {
                self.state = QueueState::Paused;
                self.is_playing = false;
                Ok(())
            }
            _ => Err(MusicError::InvalidState("There is no song playing!")),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            QueueState::Paused => {
                self.state = QueueState::Playing;
                self.is_playing = true;
                Ok(())
            }
            _ => Err(MusicError::InvalidState("The song is not paused!")),
        }
    }

    pub fn snapshot(&self) -> Result<Vec<Track>> {
        if self.tracks.is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        Ok(self.tracks.iter().cloned().collect())
    }

    /// Enters `Idle` with the cleanup timer armed. Only valid when empty.
    pub fn enter_idle(&mut self, timer: Deadline) {
        debug_assert!(self.tracks.is_empty(), "idle timer armed on a non-empty queue");
        self.state = QueueState::Idle;
        self.is_playing = false;
        self.playing_epoch = None;
        self.idle_timer = Some(timer);
    }

    pub fn idle_armed(&self) -> bool {
        self.idle_timer.is_some()
    }

    /// Whether an idle expiry with `ticket` should tear the queue down.
    pub fn idle_expired(&self, ticket: u64) -> bool {
        self.tracks.is_empty() && self.idle_timer.as_ref().map(|t| t.ticket) == Some(ticket)
    }

    pub fn arm_reconnect(&mut self, timer: Deadline) {
        self.reconnect_timer = Some(timer);
    }

    pub fn reconnect_armed(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    /// Cancels a pending reconnect window. Returns whether one was armed.
    pub fn recovered(&mut self) -> bool {
        self.reconnect_timer.take().is_some()
    }

    pub fn reconnect_expired(&self, ticket: u64) -> bool {
        self.reconnect_timer.as_ref().map(|t| t.ticket) == Some(ticket)
    }

    /// Marks the queue dead, cancels both timers and hands back the
    /// connection so the caller can release it.
    pub fn destroy(&mut self) -> Option<Arc<dyn VoiceConnection>> {
        self.state = QueueState::Destroyed;
        self.tracks.clear();
        self.is_playing = false;
        self.playing_epoch = None;
        self.invalidate_load();
        self.idle_timer = None;
        self.reconnect_timer = None;
        self.connection.take()
    }
}
