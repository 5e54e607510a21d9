use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::{Deadline, GuildQueue, QueueState};
use super::stream::Streamer;
use super::transport::{EventSink, GuildEvent, Notice, Notifier, QueueEvent, VoiceTransport};
use crate::error::{classify, MusicError, Result};
use crate::sources::Track;

type SharedQueue = Arc<Mutex<GuildQueue>>;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// 0-10, applied to every new queue
    pub default_volume: u8,
    pub idle_timeout: Duration,
    pub reconnect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 5,
            idle_timeout: Duration::from_secs(5 * 60),
            reconnect_timeout: Duration::from_secs(5),
        }
    }
}

/// Where a new queue plays and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTarget {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new queue was created and joined the voice channel
    Created,
    /// Appended to an existing queue at this 1-based position
    Queued { position: usize },
}

/// Read-only view of a guild's queue.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub state: QueueState,
    pub len: usize,
    pub is_playing: bool,
    pub idle_armed: bool,
}

/// Owns every guild's queue and drives them from commands and engine events.
pub struct SessionManager {
    queues: DashMap<GuildId, SharedQueue>,
    transport: Arc<dyn VoiceTransport>,
    streamer: Arc<Streamer>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
    events: mpsc::UnboundedSender<GuildEvent>,
    next_session: AtomicU64,
    next_ticket: AtomicU64,
}

impl SessionManager {
    /// Creates the manager together with the receiving end of its event
    /// channel, which must be handed to [`SessionManager::run`].
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        streamer: Arc<Streamer>,
        notifier: Arc<dyn Notifier>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<GuildEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            queues: DashMap::new(),
            transport,
            streamer,
            notifier,
            settings,
            events,
            next_session: AtomicU64::new(1),
            next_ticket: AtomicU64::new(1),
        };
        (manager, rx)
    }

    /// Event loop. Handles one event at a time so per-guild ordering holds.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<GuildEvent>) {
        info!("🎛️ Session event loop started");
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
        info!("🎛️ Session event loop stopped");
    }

    fn queue(&self, guild_id: GuildId) -> Option<SharedQueue> {
        self.queues.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn active_guilds(&self) -> usize {
        self.queues.len()
    }

    #[cfg(test)]
    pub async fn status(&self, guild_id: GuildId) -> Option<QueueStatus> {
        let queue = self.queue(guild_id)?;
        let q = queue.lock().await;
        if q.is_destroyed() {
            return None;
        }
        Some(QueueStatus {
            state: q.state(),
            len: q.len(),
            is_playing: q.is_playing(),
            idle_armed: q.idle_armed(),
        })
    }

    /// Appends `track`, creating and connecting the guild's queue first if
    /// there is none.
    pub async fn enqueue(self: &Arc<Self>, target: QueueTarget, track: Track) -> Result<EnqueueOutcome> {
        let guild_id = target.guild_id;

        loop {
            let (queue, mut q, created) = self.get_or_create(&target).await?;
            if q.is_destroyed() {
                // lost a race with a teardown; the map entry is already gone
                continue;
            }

            if !created {
                let restart = q.state() == QueueState::Idle;
                let position = q.push(track);
                if restart {
                    info!("▶️ Queue for guild {} was idle, starting playback", guild_id);
                    self.start_head(guild_id, &queue, &mut q);
                }
                return Ok(EnqueueOutcome::Queued { position });
            }

            q.push(track);
            let session = q.session();
            drop(q);
            return self.connect(target, session, queue).await;
        }
    }

    async fn get_or_create(
        &self,
        target: &QueueTarget,
    ) -> Result<(SharedQueue, OwnedMutexGuard<GuildQueue>, bool)> {
        let existing = match self.queues.entry(target.guild_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let session = self.next_session.fetch_add(1, Ordering::Relaxed);
                let queue = Arc::new(Mutex::new(GuildQueue::new(
                    target.guild_id,
                    session,
                    target.voice_channel,
                    target.text_channel,
                    self.settings.default_volume,
                )));
                // locked before it becomes visible so the creator always joins first
                let guard = queue
                    .clone()
                    .try_lock_owned()
                    .map_err(|_| MusicError::InvalidState("The queue is busy, please try again."))?;
                entry.insert(queue.clone());
                debug!("🆕 Created queue for guild {} (session {})", target.guild_id, session);
                return Ok((queue, guard, true));
            }
        };

        let guard = existing.clone().lock_owned().await;
        Ok((existing, guard, false))
    }

    /// Joins the voice channel for a freshly created queue and starts
    /// playback of its head once the connection is up.
    async fn connect(
        self: &Arc<Self>,
        target: QueueTarget,
        session: u64,
        queue: SharedQueue,
    ) -> Result<EnqueueOutcome> {
        let guild_id = target.guild_id;
        let sink = EventSink::new(guild_id, session, self.events.clone());

        info!("🔊 Joining voice channel {} in guild {}", target.voice_channel, guild_id);
        let joined = self.transport.join(guild_id, target.voice_channel, sink).await;

        let mut q = queue.clone().lock_owned().await;
        match joined {
            Ok(connection) if q.is_destroyed() => {
                info!("⏹️ Queue for guild {} stopped while connecting", guild_id);
                drop(q);
                connection.leave().await;
                Ok(EnqueueOutcome::Created)
            }
            Ok(connection) => {
                q.attach(connection);
                self.start_head(guild_id, &queue, &mut q);
                Ok(EnqueueOutcome::Created)
            }
            Err(e) => {
                error!("❌ Could not join voice in guild {}: {}", guild_id, e);
                q.destroy();
                drop(q);
                self.queues.remove_if(&guild_id, |_, v| Arc::ptr_eq(v, &queue));
                Err(e)
            }
        }
    }

    /// Claims the head track and spawns its playback, or goes idle when the
    /// queue is empty. Must be called with the guild lock held.
    fn start_head(self: &Arc<Self>, guild_id: GuildId, queue: &SharedQueue, q: &mut GuildQueue) {
        match q.claim_start() {
            Some((track, epoch)) => {
                let this = Arc::clone(self);
                let queue = Arc::clone(queue);
                tokio::spawn(async move { this.begin_playback(guild_id, queue, track, epoch).await });
            }
            None => self.go_idle(guild_id, q),
        }
    }

    /// Opens and plays a claimed head track. Heads whose stream cannot be
    /// opened are reported and dropped until one plays or the queue drains.
    async fn begin_playback(&self, guild_id: GuildId, queue: SharedQueue, mut track: Track, mut epoch: u64) {
        loop {
            debug!("⏳ Opening stream for '{}' (guild {}, epoch {})", track.title, guild_id, epoch);
            let opened = self.streamer.open_stream(&track).await;

            let mut q = queue.lock().await;
            if !q.is_current_load(epoch) {
                debug!("🗑️ Discarding stale stream for '{}' in guild {}", track.title, guild_id);
                return;
            }
            let text_channel = q.text_channel();

            let failure = match opened {
                Ok(source) => match q.connection() {
                    Some(connection) => {
                        match connection.play(source, q.volume_scale(), epoch).await {
                            Ok(()) => {
                                q.mark_playing(epoch);
                                let voice_channel = q.voice_channel();
                                drop(q);
                                info!(
                                    "🎵 Now playing in guild {} (channel {}): {}",
                                    guild_id, voice_channel, track.title
                                );
                                self.notifier
                                    .notify(text_channel, Notice::NowPlaying(track))
                                    .await;
                                return;
                            }
                            Err(e) => e,
                        }
                    }
                    None => MusicError::ConnectionLost("no voice connection".to_string()),
                },
                Err(e) => e,
            };

            warn!("⚠️ Skipping '{}' in guild {}: {}", track.title, guild_id, failure);
            q.drop_head();
            let next = q.claim_start();
            if next.is_none() {
                self.go_idle(guild_id, &mut q);
            }
            drop(q);
            self.notifier
                .notify(
                    text_channel,
                    Notice::PlaybackFailed {
                        title: track.title,
                        reason: failure.user_message(),
                    },
                )
                .await;

            match next {
                Some((next_track, next_epoch)) => {
                    track = next_track;
                    epoch = next_epoch;
                }
                None => return,
            }
        }
    }

    fn go_idle(&self, guild_id: GuildId, q: &mut GuildQueue) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let timer = self.schedule(
            guild_id,
            q.session(),
            self.settings.idle_timeout,
            ticket,
            QueueEvent::IdleExpired { ticket },
        );
        q.enter_idle(timer);
        info!(
            "💤 Queue for guild {} is empty, leaving in {:?} unless something is queued",
            guild_id, self.settings.idle_timeout
        );
    }

    /// Spawns a one-shot timer that emits `event` after `after` unless the
    /// returned deadline is dropped first.
    fn schedule(
        &self,
        guild_id: GuildId,
        session: u64,
        after: Duration,
        ticket: u64,
        event: QueueEvent,
    ) -> Deadline {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let sink = EventSink::new(guild_id, session, self.events.clone());

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(after) => sink.emit(event),
            }
        });

        Deadline::new(ticket, token.drop_guard())
    }

    /// Skips the head track. The engine's end event advances the queue.
    pub async fn skip(self: &Arc<Self>, guild_id: GuildId) -> Result<()> {
        let queue = self.queue(guild_id).ok_or(MusicError::EmptyQueue)?;
        let mut q = queue.clone().lock_owned().await;
        if q.is_destroyed() || q.is_empty() {
            return Err(MusicError::EmptyQueue);
        }

        match q.state() {
            QueueState::Playing | QueueState::Paused => {
                if let Some(connection) = q.connection() {
                    connection.stop().await;
                }
            }
            QueueState::Starting => {
                q.drop_head();
                self.start_head(guild_id, &queue, &mut q);
            }
            QueueState::Connecting => {
                q.drop_head();
            }
            QueueState::Idle | QueueState::Destroyed => return Err(MusicError::EmptyQueue),
        }

        info!("⏭️ Skipped in guild {}", guild_id);
        Ok(())
    }

    /// Clears the queue, stops playback and leaves the voice channel.
    pub async fn stop(&self, guild_id: GuildId) -> Result<()> {
        let queue = self.queue(guild_id).ok_or(MusicError::EmptyQueue)?;
        let mut q = queue.lock().await;
        if q.is_destroyed() {
            return Err(MusicError::EmptyQueue);
        }

        self.teardown(guild_id, &queue, &mut q).await;
        info!("⏹️ Stopped playback in guild {}", guild_id);
        Ok(())
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<()> {
        let queue = self
            .queue(guild_id)
            .ok_or(MusicError::InvalidState("There is no song playing!"))?;
        let mut q = queue.lock().await;
        q.pause()?;
        if let Some(connection) = q.connection() {
            connection.pause().await;
        }
        info!("⏸️ Paused in guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<()> {
        let queue = self
            .queue(guild_id)
            .ok_or(MusicError::InvalidState("The song is not paused!"))?;
        let mut q = queue.lock().await;
        q.resume()?;
        if let Some(connection) = q.connection() {
            connection.unpause().await;
        }
        info!("▶️ Resumed in guild {}", guild_id);
        Ok(())
    }

    /// Snapshot of the pending tracks, head first.
    pub async fn peek(&self, guild_id: GuildId) -> Result<Vec<Track>> {
        let queue = self.queue(guild_id).ok_or(MusicError::EmptyQueue)?;
        let q = queue.lock().await;
        q.snapshot()
    }

    /// Reports that the gateway saw the bot leave voice in `guild_id`.
    pub async fn notify_disconnect(&self, guild_id: GuildId) {
        let Some(queue) = self.queue(guild_id) else {
            return;
        };
        let session = queue.lock().await.session();
        EventSink::new(guild_id, session, self.events.clone()).emit(QueueEvent::Disconnected);
    }

    async fn teardown(&self, guild_id: GuildId, queue: &SharedQueue, q: &mut GuildQueue) {
        let connection = q.destroy();
        self.queues.remove_if(&guild_id, |_, v| Arc::ptr_eq(v, queue));
        if let Some(connection) = connection {
            connection.leave().await;
        }
        debug!("🧹 Queue for guild {} destroyed", guild_id);
    }

    pub(crate) async fn handle_event(self: &Arc<Self>, event: GuildEvent) {
        let GuildEvent {
            guild_id,
            session,
            event,
        } = event;

        let Some(queue) = self.queue(guild_id) else {
            debug!("Dropping {:?} for guild {} without a queue", event, guild_id);
            return;
        };
        let mut q = queue.clone().lock_owned().await;
        if q.session() != session || q.is_destroyed() {
            debug!("Dropping {:?} from old session {} in guild {}", event, session, guild_id);
            return;
        }

        match event {
            QueueEvent::Ready => {
                if q.recovered() {
                    info!("🔌 Voice connection recovered in guild {}", guild_id);
                }
            }
            QueueEvent::Disconnected => {
                if q.reconnect_armed() {
                    return;
                }
                warn!(
                    "🔌 Voice connection lost in guild {}, waiting {:?} for recovery",
                    guild_id, self.settings.reconnect_timeout
                );
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                let timer = self.schedule(
                    guild_id,
                    session,
                    self.settings.reconnect_timeout,
                    ticket,
                    QueueEvent::ReconnectExpired { ticket },
                );
                q.arm_reconnect(timer);
            }
            QueueEvent::TrackEnded { epoch } => {
                if q.finish_current(epoch) {
                    debug!("🏁 Track finished in guild {}", guild_id);
                    self.advance(guild_id, &queue, &mut q);
                }
            }
            QueueEvent::TrackErrored { epoch, message } => {
                let title = q.head().map(|t| t.title.clone()).unwrap_or_default();
                if !q.finish_current(epoch) {
                    return;
                }
                error!("❌ Player error in guild {}: {}", guild_id, message);
                let text_channel = q.text_channel();
                self.advance(guild_id, &queue, &mut q);
                drop(q);
                self.notifier
                    .notify(
                        text_channel,
                        Notice::PlaybackFailed {
                            title,
                            reason: classify(&message),
                        },
                    )
                    .await;
            }
            QueueEvent::IdleExpired { ticket } => {
                if q.idle_expired(ticket) {
                    info!("💤 Idle timeout reached in guild {}, leaving", guild_id);
                    self.teardown(guild_id, &queue, &mut q).await;
                }
            }
            QueueEvent::ReconnectExpired { ticket } => {
                if q.reconnect_expired(ticket) {
                    let text_channel = q.text_channel();
                    error!("❌ Voice connection in guild {} did not recover", guild_id);
                    self.teardown(guild_id, &queue, &mut q).await;
                    drop(q);
                    self.notifier.notify(text_channel, Notice::ConnectionLost).await;
                }
            }
        }
    }

    /// Starts the next head, or goes idle when nothing is left.
    fn advance(self: &Arc<Self>, guild_id: GuildId, queue: &SharedQueue, q: &mut GuildQueue) {
        self.start_head(guild_id, queue, q);
    }
}
