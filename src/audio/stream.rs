use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use songbird::input::{AudioStream, Compose, Input, LiveInput, YoutubeDl};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{mpsc, Arc};
use symphonia::core::{io::MediaSource, probe::Hint};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::error::{classify, MusicError, Result};
use crate::sources::{Track, YtDlpClient};

/// Audio ready to be handed to the playback engine.
pub struct AudioSource {
    input: Input,
    provider: &'static str,
}

impl AudioSource {
    pub fn new(input: Input, provider: &'static str) -> Self {
        Self { input, provider }
    }

    /// Name of the provider that opened this stream.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn into_input(self) -> Input {
        self.input
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self, track: &Track) -> Result<AudioSource>;
}

/// Opens audio for a track: primary provider first, the direct download
/// provider at most once if the primary fails.
pub struct Streamer {
    primary: Box<dyn StreamProvider>,
    fallback: Box<dyn StreamProvider>,
}

impl Streamer {
    pub fn new(primary: Box<dyn StreamProvider>, fallback: Box<dyn StreamProvider>) -> Self {
        Self { primary, fallback }
    }

    pub async fn open_stream(&self, track: &Track) -> Result<AudioSource> {
        let primary_error = match self.primary.open(track).await {
            Ok(source) => return Ok(source),
            Err(e) => {
                warn!(
                    "⚠️ {} could not stream '{}', trying {}: {}",
                    self.primary.name(),
                    track.title,
                    self.fallback.name(),
                    e
                );
                e
            }
        };

        match self.fallback.open(track).await {
            Ok(source) => {
                info!("✅ {} recovered '{}'", self.fallback.name(), track.title);
                Ok(source)
            }
            Err(e) => {
                error!("❌ All stream providers failed for '{}': {}", track.title, e);
                Err(MusicError::StreamUnavailable(classify(&raw_message(&primary_error))))
            }
        }
    }
}

fn raw_message(error: &MusicError) -> String {
    match error {
        MusicError::Provider { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Streams through songbird's yt-dlp input.
pub struct YtDlpStream {
    program: &'static str,
    client: reqwest::Client,
}

impl YtDlpStream {
    pub fn new(program: &'static str, client: reqwest::Client) -> Self {
        Self { program, client }
    }
}

#[async_trait]
impl StreamProvider for YtDlpStream {
    fn name(&self) -> &'static str {
        "yt-dlp stream"
    }

    async fn open(&self, track: &Track) -> Result<AudioSource> {
        let mut ytdl =
            YoutubeDl::new_ytdl_like(self.program, self.client.clone(), track.source_url.clone());

        // resolve eagerly so failures surface here, not inside the player
        let stream = ytdl
            .create_async()
            .await
            .map_err(|e| MusicError::provider("yt-dlp", e.to_string()))?;

        let input = Input::Live(LiveInput::Raw(stream), Some(Box::new(ytdl)));
        Ok(AudioSource::new(input, self.name()))
    }
}

/// Downloads the best audio-only format directly over HTTP. A background
/// task keeps up to `buffer_bytes` of the body queued ahead of the decoder.
pub struct DirectDownload {
    ytdlp: Arc<YtDlpClient>,
    client: reqwest::Client,
    buffer_bytes: usize,
}

impl DirectDownload {
    pub fn new(ytdlp: Arc<YtDlpClient>, client: reqwest::Client, buffer_bytes: usize) -> Self {
        Self {
            ytdlp,
            client,
            buffer_bytes,
        }
    }
}

#[async_trait]
impl StreamProvider for DirectDownload {
    fn name(&self) -> &'static str {
        "direct download"
    }

    async fn open(&self, track: &Track) -> Result<AudioSource> {
        let audio_url = self.ytdlp.audio_url(&track.source_url).await?;

        let response = self
            .client
            .get(&audio_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MusicError::provider("direct download", e.to_string()))?;

        let mut hint = Hint::new();
        if let Some(mime) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            hint.mime_type(mime);
        }
        let byte_len = response.content_length();
        debug!(
            "⬇️ Direct download for '{}' ({} bytes, read-ahead {} KiB)",
            track.title,
            byte_len.map_or("unknown".to_string(), |len| len.to_string()),
            self.buffer_bytes / 1024
        );

        let stream = AudioStream {
            input: Box::new(ReadAhead::spawn(ResponseBody(response), self.buffer_bytes, byte_len))
                as Box<dyn MediaSource>,
            hint: Some(hint),
        };
        Ok(AudioSource::new(Input::Live(LiveInput::Raw(stream), None), self.name()))
    }
}

/// Async producer of body chunks for [`ReadAhead`]. `None` ends the body.
#[async_trait]
trait ChunkSource: Send + 'static {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

struct ResponseBody(reqwest::Response);

#[async_trait]
impl ChunkSource for ResponseBody {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.0.chunk().await.map_err(io::Error::other)
    }
}

type Buffered = io::Result<(Bytes, OwnedSemaphorePermit)>;

/// Blocking reader fed by a task that downloads ahead of the decoder.
///
/// Every queued chunk holds permits from a byte budget, released once the
/// decoder has consumed it, so at most `budget` bytes sit in memory.
/// Dropping the reader stops the feeder.
struct ReadAhead {
    chunks: Mutex<mpsc::Receiver<Buffered>>,
    current: Option<(Bytes, OwnedSemaphorePermit)>,
    byte_len: Option<u64>,
    _feeder: DropGuard,
}

impl ReadAhead {
    fn spawn(source: impl ChunkSource, budget: usize, byte_len: Option<u64>) -> Self {
        let max_permits = budget.clamp(1, Semaphore::MAX_PERMITS).min(u32::MAX as usize);
        let permits = Arc::new(Semaphore::new(max_permits));
        let (tx, rx) = mpsc::channel();
        let cancel = CancellationToken::new();

        tokio::spawn(feed(source, permits, max_permits as u32, tx, cancel.clone()));

        Self {
            chunks: Mutex::new(rx),
            current: None,
            byte_len,
            _feeder: cancel.drop_guard(),
        }
    }
}

async fn feed(
    mut source: impl ChunkSource,
    permits: Arc<Semaphore>,
    max_permits: u32,
    tx: mpsc::Sender<Buffered>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = source.next_chunk() => next,
        };

        let chunk = match next {
            Ok(Some(chunk)) if chunk.is_empty() => continue,
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                debug!("⬇️ Direct download finished");
                return;
            }
            Err(e) => {
                warn!("⚠️ Direct download interrupted: {}", e);
                let _ = tx.send(Err(e));
                return;
            }
        };

        let wanted = u32::try_from(chunk.len()).unwrap_or(u32::MAX).min(max_permits);
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = permits.clone().acquire_many_owned(wanted) => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        if tx.send(Ok((chunk, permit))).is_err() {
            return;
        }
    }
}

impl Read for ReadAhead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some((chunk, _)) = &mut self.current {
                if !chunk.is_empty() {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk.split_to(n));
                    return Ok(n);
                }
            }
            // releases the consumed chunk's share of the budget
            self.current = None;

            match self.chunks.get_mut().recv() {
                Ok(Ok(next)) => self.current = Some(next),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(0),
            }
        }
    }
}

impl Seek for ReadAhead {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "direct downloads are not seekable",
        ))
    }
}

impl MediaSource for ReadAhead {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::silent_source;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn track() -> Track {
        Track::new("lofi beats", "https://www.youtube.com/watch?v=jfKfPfyJRdk")
    }

    fn provider(name: &'static str) -> MockStreamProvider {
        let mut provider = MockStreamProvider::new();
        provider.expect_name().return_const(name);
        provider
    }

    #[tokio::test]
    async fn test_primary_success_never_touches_fallback() {
        let mut primary = provider("primary");
        primary
            .expect_open()
            .times(1)
            .returning(|_| Ok(silent_source("primary")));
        let mut fallback = provider("fallback");
        fallback.expect_open().never();

        let streamer = Streamer::new(Box::new(primary), Box::new(fallback));
        let source = streamer.open_stream(&track()).await.expect("stream");
        assert_eq!(source.provider(), "primary");
    }

    #[tokio::test]
    async fn test_fallback_runs_exactly_once() {
        let mut primary = provider("primary");
        primary
            .expect_open()
            .times(1)
            .returning(|_| Err(MusicError::provider("yt-dlp", "Sign in to confirm")));
        let mut fallback = provider("fallback");
        fallback
            .expect_open()
            .times(1)
            .returning(|_| Ok(silent_source("fallback")));

        let streamer = Streamer::new(Box::new(primary), Box::new(fallback));
        let source = streamer.open_stream(&track()).await.expect("stream");
        assert_eq!(source.provider(), "fallback");
    }

    #[tokio::test]
    async fn test_both_failing_classifies_primary_error() {
        let mut primary = provider("primary");
        primary
            .expect_open()
            .times(1)
            .returning(|_| Err(MusicError::provider("yt-dlp", "This video is PRIVATE_VIDEO")));
        let mut fallback = provider("fallback");
        fallback
            .expect_open()
            .times(1)
            .returning(|_| Err(MusicError::provider("direct download", "socket closed")));

        let streamer = Streamer::new(Box::new(primary), Box::new(fallback));
        let err = streamer.open_stream(&track()).await.unwrap_err();
        assert_eq!(
            err,
            MusicError::StreamUnavailable("This video is private and cannot be played.".to_string())
        );
    }

    #[tokio::test]
    async fn test_unclassified_failure_keeps_message() {
        let mut primary = provider("primary");
        primary
            .expect_open()
            .returning(|_| Err(MusicError::provider("yt-dlp", "boom")));
        let mut fallback = provider("fallback");
        fallback
            .expect_open()
            .returning(|_| Err(MusicError::provider("direct download", "bang")));

        let streamer = Streamer::new(Box::new(primary), Box::new(fallback));
        let err = streamer.open_stream(&track()).await.unwrap_err();
        assert_eq!(err.to_string(), "An error occurred: boom");
    }

    struct Scripted {
        chunks: VecDeque<io::Result<Bytes>>,
        pulled: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(chunks: Vec<io::Result<Bytes>>) -> Self {
            Self {
                chunks: chunks.into(),
                pulled: Arc::default(),
                dropped: Arc::default(),
            }
        }
    }

    impl Drop for Scripted {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ChunkSource for Scripted {
        async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
            self.pulled.fetch_add(1, Ordering::SeqCst);
            self.chunks.pop_front().transpose()
        }
    }

    async fn let_feeder_run() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn read_all(mut reader: ReadAhead) -> (Vec<u8>, Option<String>) {
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).err().map(|e| e.to_string());
        (out, err)
    }

    #[tokio::test]
    async fn test_read_ahead_delivers_body_in_order() {
        let source = Scripted::new(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"world")),
        ]);
        let reader = ReadAhead::spawn(source, 1024, Some(11));
        assert_eq!(reader.byte_len(), Some(11));
        assert!(!reader.is_seekable());

        let (body, err) = tokio::task::spawn_blocking(move || read_all(reader)).await.unwrap();
        assert_eq!(body, b"hello world");
        assert_eq!(err, None);
    }

    #[tokio::test]
    async fn test_read_ahead_prefetches_up_to_budget() {
        let source = Scripted::new((0..4).map(|_| Ok(Bytes::from_static(b"abcd"))).collect());
        let pulled = source.pulled.clone();
        let reader = ReadAhead::spawn(source, 8, None);

        // two chunks fit the budget; the third waits for the decoder
        let_feeder_run().await;
        assert_eq!(pulled.load(Ordering::SeqCst), 3);

        let (body, _) = tokio::task::spawn_blocking(move || read_all(reader)).await.unwrap();
        assert_eq!(body.len(), 16);
    }

    #[tokio::test]
    async fn test_read_ahead_surfaces_upstream_error() {
        let source = Scripted::new(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::other("connection reset")),
        ]);
        let reader = ReadAhead::spawn(source, 1024, None);

        let (body, err) = tokio::task::spawn_blocking(move || read_all(reader)).await.unwrap();
        assert_eq!(body, b"abc");
        assert!(err.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_dropping_reader_stops_feeder() {
        let source = Scripted::new((0..4).map(|_| Ok(Bytes::from_static(b"abcd"))).collect());
        let dropped = source.dropped.clone();
        let reader = ReadAhead::spawn(source, 4, None);
        let_feeder_run().await;
        assert!(!dropped.load(Ordering::SeqCst), "feeder is waiting on the budget");

        drop(reader);
        let_feeder_run().await;
        assert!(dropped.load(Ordering::SeqCst));
    }
}
