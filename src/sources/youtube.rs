use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{MetadataProvider, SearchProvider, Track};
use crate::error::{MusicError, Result};

const PROVIDER: &str = "yt-dlp";

/// Client around the yt-dlp binary.
pub struct YtDlpClient {
    binary: String,
    // yt-dlp gets rate limited quickly under concurrent use
    rate_limiter: Semaphore,
}

/// Subset of `yt-dlp --dump-json` output.
#[derive(Debug, Deserialize)]
pub(crate) struct YtDlpInfo {
    pub id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    pub webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnail {
    pub url: String,
}

impl YtDlpInfo {
    fn into_track(self) -> Track {
        let url = self
            .webpage_url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id));
        let thumbnail = self
            .thumbnails
            .into_iter()
            .next()
            .map(|t| t.url)
            .or(self.thumbnail);

        Track::new(self.title, url)
            .with_thumbnail(thumbnail)
            .with_duration(self.duration.and_then(|secs| Duration::try_from_secs_f64(secs).ok()))
    }
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Runs yt-dlp and returns stdout, turning non-zero exits into provider errors.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::provider(PROVIDER, e.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| MusicError::provider(PROVIDER, format!("failed to run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::provider(PROVIDER, stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// URL of the best audio-only format for a video.
    pub async fn audio_url(&self, url: &str) -> Result<String> {
        debug!("🎵 Looking up best audio format for: {}", url);

        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio[acodec!=none]/bestaudio/best",
                "--get-url",
                "--no-warnings",
                url,
            ])
            .await?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| MusicError::provider(PROVIDER, "yt-dlp returned no stream url"))
    }

    /// Checks that the binary runs at all.
    pub async fn version(&self) -> Result<String> {
        let stdout = self.run(&["--version"]).await?;
        Ok(stdout.trim().to_string())
    }
}

pub(crate) fn parse_tracks(stdout: &str) -> Vec<Track> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .map(YtDlpInfo::into_track)
        .collect()
}

#[async_trait]
impl MetadataProvider for YtDlpClient {
    async fn fetch(&self, url: &str) -> Result<Track> {
        debug!("📊 Fetching info for: {}", url);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        parse_tracks(&stdout)
            .into_iter()
            .next()
            .ok_or_else(|| MusicError::provider(PROVIDER, "could not parse yt-dlp output"))
    }
}

#[async_trait]
impl SearchProvider for YtDlpClient {
    fn name(&self) -> &'static str {
        "yt-dlp search"
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        info!("🔍 Searching YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_tracks(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_info() {
        let line = r#"{"id":"jfKfPfyJRdk","title":"lofi hip hop radio","duration":212.7,"thumbnail":"https://i.ytimg.com/vi/jfKfPfyJRdk/maxresdefault.jpg","thumbnails":[{"url":"https://i.ytimg.com/vi/jfKfPfyJRdk/default.jpg"}],"webpage_url":"https://www.youtube.com/watch?v=jfKfPfyJRdk","extra":1}"#;

        let tracks = parse_tracks(line);
        assert_eq!(
            tracks,
            vec![Track {
                title: "lofi hip hop radio".to_string(),
                source_url: "https://www.youtube.com/watch?v=jfKfPfyJRdk".to_string(),
                thumbnail_url: Some("https://i.ytimg.com/vi/jfKfPfyJRdk/default.jpg".to_string()),
                duration_seconds: Some(212),
            }]
        );
    }

    #[test]
    fn test_parse_minimal_info() {
        let output = "WARNING: something\n{\"id\":\"abcdefghijk\",\"title\":\"live\"}\n";

        let tracks = parse_tracks(output);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].source_url, "https://www.youtube.com/watch?v=abcdefghijk");
        assert_eq!(tracks[0].thumbnail_url, None);
        assert_eq!(tracks[0].duration_seconds, None);
    }

    #[test]
    fn test_out_of_range_duration_is_dropped() {
        let output = concat!(
            "{\"id\":\"abcdefghijk\",\"title\":\"forever\",\"duration\":1e300}\n",
            "{\"id\":\"bcdefghijkl\",\"title\":\"backwards\",\"duration\":-5.0}\n",
        );

        let tracks = parse_tracks(output);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].duration_seconds, None);
        assert_eq!(tracks[1].duration_seconds, None);
    }
}
