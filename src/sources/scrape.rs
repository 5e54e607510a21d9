use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, warn};

use super::{search_link, MetadataProvider, SearchProvider, Track};
use crate::error::{MusicError, Result};

const PROVIDER: &str = "youtube search page";

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/watch\?v=([a-zA-Z0-9_-]{11})").expect("video id pattern"));

/// Fallback search that scrapes the YouTube results page.
///
/// Only the first video id is used. Metadata for it is fetched best-effort;
/// when that fails the query itself becomes the title.
pub struct ScrapeSearchClient {
    client: reqwest::Client,
    metadata: Arc<dyn MetadataProvider>,
}

impl ScrapeSearchClient {
    pub fn new(timeout: Duration, metadata: Arc<dyn MetadataProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| MusicError::provider(PROVIDER, e.to_string()))?;

        Ok(Self { client, metadata })
    }

    async fn fetch_results_page(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(search_link(query))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MusicError::provider(PROVIDER, e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| MusicError::provider(PROVIDER, e.to_string()))
    }
}

/// First video id found in a results page.
pub(crate) fn first_video_id(html: &str) -> Option<&str> {
    VIDEO_ID
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[async_trait]
impl SearchProvider for ScrapeSearchClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        info!("🌐 Scraping YouTube results for: {}", query);

        let html = self.fetch_results_page(query).await?;
        Ok(self.tracks_from_page(query, &html).await)
    }
}

impl ScrapeSearchClient {
    /// Turns a results page into at most one track.
    async fn tracks_from_page(&self, query: &str, html: &str) -> Vec<Track> {
        let Some(video_id) = first_video_id(html) else {
            return Vec::new();
        };

        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let track = match self.metadata.fetch(&url).await {
            Ok(track) => track,
            Err(e) => {
                warn!("⚠️ No metadata for {}, using the query as title: {}", url, e);
                Track::new(query, url)
            }
        };

        vec![track]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockMetadataProvider;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<a href="/watch?v=jfKfPfyJRdk">lofi hip hop radio</a>"#;

    fn client(metadata: MockMetadataProvider) -> ScrapeSearchClient {
        ScrapeSearchClient::new(Duration::from_secs(1), Arc::new(metadata)).unwrap()
    }

    #[tokio::test]
    async fn test_page_result_uses_fetched_metadata() {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_fetch()
            .withf(|url| url.ends_with("watch?v=jfKfPfyJRdk"))
            .times(1)
            .returning(|_| {
                Ok(Track::new(
                    "lofi hip hop radio",
                    "https://www.youtube.com/watch?v=jfKfPfyJRdk",
                ))
            });

        let tracks = client(metadata).tracks_from_page("lofi", PAGE).await;
        assert_eq!(
            tracks,
            vec![Track::new(
                "lofi hip hop radio",
                "https://www.youtube.com/watch?v=jfKfPfyJRdk"
            )]
        );
    }

    #[tokio::test]
    async fn test_failed_metadata_falls_back_to_query_title() {
        let mut metadata = MockMetadataProvider::new();
        metadata
            .expect_fetch()
            .times(1)
            .returning(|_| Err(MusicError::provider("yt-dlp", "Sign in to confirm your age")));

        let tracks = client(metadata).tracks_from_page("lofi beats", PAGE).await;
        assert_eq!(
            tracks,
            vec![Track::new("lofi beats", "https://www.youtube.com/watch?v=jfKfPfyJRdk")]
        );
    }

    #[tokio::test]
    async fn test_page_without_video_yields_nothing() {
        let mut metadata = MockMetadataProvider::new();
        metadata.expect_fetch().never();

        let tracks = client(metadata)
            .tracks_from_page("lofi", "<html>No results found</html>")
            .await;
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_first_video_id() {
        let html = r#"<a href="/watch?v=jfKfPfyJRdk&pp=x">one</a><a href="/watch?v=5qap5aO4i9A">two</a>"#;
        assert_eq!(first_video_id(html), Some("jfKfPfyJRdk"));
    }

    #[test]
    fn test_first_video_id_requires_eleven_chars() {
        assert_eq!(first_video_id(r#"href="/watch?v=short""#), None);
        assert_eq!(first_video_id("<html>no results</html>"), None);
    }
}
