pub mod scrape;
pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{MusicError, Result};

pub use scrape::ScrapeSearchClient;
pub use youtube::YtDlpClient;

static DIRECT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/.+$")
        .expect("direct link pattern")
});

/// Immutable descriptor of a playable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub source_url: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<u64>,
}

impl Track {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            thumbnail_url: None,
            duration_seconds: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail_url = thumbnail;
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration_seconds = duration.map(|d| d.as_secs());
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.map(Duration::from_secs)
    }
}

/// Fetches metadata for a single video link.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Track>;
}

/// One link of the search fallback chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<Track>>;
}

/// Checks whether the input is a video link rather than free text.
pub fn is_direct_link(input: &str) -> bool {
    DIRECT_LINK.is_match(input)
}

/// Link users can follow when nothing was found.
pub fn search_link(query: &str) -> String {
    format!(
        "https://www.youtube.com/results?search_query={}",
        urlencoding::encode(query)
    )
}

/// Turns user input into a [`Track`].
///
/// Direct links go straight to the metadata provider. Free text walks the
/// search providers in order and stops at the first one with a result.
pub struct Resolver {
    direct: Arc<dyn MetadataProvider>,
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl Resolver {
    pub fn new(direct: Arc<dyn MetadataProvider>, providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self { direct, providers }
    }

    pub async fn resolve(&self, input: &str) -> Result<Track> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MusicError::InvalidInput);
        }

        if is_direct_link(input) {
            debug!("🔗 Direct link, fetching metadata: {}", input);
            return self.direct.fetch(input).await.map_err(|e| {
                warn!("❌ Metadata lookup failed for {}: {}", input, e);
                MusicError::NotFound(input.to_string())
            });
        }

        for provider in &self.providers {
            match provider.search(input).await {
                Ok(mut tracks) if !tracks.is_empty() => {
                    let track = tracks.swap_remove(0);
                    info!("✅ {} resolved '{}' to {}", provider.name(), input, track.title);
                    return Ok(track);
                }
                Ok(_) => debug!("{} returned no results for '{}'", provider.name(), input),
                Err(e) => warn!("⚠️ {} failed for '{}': {}", provider.name(), input, e),
            }
        }

        Err(MusicError::NotFound(input.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lofi() -> Track {
        Track::new("lofi beats", "https://www.youtube.com/watch?v=jfKfPfyJRdk")
    }

    fn failing_search(name: &'static str) -> MockSearchProvider {
        let mut provider = MockSearchProvider::new();
        provider.expect_name().return_const(name);
        provider
            .expect_search()
            .times(1)
            .returning(|_| Err(MusicError::provider("yt-dlp", "status code: 429")));
        provider
    }

    #[test]
    fn test_direct_link_detection() {
        assert!(is_direct_link("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_direct_link("youtu.be/dQw4w9WgXcQ"));
        assert!(is_direct_link("https://music.youtube.com/watch?v=test"));
        assert!(!is_direct_link("https://example.com/video"));
        assert!(!is_direct_link("lofi beats"));
        assert!(!is_direct_link("https://www.youtube.com/"));
    }

    #[test]
    fn test_search_link_encodes_query() {
        assert_eq!(
            search_link("lofi beats & chill"),
            "https://www.youtube.com/results?search_query=lofi%20beats%20%26%20chill"
        );
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let resolver = Resolver::new(Arc::new(MockMetadataProvider::new()), Vec::new());
        assert_eq!(resolver.resolve("   ").await, Err(MusicError::InvalidInput));
    }

    #[tokio::test]
    async fn test_direct_link_skips_search_chain() {
        let mut direct = MockMetadataProvider::new();
        direct
            .expect_fetch()
            .withf(|url| url == "https://youtu.be/jfKfPfyJRdk")
            .times(1)
            .returning(|_| Ok(lofi()));

        // no expectations: any call would panic
        let search = MockSearchProvider::new();

        let resolver = Resolver::new(Arc::new(direct), vec![Arc::new(search)]);
        let track = resolver.resolve(" https://youtu.be/jfKfPfyJRdk ").await;
        assert_eq!(track, Ok(lofi()));
    }

    #[tokio::test]
    async fn test_direct_link_failure_is_not_found() {
        let mut direct = MockMetadataProvider::new();
        direct
            .expect_fetch()
            .returning(|_| Err(MusicError::provider("yt-dlp", "Private video")));

        let resolver = Resolver::new(Arc::new(direct), Vec::new());
        let result = resolver.resolve("https://youtu.be/jfKfPfyJRdk").await;
        assert_eq!(
            result,
            Err(MusicError::NotFound("https://youtu.be/jfKfPfyJRdk".to_string()))
        );
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_result() {
        let mut primary = MockSearchProvider::new();
        primary.expect_name().return_const("yt-dlp search");
        primary
            .expect_search()
            .times(1)
            .returning(|_| Ok(vec![lofi()]));

        let scrape = MockSearchProvider::new();

        let resolver = Resolver::new(
            Arc::new(MockMetadataProvider::new()),
            vec![Arc::new(primary), Arc::new(scrape)],
        );
        assert_eq!(resolver.resolve("lofi beats").await, Ok(lofi()));
    }

    #[tokio::test]
    async fn test_chain_falls_through_errors_and_empty_results() {
        let mut empty = MockSearchProvider::new();
        empty.expect_name().return_const("empty");
        empty.expect_search().times(1).returning(|_| Ok(Vec::new()));

        let mut scrape = MockSearchProvider::new();
        scrape.expect_name().return_const("scrape");
        scrape
            .expect_search()
            .withf(|query| query == "lofi beats")
            .times(1)
            .returning(|_| Ok(vec![lofi()]));

        let resolver = Resolver::new(
            Arc::new(MockMetadataProvider::new()),
            vec![
                Arc::new(failing_search("yt-dlp search")),
                Arc::new(empty),
                Arc::new(scrape),
            ],
        );
        assert_eq!(resolver.resolve("lofi beats").await, Ok(lofi()));
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_not_found() {
        let resolver = Resolver::new(
            Arc::new(MockMetadataProvider::new()),
            vec![Arc::new(failing_search("a")), Arc::new(failing_search("b"))],
        );
        assert_eq!(
            resolver.resolve("nothing here").await,
            Err(MusicError::NotFound("nothing here".to_string()))
        );
    }

    #[test]
    fn test_track_duration_truncates_to_seconds() {
        let track = lofi().with_duration(Some(Duration::from_secs_f64(212.9)));
        assert_eq!(track.duration_seconds, Some(212));
        assert_eq!(track.duration(), Some(Duration::from_secs(212)));
    }
}
