use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::{sync::Arc, sync::LazyLock, time::Duration};
use tracing::{info, warn};

use super::{Resolver, TrackSource, YouTubeResolver};
use crate::error::{PlaybackError, PlaybackResult};

const RESULTS_URL: &str = "https://www.youtube.com/results";

static WATCH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/watch\?v=([a-zA-Z0-9_-]{11})").expect("valid watch regex"));

/// Free-text search against YouTube's results page. Matches anything, so it
/// must be registered last.
pub struct YouTubeSearchResolver {
    client: reqwest::Client,
    direct: Arc<YouTubeResolver>,
}

impl YouTubeSearchResolver {
    pub fn new(direct: Arc<YouTubeResolver>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self { client, direct })
    }

    /// First video id linked from a results page
    pub fn first_video_id(html: &str) -> Option<&str> {
        WATCH_ID
            .captures(html)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str())
    }

    async fn search_page(&self, query: &str) -> PlaybackResult<String> {
        let search_url = format!(
            "{}?search_query={}",
            RESULTS_URL,
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(&search_url)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("❌ Búsqueda en YouTube falló: {}", e);
                return Err(PlaybackError::NoSearchResults(query.to_string()));
            }
        };

        response.text().await.map_err(|e| {
            warn!("❌ Error leyendo resultados: {}", e);
            PlaybackError::NoSearchResults(query.to_string())
        })
    }
}

#[async_trait]
impl Resolver for YouTubeSearchResolver {
    fn matches(&self, _request: &str) -> bool {
        true
    }

    async fn resolve(&self, request: &str) -> PlaybackResult<TrackSource> {
        info!("🔍 Buscando en YouTube: {}", request);

        let html = self.search_page(request).await?;
        let video_id = Self::first_video_id(&html)
            .ok_or_else(|| PlaybackError::NoSearchResults(request.to_string()))?;

        self.direct
            .resolve(&YouTubeResolver::watch_url(video_id))
            .await
    }

    fn source_name(&self) -> &'static str {
        "YouTube search"
    }
}
