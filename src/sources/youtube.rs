use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Resolver, SourceType, TrackSource};
use crate::error::{PlaybackError, PlaybackResult};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("valid youtube regex")
});

/// Subset of `yt-dlp --dump-json` output
#[derive(Debug, Deserialize)]
pub(crate) struct YtDlpInfo {
    pub title: String,
    /// Direct media URL of the selected format
    pub url: Option<String>,
    pub thumbnail: Option<String>,
}

impl YtDlpInfo {
    fn into_track(self, request: &str) -> PlaybackResult<TrackSource> {
        let stream_url = self.url.unwrap_or_default();
        let track = TrackSource::from_stream_url(self.title, stream_url, SourceType::YouTube)
            .ok_or_else(|| PlaybackError::SourceUnavailable(request.to_string()))?;

        Ok(match self.thumbnail {
            Some(thumbnail) => track.with_thumbnail(thumbnail),
            None => track,
        })
    }
}

/// Resolves YouTube links to a direct audio stream through yt-dlp
pub struct YouTubeResolver {
    ytdlp_path: String,
}

impl YouTubeResolver {
    pub fn new(ytdlp_path: String) -> Self {
        Self { ytdlp_path }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url.trim())
    }

    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }

    async fn dump_info(&self, url: &str) -> PlaybackResult<YtDlpInfo> {
        debug!("📊 Obteniendo info de: {}", url);

        let output = Command::new(&self.ytdlp_path)
            .args([
                "-f",
                "bestaudio/best",
                "--dump-json",
                "--no-playlist",
                "--no-warnings",
                url,
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                warn!("❌ No se pudo ejecutar yt-dlp: {}", e);
                PlaybackError::SourceUnavailable(url.to_string())
            })?;

        if !output.status.success() {
            warn!(
                "❌ yt-dlp error para {}: {}",
                url,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(PlaybackError::SourceUnavailable(url.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|e| {
            warn!("❌ Respuesta de yt-dlp ilegible: {}", e);
            PlaybackError::SourceUnavailable(url.to_string())
        })
    }
}

#[async_trait]
impl Resolver for YouTubeResolver {
    fn matches(&self, request: &str) -> bool {
        Self::is_youtube_url(request)
    }

    async fn resolve(&self, request: &str) -> PlaybackResult<TrackSource> {
        self.dump_info(request).await?.into_track(request)
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StreamRef;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeResolver::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeResolver::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeResolver::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(YouTubeResolver::is_youtube_url("youtube.com/shorts/abc"));
        assert!(!YouTubeResolver::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeResolver::is_youtube_url("lofi beats youtube.com"));
        assert!(!YouTubeResolver::is_youtube_url(
            "https://open.spotify.com/track/123"
        ));
    }

    #[test]
    fn test_dump_json_becomes_track() {
        let info: YtDlpInfo = serde_json::from_str(
            r#"{"title":"Song","url":"https://rr1.googlevideo.com/a","thumbnail":"https://i.ytimg.com/t.jpg","webpage_url":"https://www.youtube.com/watch?v=abc","duration":180}"#,
        )
        .unwrap();
        let track = info.into_track("https://youtu.be/abc").unwrap();

        assert_eq!(track.title(), "Song");
        assert_eq!(
            track.stream(),
            &StreamRef::Url("https://rr1.googlevideo.com/a".into())
        );
        assert_eq!(track.thumbnail(), Some("https://i.ytimg.com/t.jpg"));
        assert!(track.local_file_path().is_none());
    }

    #[test]
    fn test_missing_stream_is_unavailable() {
        let info: YtDlpInfo = serde_json::from_str(r#"{"title":"Live"}"#).unwrap();
        assert_eq!(
            info.into_track("https://youtu.be/abc").unwrap_err(),
            PlaybackError::SourceUnavailable("https://youtu.be/abc".into())
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let resolver = YouTubeResolver::new("/nonexistent/yt-dlp".into());
        let err = resolver.resolve("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, PlaybackError::SourceUnavailable(_)));
    }
}
