pub mod search;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{PlaybackError, PlaybackResult},
};

pub use search::YouTubeSearchResolver;
pub use spotify::SpotifyResolver;
pub use youtube::YouTubeResolver;

/// Strategy that turns a raw request string into a playable track
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Whether this resolver accepts the request
    fn matches(&self, request: &str) -> bool;

    /// Resolves the request. May block on network or a child process.
    async fn resolve(&self, request: &str) -> PlaybackResult<TrackSource>;

    /// Name used in logs
    fn source_name(&self) -> &'static str;
}

/// Where the audio sink reads the track from
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRef {
    Url(String),
    File(PathBuf),
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Url(url) => write!(f, "{}", url),
            StreamRef::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Source families
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceType {
    YouTube,
    Spotify,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "youtube",
            SourceType::Spotify => "spotify",
        }
    }
}

/// A downloaded file owned by exactly one track.
///
/// The file is removed on the first call to [`LocalFile::release`]; later
/// calls are no-ops. A file that was never released is removed on drop.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    released: bool,
}

impl LocalFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns `Ok(true)` when this call removed the file.
    pub fn release(&mut self) -> PlaybackResult<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;

        std::fs::remove_file(&self.path).map_err(|e| {
            PlaybackError::FileCleanupFailed(format!("{}: {}", self.path.display(), e))
        })?;
        debug!("🗑️ Archivo liberado: {}", self.path.display());
        Ok(true)
    }
}

impl Drop for LocalFile {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release() {
                warn!("⚠️ {}", e);
            }
        }
    }
}

/// A resolved, playable track
#[derive(Debug)]
pub struct TrackSource {
    title: String,
    stream: StreamRef,
    thumbnail: Option<String>,
    local_file: Option<LocalFile>,
    source_type: SourceType,
}

impl TrackSource {
    /// Track streamed from a remote URL. Returns `None` for an empty URL.
    pub fn from_stream_url(title: String, url: String, source_type: SourceType) -> Option<Self> {
        if url.trim().is_empty() {
            return None;
        }

        Some(Self {
            title,
            stream: StreamRef::Url(url),
            thumbnail: None,
            local_file: None,
            source_type,
        })
    }

    /// Track materialized on disk. The track takes ownership of the file.
    pub fn from_download(title: String, path: PathBuf, source_type: SourceType) -> Self {
        Self {
            title,
            stream: StreamRef::File(path.clone()),
            thumbnail: None,
            local_file: Some(LocalFile::new(path)),
            source_type,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        if !thumbnail.is_empty() {
            self.thumbnail = Some(thumbnail);
        }
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn stream(&self) -> &StreamRef {
        &self.stream
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn local_file_path(&self) -> Option<&Path> {
        self.local_file.as_ref().map(LocalFile::path)
    }

    /// Removes the owned file, if any. Safe to call more than once.
    pub fn release_local_file(&mut self) -> PlaybackResult<bool> {
        match self.local_file.as_mut() {
            Some(file) => file.release(),
            None => Ok(false),
        }
    }
}

/// Ordered set of resolvers; the first match wins
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn new(resolvers: Vec<Arc<dyn Resolver>>) -> Self {
        Self { resolvers }
    }

    /// Direct YouTube links, then Spotify downloads, then free-text search.
    pub fn standard(config: &Config) -> anyhow::Result<Self> {
        let youtube = Arc::new(YouTubeResolver::new(config.ytdlp_path.clone()));
        let spotify = Arc::new(SpotifyResolver::new(
            config.spotdl_path.clone(),
            config.download_dir.clone(),
            config.download_timeout,
        ));
        let search = Arc::new(YouTubeSearchResolver::new(youtube.clone())?);

        Ok(Self::new(vec![youtube, spotify, search]))
    }

    pub fn select(&self, request: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.iter().find(|r| r.matches(request))
    }

    pub async fn resolve(&self, request: &str) -> PlaybackResult<TrackSource> {
        let request = request.trim();
        let resolver = self
            .select(request)
            .ok_or_else(|| PlaybackError::SourceUnavailable(request.to_string()))?;

        info!("🔍 Resolviendo con {}: {}", resolver.source_name(), request);
        let track = resolver.resolve(request).await?;
        debug!("✅ Resuelto [{}]: {}", track.source_type().as_str(), track.title());
        Ok(track)
    }
}
