use async_trait::async_trait;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{fs, process::Command};
use tracing::{info, warn};
use url::Url;

use super::{Resolver, SourceType, TrackSource};
use crate::error::{PlaybackError, PlaybackResult};

/// Spotify tracks can't be streamed directly; spotdl materializes them into
/// the shared download directory first.
pub struct SpotifyResolver {
    spotdl_path: String,
    download_dir: PathBuf,
    timeout: Duration,
}

impl SpotifyResolver {
    pub fn new(spotdl_path: String, download_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            spotdl_path,
            download_dir,
            timeout,
        }
    }

    /// Accepts links with or without a scheme (`open.spotify.com/track/...`)
    pub fn is_spotify_url(url: &str) -> bool {
        let url = url.trim();
        Url::parse(url)
            .or_else(|_| Url::parse(&format!("https://{}", url)))
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_owned))
            .is_some_and(|host| host == "spotify.com" || host.ends_with(".spotify.com"))
    }

    async fn list_files(&self) -> std::io::Result<HashSet<PathBuf>> {
        let mut files = HashSet::new();
        let mut entries = fs::read_dir(&self.download_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.insert(entry.path());
            }
        }
        Ok(files)
    }

    /// Files that were not present before the download, newest first
    async fn new_files(&self, before: &HashSet<PathBuf>) -> Vec<PathBuf> {
        let Ok(after) = self.list_files().await else {
            return Vec::new();
        };

        let mut files = Vec::new();
        for path in after.difference(before) {
            let modified = fs::metadata(path)
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, path.clone()));
        }
        files.sort_by(|a, b| b.0.cmp(&a.0));

        files.into_iter().map(|(_, path)| path).collect()
    }

    async fn run_download(&self, url: &str) -> PlaybackResult<()> {
        let mut command = Command::new(&self.spotdl_path);
        command
            .arg(url)
            .arg("--output")
            .arg(&self.download_dir)
            .kill_on_drop(true);

        let failed = |reason: String| {
            warn!("❌ Descarga falló para {}: {}", url, reason);
            PlaybackError::DownloadFailed(url.to_string())
        };

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| failed(format!("timeout tras {:?}", self.timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[async_trait]
impl Resolver for SpotifyResolver {
    fn matches(&self, request: &str) -> bool {
        Self::is_spotify_url(request)
    }

    async fn resolve(&self, request: &str) -> PlaybackResult<TrackSource> {
        fs::create_dir_all(&self.download_dir).await.map_err(|e| {
            warn!("❌ No se pudo crear {}: {}", self.download_dir.display(), e);
            PlaybackError::DownloadFailed(request.to_string())
        })?;

        let before = self.list_files().await.unwrap_or_default();

        info!("⬇️ Descargando: {}", request);
        let result = self.run_download(request).await;
        let mut new_files = self.new_files(&before).await.into_iter();

        // Only one file is handed out; anything else this run wrote has no owner
        let chosen = if result.is_ok() { new_files.next() } else { None };
        for extra in new_files {
            if let Err(e) = fs::remove_file(&extra).await {
                warn!("⚠️ No se pudo borrar {}: {}", extra.display(), e);
            }
        }

        match (result, chosen) {
            (Ok(()), Some(path)) => {
                info!("✅ Descarga completa: {}", path.display());
                Ok(TrackSource::from_download(
                    title_from_path(&path),
                    path,
                    SourceType::Spotify,
                ))
            }
            (Ok(()), None) => {
                warn!("❌ spotdl terminó sin producir archivo para {}", request);
                Err(PlaybackError::DownloadFailed(request.to_string()))
            }
            (Err(e), _) => Err(e),
        }
    }

    fn source_name(&self) -> &'static str {
        "Spotify"
    }
}
