//! Playback error taxonomy.
//!
//! Every failure a guild can observe maps to one [`PlaybackError`] variant, and
//! every variant renders to exactly one chat message through
//! [`PlaybackError::user_message`].

use std::time::Duration;
use thiserror::Error;

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// The voice connection could not be established
    #[error("Voice join failed: {0}")]
    VoiceJoinFailed(String),

    /// The requester is not connected to a voice channel
    #[error("Requester is not in a voice channel")]
    NotInVoiceChannel,

    /// The platform reported no playable stream for the link
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Free-text search returned nothing
    #[error("No search results for: {0}")]
    NoSearchResults(String),

    /// The download tool produced no file
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// `play` issued before the per-user cooldown elapsed
    #[error("Rate limited, retry in {remaining:?}")]
    RateLimited { remaining: Duration },

    /// Benign no-op such as resuming while already playing
    #[error("Invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// A local file could not be removed
    #[error("File cleanup failed: {0}")]
    FileCleanupFailed(String),

    /// The session was stopped while the command was in flight
    #[error("Session closed")]
    SessionClosed,
}

impl PlaybackError {
    /// Chat text for this failure, or `None` for errors that are only logged.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            Self::VoiceJoinFailed(_) => "❌ Could not join your voice channel.".to_string(),
            Self::NotInVoiceChannel => "❌ You need to be in a voice channel.".to_string(),
            Self::SourceUnavailable(request) => {
                format!("❌ No playable stream for: {}", request)
            }
            Self::NoSearchResults(query) => format!("❌ No results found for: {}", query),
            Self::DownloadFailed(request) => format!("❌ Could not download: {}", request),
            Self::RateLimited { remaining } => format!(
                "⏳ Please wait {:.1} seconds before using `play` again.",
                remaining.as_secs_f64()
            ),
            Self::InvalidTransition(reason) => format!("ℹ️ {}", reason),
            Self::SessionClosed => "ℹ️ Playback was stopped.".to_string(),
            Self::FileCleanupFailed(_) => return None,
        };
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_failures_stay_silent() {
        assert!(PlaybackError::FileCleanupFailed("gone".into())
            .user_message()
            .is_none());
    }

    #[test]
    fn test_rate_limit_message_names_remaining_wait() {
        let err = PlaybackError::RateLimited {
            remaining: Duration::from_millis(12_500),
        };
        let message = err.user_message().unwrap();
        assert!(message.contains("12.5 seconds"), "{}", message);
    }
}
