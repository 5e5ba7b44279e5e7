//! # Audio Module
//!
//! Per-guild playback orchestration.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - State machine owning one guild's queue, current track and voice handle
//! - Serializes its own commands; never holds its lock across an await
//!
//! ### [`manager`] - Session Manager
//! - Concurrent guild → session registry with explicit create/remove
//!
//! ### [`gate`] - Download Gate
//! - Process-wide single-holder lock around every resolution
//!
//! ### [`reaper`] - Inactivity Reaper
//! - Periodic sweep stopping sessions that sit idle on a voice connection
//!
//! ### [`player`] - Songbird Sink
//! - [`AudioSink`] backed by songbird track handles
//!
//! The platform is reached only through the [`Transport`] and [`AudioSink`]
//! capabilities, so the state machine runs unchanged against test doubles.

pub mod gate;
pub mod manager;
pub mod player;
pub mod reaper;
pub mod session;

#[cfg(test)]
pub mod testing;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};

use crate::{error::PlaybackResult, sources::StreamRef};

/// An established voice connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConnection {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Why a track stopped producing audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    Stopped,
    Errored,
}

/// Completion hook handed to [`AudioSink::play`]. Invoked once.
pub type OnComplete = Box<dyn FnOnce(PlaybackEnd) + Send + 'static>;

/// Content of the interactive "now playing" message
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub thumbnail: Option<String>,
}

/// Chat/voice platform binding
#[async_trait]
pub trait Transport: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId)
        -> PlaybackResult<VoiceConnection>;

    async fn leave(&self, connection: &VoiceConnection) -> Result<()>;

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()>;

    /// Sends the now-playing message with pause/resume/stop/skip controls.
    async fn send_now_playing(&self, channel_id: ChannelId, track: &NowPlaying) -> Result<()>;
}

/// Audio transmission binding
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Starts playback; `on_complete` fires when the track finishes or is stopped.
    async fn play(
        &self,
        connection: &VoiceConnection,
        stream: &StreamRef,
        on_complete: OnComplete,
    ) -> Result<()>;

    fn pause(&self, connection: &VoiceConnection) -> Result<()>;

    fn resume(&self, connection: &VoiceConnection) -> Result<()>;

    /// Stops the active track, firing its completion hook with [`PlaybackEnd::Stopped`].
    fn stop(&self, connection: &VoiceConnection);

    fn is_playing(&self, connection: &VoiceConnection) -> bool;

    fn is_paused(&self, connection: &VoiceConnection) -> bool;
}
