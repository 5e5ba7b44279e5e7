use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info};

use super::session::{GuildSession, PlayOutcome, PlayRequest, SessionContext};
use crate::error::{PlaybackError, PlaybackResult};

/// Registry of live guild sessions.
///
/// A guild has at most one session at a time. Sessions are created on first
/// use and removed explicitly once stopped.
pub struct SessionManager {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    ctx: Arc<SessionContext>,
}

impl SessionManager {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            sessions: DashMap::new(),
            ctx: Arc::new(ctx),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| GuildSession::spawn(guild_id, self.ctx.clone()))
            .value()
            .clone()
    }

    #[cfg(test)]
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    /// Removes `session` only if it is still the one registered for its guild.
    pub fn remove_session(&self, session: &Arc<GuildSession>) -> bool {
        self.sessions
            .remove_if(&session.guild_id(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Snapshot of the registered sessions
    pub fn sessions(&self) -> Vec<Arc<GuildSession>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub async fn play(
        &self,
        guild_id: GuildId,
        request: PlayRequest,
    ) -> PlaybackResult<PlayOutcome> {
        let session = self.get_or_create(guild_id);
        match session.play(request.clone()).await {
            Err(PlaybackError::SessionClosed) => {
                // Lost a race with stop; the stopped session is finished for good
                debug!(guild_id = %guild_id, "Sesión cerrada, creando una nueva");
                self.remove_session(&session);
                self.get_or_create(guild_id).play(request).await
            }
            result => result,
        }
    }

    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        request: String,
        text_channel: ChannelId,
    ) -> PlaybackResult<usize> {
        let session = self.get_or_create(guild_id);
        match session.enqueue(request.clone(), text_channel).await {
            Err(PlaybackError::SessionClosed) => {
                self.remove_session(&session);
                self.get_or_create(guild_id)
                    .enqueue(request, text_channel)
                    .await
            }
            result => result,
        }
    }

    pub fn pause(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.require(guild_id)?.pause()
    }

    pub fn resume(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.require(guild_id)?.resume()
    }

    pub fn skip(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.require(guild_id)?.skip()
    }

    /// Returns how many entries were removed.
    pub fn clear_queue(&self, guild_id: GuildId) -> usize {
        self.get(guild_id)
            .map(|session| session.clear_queue())
            .unwrap_or(0)
    }

    /// Stops and unregisters the guild's session.
    pub async fn stop(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self
            .get(guild_id)
            .ok_or(PlaybackError::InvalidTransition("I'm not connected."))?;
        self.stop_session(&session).await;
        Ok(())
    }

    pub async fn stop_session(&self, session: &Arc<GuildSession>) -> bool {
        let stopped = session.stop().await;
        if self.remove_session(session) {
            info!(guild_id = %session.guild_id(), "🧹 Sesión eliminada");
        }
        stopped
    }

    fn require(&self, guild_id: GuildId) -> PlaybackResult<Arc<GuildSession>> {
        self.get(guild_id)
            .ok_or(PlaybackError::InvalidTransition("Nothing is playing right now."))
    }
}
