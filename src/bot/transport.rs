use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    audio::{NowPlaying, Transport, VoiceConnection},
    error::{PlaybackError, PlaybackResult},
    ui::{buttons::create_player_buttons, embeds::now_playing_embed},
};

/// [`Transport`] over the Discord REST API and songbird voice gateway
pub struct DiscordTransport {
    http: Arc<Http>,
    songbird: Arc<Songbird>,
}

impl DiscordTransport {
    pub fn new(http: Arc<Http>, songbird: Arc<Songbird>) -> Self {
        Self { http, songbird }
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<VoiceConnection> {
        match self.songbird.join(guild_id, channel_id).await {
            Ok(_call) => Ok(VoiceConnection {
                guild_id,
                channel_id,
            }),
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                // Drop the half-open call
                if let Err(cleanup) = self.songbird.remove(guild_id).await {
                    debug!("Sin llamada que limpiar en guild {}: {}", guild_id, cleanup);
                }
                Err(PlaybackError::VoiceJoinFailed(e.to_string()))
            }
        }
    }

    async fn leave(&self, connection: &VoiceConnection) -> Result<()> {
        match self.songbird.remove(connection.guild_id).await {
            Ok(()) => {
                debug!("👋 Desconectado del canal de voz en guild {}", connection.guild_id);
                Ok(())
            }
            // Already gone, e.g. after a forced disconnect
            Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        channel_id.say(&self.http, content).await?;
        Ok(())
    }

    async fn send_now_playing(&self, channel_id: ChannelId, track: &NowPlaying) -> Result<()> {
        let message = CreateMessage::new()
            .embed(now_playing_embed(track))
            .components(vec![create_player_buttons()]);
        channel_id.send_message(&self.http, message).await?;
        Ok(())
    }
}
