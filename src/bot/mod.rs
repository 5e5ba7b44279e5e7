//! # Bot Module
//!
//! Discord front end for the jukebox.
//!
//! - [`commands`]: prefix command parsing
//! - [`handlers`]: command and button dispatch into the [`SessionManager`]
//! - [`cooldown`]: per-user `play` rate limit
//! - [`transport`]: the [`Transport`](crate::audio::Transport) binding over
//!   the Discord API and songbird
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] and owns no playback
//! state of its own; everything lives in the per-guild sessions.

use serenity::{
    all::{ChannelId, Context, EventHandler, Interaction, Message, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub mod commands;
pub mod cooldown;
pub mod handlers;
pub mod transport;

use crate::{
    audio::{manager::SessionManager, reaper::InactivityReaper},
    config::Config,
};
use cooldown::PlayCooldown;

/// Main Discord event handler
pub struct JukeboxBot {
    config: Arc<Config>,
    manager: Arc<SessionManager>,
    cooldown: PlayCooldown,
    reaper_started: AtomicBool,
    shutdown: CancellationToken,
}

impl JukeboxBot {
    pub fn new(config: Config, manager: Arc<SessionManager>, shutdown: CancellationToken) -> Self {
        let cooldown = PlayCooldown::new(config.play_cooldown);

        Self {
            config: Arc::new(config),
            manager,
            cooldown,
            reaper_started: AtomicBool::new(false),
            shutdown,
        }
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    /// Starts the inactivity reaper on the first ready event. Reconnects
    /// fire `ready` again and must not start a second one.
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if !self.reaper_started.swap(true, Ordering::SeqCst) {
            InactivityReaper::new(self.manager.clone(), self.config.reap_interval)
                .spawn(self.shutdown.clone());
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = handlers::handle_message(&ctx, &msg, self).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component_interaction) = interaction {
            if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                error!("Error manejando componente: {:?}", e);
            }
        }
    }

    /// Tears the session down when the bot is disconnected from voice by
    /// someone else.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        let old_channel = old.and_then(|state| state.channel_id);
        if !left_voice(current_user_id, new.user_id, old_channel, new.channel_id) {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            if let Some(session) = self.manager.get(guild_id) {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.manager.stop_session(&session).await;
            }
        }
    }
}

/// The bot itself went from a voice channel to none
fn left_voice(
    bot_id: UserId,
    user_id: UserId,
    old_channel: Option<ChannelId>,
    new_channel: Option<ChannelId>,
) -> bool {
    user_id == bot_id && old_channel.is_some() && new_channel.is_none()
}
