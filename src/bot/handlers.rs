use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
    model::{
        application::ComponentInteraction,
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use super::{
    commands::{self, Command},
    cooldown::PlayCooldown,
    JukeboxBot,
};
use crate::{
    audio::{manager::SessionManager, session::PlayRequest},
    error::PlaybackError,
    ui::buttons::PlayerControl,
};

/// Where a command came from
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub text_channel: ChannelId,
    /// Voice channel the author is connected to, if any
    pub voice_channel: Option<ChannelId>,
}

/// Maneja comandos con prefijo
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &JukeboxBot) -> Result<()> {
    let Some(command) = Command::parse(&msg.content, &bot.config.command_prefix) else {
        return Ok(());
    };
    let Some(guild_id) = msg.guild_id else {
        debug!("Comando ignorado fuera de un servidor");
        return Ok(());
    };

    info!(
        "📝 Comando {} usado por {} en guild {}",
        command.name(),
        msg.author.name,
        guild_id
    );

    let origin = Origin {
        guild_id,
        user_id: msg.author.id,
        text_channel: msg.channel_id,
        voice_channel: user_voice_channel(ctx, guild_id, msg.author.id),
    };

    if let Some(reply) = execute(
        &bot.manager,
        &bot.cooldown,
        &bot.config.command_prefix,
        command,
        origin,
    )
    .await
    {
        msg.channel_id.say(&ctx.http, reply).await?;
    }

    Ok(())
}

/// Runs a command and returns the reply for the invoking channel.
///
/// Play-path messages (queue acks, now playing, resolution failures) are sent
/// by the session itself, so `play` and `queue` usually reply with nothing.
pub async fn execute(
    manager: &SessionManager,
    cooldown: &PlayCooldown,
    prefix: &str,
    command: Command,
    origin: Origin,
) -> Option<String> {
    let guild_id = origin.guild_id;

    match command {
        Command::Play(request) => {
            if let Err(err) = cooldown.check(origin.user_id) {
                return err.user_message();
            }
            let request = PlayRequest {
                request,
                text_channel: origin.text_channel,
                voice_channel: origin.voice_channel,
            };
            if let Err(e) = manager.play(guild_id, request).await {
                debug!("play terminó con error: {}", e);
            }
            None
        }
        Command::Queue(request) => {
            if let Err(e) = manager.enqueue(guild_id, request, origin.text_channel).await {
                debug!("queue terminó con error: {}", e);
            }
            None
        }
        Command::Skip => Some(reply(manager.skip(guild_id), "⏭️ Skipped.")),
        Command::Stop => Some(reply(manager.stop(guild_id).await, "⏹️ Stopped.")),
        Command::Pause => Some(reply(manager.pause(guild_id), "⏸️ Paused.")),
        Command::Resume => Some(reply(manager.resume(guild_id), "▶️ Resumed.")),
        Command::ClearQueue => {
            manager.clear_queue(guild_id);
            Some("🗑️ Queue cleared".to_string())
        }
        Command::Usage(name) => Some(commands::usage(prefix, name)),
    }
}

/// Runs a player control and returns the ephemeral reply.
pub async fn execute_control(
    manager: &SessionManager,
    guild_id: GuildId,
    control: PlayerControl,
) -> String {
    match control {
        PlayerControl::Pause => reply(manager.pause(guild_id), "⏸️ Paused."),
        PlayerControl::Resume => reply(manager.resume(guild_id), "▶️ Resumed."),
        PlayerControl::Skip => reply(manager.skip(guild_id), "⏭️ Skipped."),
        PlayerControl::Stop => reply(manager.stop(guild_id).await, "⏹️ Stopped."),
    }
}

/// Maneja interacciones con botones
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let content = match PlayerControl::from_custom_id(&component.data.custom_id) {
        Some(control) => execute_control(&bot.manager, guild_id, control).await,
        None => "❌ Unknown action".to_string(),
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

fn reply(result: Result<(), PlaybackError>, success: &str) -> String {
    match result {
        Ok(()) => success.to_string(),
        Err(err) => err
            .user_message()
            .unwrap_or_else(|| "❌ Something went wrong.".to_string()),
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}
