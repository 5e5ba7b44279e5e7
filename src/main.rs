use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    gate::DownloadGate, manager::SessionManager, player::SongbirdSink, session::SessionContext,
};
use crate::bot::{transport::DiscordTransport, JukeboxBot};
use crate::config::Config;
use crate::sources::ResolverRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let songbird = Songbird::serenity();
    let http = Arc::new(Http::new(&config.discord_token));

    let ctx = SessionContext {
        transport: Arc::new(DiscordTransport::new(http, songbird.clone())),
        sink: Arc::new(SongbirdSink::new(songbird.clone(), config.default_volume)),
        registry: Arc::new(ResolverRegistry::standard(&config)?),
        gate: DownloadGate::new(),
        max_queue_size: config.max_queue_size,
    };
    let manager = Arc::new(SessionManager::new(ctx));

    let shutdown = CancellationToken::new();
    let handler = JukeboxBot::new(config.clone(), manager.clone(), shutdown.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        for session in manager.sessions() {
            manager.stop_session(&session).await;
        }
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let spotdl = Command::new(&config.spotdl_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() && spotdl.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
