use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::{
    now_playing::NowPlayingSync,
    player::PlaybackSequencer,
    radio::RadioBackoff,
    reaper::IdleReaper,
    scheduler::{spawn_dispatcher, CompletionBridge},
    session::SessionStore,
    stats::ListeningStats,
};
use crate::bot::{voice::SongbirdGateway, RadioBot};
use crate::config::Config;
use crate::sources::catalog::CatalogClient;
use crate::ui::player_message::DiscordPlayerSink;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wrld_radio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("📻 Starting WRLD Radio v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let catalog = Arc::new(CatalogClient::new(&config.catalog_api_base_url, config.http_timeout())?);
    let manager = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(
        manager.clone(),
        catalog.http_client(),
        config.default_volume,
    ));

    let sessions = Arc::new(SessionStore::new(config.history_size, config.max_queue_size));
    let (bridge, events) = CompletionBridge::new();

    // El mensaje del reproductor usa su propio cliente HTTP
    let sink = Arc::new(DiscordPlayerSink::new(Arc::new(Http::new(&config.discord_token))));
    let (now_playing, now_playing_worker) = NowPlayingSync::new(
        sessions.clone(),
        gateway.clone(),
        sink,
        config.progress_refresh(),
        config.now_playing_delete_delay(),
    );
    let observer = Arc::new(now_playing);
    let stats = Arc::new(ListeningStats::new());

    let sequencer = Arc::new(PlaybackSequencer::new(
        sessions.clone(),
        gateway.clone(),
        catalog.clone(),
        bridge,
        observer.clone(),
        stats.clone(),
        RadioBackoff::from_config(&config),
    ));
    let reaper = Arc::new(IdleReaper::new(
        sessions,
        gateway.clone(),
        observer,
        config.idle_timeout(),
        config.idle_sweep_interval(),
    ));

    // Tareas de fondo
    spawn_dispatcher(sequencer.clone(), events);
    tokio::spawn(now_playing_worker.run());
    tokio::spawn(reaper.clone().run());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let token = config.discord_token.clone();
    let handler = RadioBot::new(config, sequencer, reaper, catalog, gateway, stats);

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Shutdown signal received, closing...");
        std::process::exit(0);
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
