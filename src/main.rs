use anyhow::Result;
use serenity::{all::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use resonance::audio::{EngineDeps, MusicEngine, TransportOptions};
use resonance::bot::{DiscordNotifier, ResonanceBot, SongbirdTransport};
use resonance::config::{Config, TimerSettings};
use resonance::sources::{
    ytdlp::verify_dependencies, HttpStreamValidator, QueryResolver, SpotifyClient, YtDlpExtractor,
};
use resonance::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resonance=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Resonance v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        verify_dependencies(&config.ytdlp_path, &config.ffmpeg_path).await?;
        println!("OK");
        return Ok(());
    }
    if let Err(e) = verify_dependencies(&config.ytdlp_path, &config.ffmpeg_path).await {
        warn!("⚠️ Dependencias externas no verificadas: {}", e);
    }

    // Almacenamiento de snapshots
    let storage = JsonStorage::new(&config.data_dir).await?;
    match storage.stats().await {
        Ok(stats) => info!("{}", stats),
        Err(e) => warn!("⚠️ No se pudieron leer estadísticas de almacenamiento: {}", e),
    }

    // Extracción: yt-dlp, con Spotify como resolución de metadatos si hay credenciales
    let ytdlp = Arc::new(YtDlpExtractor::new(
        config.ytdlp_path.clone(),
        config.user_agent.clone(),
        config.extraction_workers,
    ));
    let mut resolver = QueryResolver::new(ytdlp);
    if let Some((id, secret)) = config.spotify_credentials() {
        resolver = resolver.with_metadata(Arc::new(SpotifyClient::new(id, secret)?));
        info!("🟢 Resolución de enlaces de Spotify activada");
    }

    let songbird = Songbird::serenity();
    let transport = SongbirdTransport::new(
        songbird.clone(),
        TransportOptions {
            ffmpeg_path: config.ffmpeg_path.clone(),
            user_agent: config.user_agent.clone(),
        },
    );
    let http = Arc::new(Http::new(&config.discord_token));

    let (engine, events) = MusicEngine::new(
        config.engine_settings(),
        EngineDeps {
            extractor: Arc::new(resolver),
            validator: Arc::new(HttpStreamValidator::new(&config.user_agent)?),
            transport: Arc::new(transport),
            store: Arc::new(storage),
            notifier: Arc::new(DiscordNotifier::new(http)),
        },
    );

    let shutdown = CancellationToken::new();
    let event_loop = engine.spawn_event_loop(events, shutdown.child_token());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = ResonanceBot::new(engine.clone(), TimerSettings::default(), shutdown.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Shutdown ordenado: snapshots a disco antes de cerrar los shards
    let shard_manager = client.shard_manager.clone();
    tokio::spawn({
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Error al registrar Ctrl+C: {}", e);
                return;
            }
            info!("⚠️ Señal de shutdown recibida, cerrando...");
            engine.flush_snapshots().await;
            shutdown.cancel();
            shard_manager.shutdown_all().await;
        }
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    if let Err(e) = event_loop.await {
        warn!("⚠️ Bucle del motor terminó con error: {}", e);
    }
    Ok(())
}
