use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod notify;
mod sources;
mod ui;

#[cfg(test)]
mod testing;

use crate::audio::{
    preloader::Preloader,
    queue::QueueStore,
    sequencer::PlaybackSequencer,
};
use crate::bot::{controller::MusicController, TuneQueueBot};
use crate::config::Config;
use crate::sources::{
    alternative::SearchFallback,
    page_hints::HttpPageFetcher,
    resolver::TrackResolver,
    ytdlp::{YtDlpExtractor, YtDlpSettings},
    MediaExtractor,
};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunequeue=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando TuneQueue v{}", env!("CARGO_PKG_VERSION"));

    // El health check no necesita credenciales de Discord
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        let settings = YtDlpSettings {
            binary: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            ..YtDlpSettings::default()
        };
        return tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(health_check(settings));
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    // Resolución
    let ytdlp = Arc::new(YtDlpExtractor::new(config.ytdlp_settings()));
    match ytdlp.verify_installation().await {
        Ok(version) => info!("✅ yt-dlp {}", version),
        Err(e) => error!("❌ yt-dlp no disponible: {:?}", e),
    }

    let fetcher = Arc::new(HttpPageFetcher::new(config.page_fetch_timeout)?);
    let http_client = fetcher.client();
    let extractor: Arc<dyn MediaExtractor> = ytdlp.clone();
    let alternative = Arc::new(SearchFallback::new(extractor.clone(), fetcher.clone()));
    let resolver = Arc::new(TrackResolver::new(extractor.clone(), fetcher, alternative));

    // Cola y reproducción
    let store = Arc::new(QueueStore::new(config.cache_limits()));
    let preloader = Arc::new(Preloader::new(
        store.clone(),
        extractor,
        config.playlist_preload,
    ));
    let (sequencer, events) =
        PlaybackSequencer::new(store.clone(), preloader.clone(), config.sequencer_settings());
    tokio::spawn(sequencer.clone().run(events, shutdown.clone()));

    let controller = Arc::new(MusicController::new(
        store,
        resolver,
        preloader,
        sequencer,
        config.preload_ahead,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = TuneQueueBot::new(
        config.clone(),
        controller,
        ytdlp,
        http_client,
        shutdown.clone(),
    );

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
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
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(settings: YtDlpSettings) -> Result<()> {
    let extractor = YtDlpExtractor::new(settings);
    let version = extractor.verify_installation().await?;
    println!("OK (yt-dlp {})", version);
    Ok(())
}
