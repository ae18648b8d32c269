//! # Bot Module
//!
//! Discord adapter for the queue and playback engine.
//!
//! - [`commands`]: slash command definitions and registration
//! - [`handlers`]: interaction dispatch, voice channel lookup and joining
//! - [`controller`]: command operations, independent of the gateway
//!
//! The [`TuneQueueBot`] struct implements Serenity's [`EventHandler`]. It
//! registers commands on ready, routes interactions to the handlers and
//! detaches a guild's playback session when the bot is disconnected from
//! voice by someone else.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod controller;
pub mod handlers;

use crate::{config::Config, sources::ytdlp::YtDlpExtractor};
use controller::MusicController;

/// Main Discord event handler.
pub struct TuneQueueBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Command operations over the queue store, resolver and sequencer
    pub controller: Arc<MusicController>,
    /// Used by the maintenance task to verify the extractor binary
    ytdlp: Arc<YtDlpExtractor>,
    /// Cliente HTTP compartido por los streams de Songbird
    http_client: reqwest::Client,
    shutdown: CancellationToken,
    // `ready` se repite en cada reconexión del gateway
    maintenance_started: AtomicBool,
}

impl TuneQueueBot {
    pub fn new(
        config: Arc<Config>,
        controller: Arc<MusicController>,
        ytdlp: Arc<YtDlpExtractor>,
        http_client: reqwest::Client,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            controller,
            ytdlp,
            http_client,
            shutdown,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate almost immediately;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos globales: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                    })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for TuneQueueBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        if self.maintenance_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let controller = self.controller.clone();
        let ytdlp = self.ytdlp.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            maintenance_tasks(controller, ytdlp, shutdown).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si el bot fue desconectado del canal de voz (kick, move a ninguna
    /// parte, canal borrado), se descarta la sesión de la guild.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.controller.sequencer().detach(guild_id).await;
        }
    }
}

/// Tareas periódicas: limpieza de entradas expiradas y verificación de yt-dlp.
/// Se ejecuta cada hora hasta el shutdown.
async fn maintenance_tasks(
    controller: Arc<MusicController>,
    ytdlp: Arc<YtDlpExtractor>,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600)); // Cada hora

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("🛑 Tareas de mantenimiento detenidas");
                return;
            }
            _ = interval.tick() => {}
        }

        let store = controller.store();
        let removed = store.cleanup_expired();
        let stats = store.stats();
        info!(
            "🧹 Mantenimiento: {} expiradas, {} guilds ({} conectadas), {} en cola, aciertos audio {:.1}%",
            removed,
            stats.guilds,
            controller.sequencer().active_guilds(),
            stats.queued,
            stats.audio.hit_rate() * 100.0
        );

        if let Err(e) = ytdlp.verify_installation().await {
            warn!("Error verificando dependencias: {:?}", e);
        }
    }
}
