use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    audio::{
        player::PlayerSink,
        preloader::{ExpansionReport, Preloader},
        queue::QueueStore,
        sequencer::{PauseOutcome, PlaybackSequencer, ResumeOutcome, SkipOutcome},
    },
    notify::Notifier,
    sources::resolver::{Resolution, TrackResolver},
    ui::{embeds, Card},
};

pub const NOT_PLAYING: &str = "Not playing any music!";

/// Respuesta a un comando: texto simple o tarjeta estructurada
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Card(Card),
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Reply::Text(message.into())
    }
}

/// Resultado de /play. La expansión de playlist sigue en segundo plano.
pub struct PlayResponse {
    pub reply: Reply,
    pub expansion: Option<JoinHandle<ExpansionReport>>,
}

impl PlayResponse {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            expansion: None,
        }
    }
}

/// Operaciones de los comandos de música, sin dependencia del gateway
pub struct MusicController {
    store: Arc<QueueStore>,
    resolver: Arc<TrackResolver>,
    preloader: Arc<Preloader>,
    sequencer: Arc<PlaybackSequencer>,
    preload_ahead: usize,
}

impl MusicController {
    pub fn new(
        store: Arc<QueueStore>,
        resolver: Arc<TrackResolver>,
        preloader: Arc<Preloader>,
        sequencer: Arc<PlaybackSequencer>,
        preload_ahead: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            preloader,
            sequencer,
            preload_ahead,
        }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn sequencer(&self) -> &Arc<PlaybackSequencer> {
        &self.sequencer
    }

    /// Registra la conexión de voz recién establecida
    pub fn attach(&self, guild_id: GuildId, sink: Arc<dyn PlayerSink>, notifier: Arc<dyn Notifier>) {
        self.sequencer.attach(guild_id, sink, notifier);
    }

    /// Resuelve la consulta y la encola. Los avisos intermedios van a `progress`.
    pub async fn play(
        &self,
        guild_id: GuildId,
        query: &str,
        progress: Arc<dyn Notifier>,
    ) -> PlayResponse {
        let resolution = match self.resolver.resolve(query, progress.as_ref()).await {
            Ok(resolution) => resolution,
            Err(failure) => {
                info!("❌ /play '{}' falló en guild {}: {}", query, guild_id, failure);
                return PlayResponse::reply(Reply::text(failure.user_message()));
            }
        };

        match resolution {
            Resolution::Track(track) => {
                self.store
                    .set_metadata(guild_id, track.reference.clone(), track.metadata.clone());
                self.store.append(guild_id, track.reference);
                self.preloader.preload_next(guild_id, self.preload_ahead);

                PlayResponse::reply(Reply::Card(embeds::create_track_added_card(&track.metadata)))
            }
            Resolution::Playlist(playlist) => {
                let Some(first) = playlist.first else {
                    return PlayResponse::reply(Reply::text("⚠️ No playable tracks found in playlist"));
                };

                self.store
                    .set_metadata(guild_id, first.reference.clone(), first.metadata.clone());
                self.store.append(guild_id, first.reference);
                self.store.add_pending_playlist(guild_id, playlist.query);

                let expansion = self.spawn_expansion(guild_id, progress);
                PlayResponse {
                    reply: Reply::Card(embeds::create_playlist_added_card(&[first.metadata.title])),
                    expansion: Some(expansion),
                }
            }
        }
    }

    /// Expande las playlists pendientes y, si se agregaron canciones con el
    /// reproductor inactivo, reanuda el avance
    fn spawn_expansion(
        &self,
        guild_id: GuildId,
        notifier: Arc<dyn Notifier>,
    ) -> JoinHandle<ExpansionReport> {
        let expansion = self.preloader.expand_pending_playlists(guild_id, notifier);
        let sequencer = self.sequencer.clone();

        tokio::spawn(async move {
            match expansion.await {
                Ok(report) => {
                    if !report.appended.is_empty() {
                        sequencer.play_next(guild_id).await;
                    }
                    report
                }
                Err(e) => {
                    error!("❌ La expansión de playlist terminó con error: {:?}", e);
                    ExpansionReport::default()
                }
            }
        })
    }

    /// Inicia la reproducción si la guild está inactiva
    pub async fn ensure_playing(&self, guild_id: GuildId) {
        self.sequencer.play_next(guild_id).await;
    }

    pub async fn skip(&self, guild_id: GuildId) -> Reply {
        match self.sequencer.skip(guild_id).await {
            SkipOutcome::Skipped => Reply::text("Skipped the current song"),
            SkipOutcome::NothingPlaying => Reply::text("No song is currently playing"),
            SkipOutcome::NotConnected => Reply::text(NOT_PLAYING),
        }
    }

    pub async fn stop(&self, guild_id: GuildId) -> Reply {
        if self.sequencer.stop(guild_id).await {
            Reply::text("Stopped playing and cleared the queue!")
        } else {
            Reply::text(NOT_PLAYING)
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Reply {
        match self.sequencer.pause(guild_id).await {
            PauseOutcome::Paused => Reply::text("Paused the music!"),
            PauseOutcome::AlreadyPaused => Reply::text("The music is already paused!"),
            PauseOutcome::NothingPlaying => Reply::text("No music is currently playing!"),
            PauseOutcome::NotConnected => Reply::text(NOT_PLAYING),
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> Reply {
        match self.sequencer.resume(guild_id).await {
            ResumeOutcome::Resumed => Reply::text("Resumed the music!"),
            ResumeOutcome::NotPaused => Reply::text("The music is not paused!"),
            ResumeOutcome::NotConnected => Reply::text(NOT_PLAYING),
        }
    }

    /// Tarjeta de la cola; nunca falla, las entradas sin metadata se muestran como "Loading..."
    pub fn show_queue(&self, guild_id: GuildId) -> Reply {
        let queue = self.store.get_queue(guild_id);
        let now_playing = self.sequencer.now_playing(guild_id).map(|np| np.metadata);
        let upcoming: Vec<_> = queue
            .iter()
            .take(embeds::QUEUE_PAGE_SIZE)
            .map(|reference| self.store.get_metadata(guild_id, reference))
            .collect();

        Reply::Card(embeds::create_queue_card(
            now_playing.as_ref(),
            &upcoming,
            queue.len(),
        ))
    }
}
