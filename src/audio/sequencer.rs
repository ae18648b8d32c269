use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        player::{FinishSignal, PlayToken, PlaybackFailure, PlayerSink},
        preloader::Preloader,
        queue::QueueStore,
    },
    notify::Notifier,
    sources::{TrackMetadata, TrackRef},
};

/// Mensajes que llegan al secuenciador desde el contexto del reproductor
#[derive(Debug)]
pub enum SequencerEvent {
    PlaybackFinished {
        guild_id: GuildId,
        token: PlayToken,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Started(TrackMetadata),
    QueueFinished,
    NotConnected,
    /// Ya hay un track en curso; el avance ocurre al terminar
    AlreadyPlaying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped,
    NothingPlaying,
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    AlreadyPaused,
    NothingPlaying,
    NotConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    NotPaused,
    NotConnected,
}

#[derive(Debug, Clone)]
pub struct SequencerSettings {
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub preload_ahead: usize,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            preload_ahead: 2,
        }
    }
}

/// Track entregado al reproductor
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub reference: TrackRef,
    pub metadata: TrackMetadata,
    pub token: PlayToken,
}

/// Conexión de voz activa de una guild y el canal de texto donde avisar
#[derive(Clone)]
struct Session {
    sink: Arc<dyn PlayerSink>,
    notifier: Arc<dyn Notifier>,
}

/// Máquina de estados por guild: Idle -> Playing -> (Idle | Playing)
pub struct PlaybackSequencer {
    store: Arc<QueueStore>,
    preloader: Arc<Preloader>,
    settings: SequencerSettings,
    sessions: DashMap<GuildId, Session>,
    now_playing: DashMap<GuildId, NowPlaying>,
    // Un avance a la vez por guild
    advance_locks: DashMap<GuildId, Arc<AsyncMutex<()>>>,
    next_token: AtomicU64,
    events: mpsc::UnboundedSender<SequencerEvent>,
}

enum Attempt {
    Started(TrackMetadata),
    /// La cabeza cambió mientras se resolvía (stop/skip): reevaluar la cola
    HeadChanged,
    Failed,
    NotConnected,
}

impl PlaybackSequencer {
    pub fn new(
        store: Arc<QueueStore>,
        preloader: Arc<Preloader>,
        settings: SequencerSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SequencerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sequencer = Arc::new(Self {
            store,
            preloader,
            settings,
            sessions: DashMap::new(),
            now_playing: DashMap::new(),
            advance_locks: DashMap::new(),
            next_token: AtomicU64::new(1),
            events,
        });
        (sequencer, receiver)
    }

    /// Registra (o reemplaza) la conexión de voz de una guild
    pub fn attach(&self, guild_id: GuildId, sink: Arc<dyn PlayerSink>, notifier: Arc<dyn Notifier>) {
        self.sessions.insert(guild_id, Session { sink, notifier });
        debug!("🔗 Sesión de voz registrada en guild {}", guild_id);
    }

    /// Actualiza el canal de texto donde se publican los avisos
    pub fn set_notifier(&self, guild_id: GuildId, notifier: Arc<dyn Notifier>) {
        if let Some(mut session) = self.sessions.get_mut(&guild_id) {
            session.notifier = notifier;
        }
    }

    pub fn is_attached(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<NowPlaying> {
        self.now_playing.get(&guild_id).map(|entry| entry.clone())
    }

    fn session(&self, guild_id: GuildId) -> Option<Session> {
        self.sessions.get(&guild_id).map(|session| session.clone())
    }

    fn advance_lock(&self, guild_id: GuildId) -> Arc<AsyncMutex<()>> {
        self.advance_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Bucle de eventos: procesa los fines de reproducción hasta la cancelación
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<SequencerEvent>,
        shutdown: CancellationToken,
    ) {
        info!("🎼 Secuenciador de reproducción iniciado");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        let sequencer = Arc::clone(&self);
                        tokio::spawn(async move { sequencer.handle_event(event).await });
                    }
                    None => break,
                },
            }
        }
        info!("🎼 Secuenciador de reproducción detenido");
    }

    pub async fn handle_event(&self, event: SequencerEvent) {
        match event {
            SequencerEvent::PlaybackFinished {
                guild_id,
                token,
                error,
            } => self.on_playback_finished(guild_id, token, error).await,
        }
    }

    async fn on_playback_finished(&self, guild_id: GuildId, token: PlayToken, error: Option<String>) {
        // Solo el track actual puede avanzar la cola; stop y eventos duplicados quedan obsoletos
        if self
            .now_playing
            .remove_if(&guild_id, |_, current| current.token == token)
            .is_none()
        {
            debug!("Evento de fin obsoleto (token {}) en guild {}", token, guild_id);
            return;
        }

        if let Some(error) = error {
            error!("❌ Error de reproducción en guild {}: {}", guild_id, error);
            if let Some(session) = self.session(guild_id) {
                session
                    .notifier
                    .notify("An error occurred during playback. Playing next song...".to_string())
                    .await;
            }
        }

        self.play_next(guild_id).await;
    }

    /// Reproduce la cabeza de la cola. Reintenta la misma cabeza hasta
    /// `max_attempts` veces antes de descartarla y pasar a la siguiente.
    pub async fn play_next(&self, guild_id: GuildId) -> AdvanceOutcome {
        let lock = self.advance_lock(guild_id);
        let _guard = lock.lock().await;

        if self.now_playing.contains_key(&guild_id) {
            return AdvanceOutcome::AlreadyPlaying;
        }

        let Some(session) = self.session(guild_id) else {
            return AdvanceOutcome::NotConnected;
        };
        if !session.sink.is_connected().await {
            return AdvanceOutcome::NotConnected;
        }

        'queue: loop {
            let Some(head) = self.store.head(guild_id) else {
                info!("🏁 Cola terminada en guild {}", guild_id);
                session.notifier.notify("Queue finished!".to_string()).await;
                return AdvanceOutcome::QueueFinished;
            };

            let mut attempts = 0;
            loop {
                attempts += 1;
                match self.attempt(guild_id, &head, &session).await {
                    Attempt::Started(metadata) => {
                        session
                            .notifier
                            .notify(format!("Now playing: {}", metadata.title))
                            .await;
                        self.preloader
                            .preload_next(guild_id, self.settings.preload_ahead);
                        return AdvanceOutcome::Started(metadata);
                    }
                    Attempt::HeadChanged => continue 'queue,
                    Attempt::NotConnected => return AdvanceOutcome::NotConnected,
                    Attempt::Failed if attempts >= self.settings.max_attempts => {
                        warn!(
                            "⏭️ Descartando {} tras {} intentos en guild {}",
                            head, attempts, guild_id
                        );
                        self.store.remove_head_if(guild_id, &head);
                        session
                            .notifier
                            .notify(format!(
                                "Failed to play track after {} attempts. Skipping...",
                                self.settings.max_attempts
                            ))
                            .await;
                        continue 'queue;
                    }
                    Attempt::Failed => {
                        debug!("🔁 Reintento {} para {}", attempts, head);
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }
    }

    async fn attempt(&self, guild_id: GuildId, head: &str, session: &Session) -> Attempt {
        let audio = self.preloader.preload(guild_id, head).await;

        // Un stop o una cola nueva mientras se resolvía invalida este resultado
        if self.store.head(guild_id).as_deref() != Some(head) {
            return Attempt::HeadChanged;
        }
        if !self.is_attached(guild_id) {
            return Attempt::NotConnected;
        }

        let Some(audio) = audio else {
            return Attempt::Failed;
        };

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let metadata = self
            .store
            .get_metadata(guild_id, head)
            .unwrap_or_else(|| audio.source.clone());

        self.now_playing.insert(
            guild_id,
            NowPlaying {
                reference: head.to_string(),
                metadata: metadata.clone(),
                token,
            },
        );

        let signal = FinishSignal::new(guild_id, token, self.events.clone());
        match session.sink.play(&audio.stream, signal).await {
            Ok(()) => {
                // stop() durante la entrega: el track ya no corresponde
                if self.now_playing.get(&guild_id).map(|np| np.token) != Some(token) {
                    session.sink.stop().await;
                    return Attempt::NotConnected;
                }
                self.store.remove_head_if(guild_id, head);
                info!("🎵 Reproduciendo: {}", metadata.title);
                Attempt::Started(metadata)
            }
            Err(failure) => {
                self.now_playing.remove_if(&guild_id, |_, np| np.token == token);
                match failure {
                    PlaybackFailure::NotConnected => Attempt::NotConnected,
                    other => {
                        warn!("⚠️ El reproductor rechazó {}: {}", head, other);
                        // El stream cacheado puede haber expirado
                        self.store.remove_audio(guild_id, head);
                        Attempt::Failed
                    }
                }
            }
        }
    }

    /// Detiene el track actual; su evento de fin avanza la cola
    pub async fn skip(&self, guild_id: GuildId) -> SkipOutcome {
        let Some(session) = self.session(guild_id) else {
            return SkipOutcome::NotConnected;
        };
        if !session.sink.is_playing().await {
            return SkipOutcome::NothingPlaying;
        }
        session.sink.stop().await;
        info!("⏭️ Track saltado en guild {}", guild_id);
        SkipOutcome::Skipped
    }

    /// Limpia la cola, detiene la reproducción y desconecta. Devuelve `false`
    /// si no había conexión de voz.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        self.store.clear(guild_id);
        self.now_playing.remove(&guild_id);
        session.sink.stop().await;
        session.sink.disconnect().await;

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        true
    }

    /// Limpieza tras una desconexión externa (el bot fue expulsado del canal)
    pub async fn detach(&self, guild_id: GuildId) {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            self.now_playing.remove(&guild_id);
            self.store.clear(guild_id);
            session.sink.stop().await;
            info!("🔌 Sesión liberada en guild {}", guild_id);
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> PauseOutcome {
        let Some(session) = self.session(guild_id) else {
            return PauseOutcome::NotConnected;
        };
        if session.sink.is_paused().await {
            return PauseOutcome::AlreadyPaused;
        }
        if !session.sink.is_playing().await {
            return PauseOutcome::NothingPlaying;
        }
        session.sink.pause().await;
        PauseOutcome::Paused
    }

    pub async fn resume(&self, guild_id: GuildId) -> ResumeOutcome {
        let Some(session) = self.session(guild_id) else {
            return ResumeOutcome::NotConnected;
        };
        if !session.sink.is_paused().await {
            return ResumeOutcome::NotPaused;
        }
        session.sink.resume().await;
        ResumeOutcome::Resumed
    }

    /// Guilds con sesión activa
    pub fn active_guilds(&self) -> usize {
        self.sessions.len()
    }
}
