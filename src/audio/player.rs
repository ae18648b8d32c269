use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serenity::model::id::GuildId;
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::sequencer::SequencerEvent;

/// Identificador de cada entrega al reproductor; descarta eventos de fin obsoletos
pub type PlayToken = u64;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackFailure {
    #[error("invalid stream: {0}")]
    InvalidStream(String),
    #[error("player rejected the stream: {0}")]
    Rejected(String),
    #[error("no active voice connection")]
    NotConnected,
}

/// Recurso reproducible: URL directa del stream y las cabeceras con que pedirla
#[derive(Debug, Clone)]
pub struct StreamHandle {
    url: String,
    headers: HeaderMap,
}

impl StreamHandle {
    pub fn new(url: &str, headers: &HashMap<String, String>) -> Result<Self, PlaybackFailure> {
        let parsed = url::Url::parse(url)
            .map_err(|e| PlaybackFailure::InvalidStream(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PlaybackFailure::InvalidStream(format!(
                "esquema no soportado: {}",
                parsed.scheme()
            )));
        }

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            // Cabeceras inválidas se ignoran; el stream suele funcionar sin ellas
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    header_map.insert(name, value);
                }
                _ => debug!("Cabecera ignorada: {}", name),
            }
        }

        Ok(Self {
            url: parsed.into(),
            headers: header_map,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Aviso de fin de reproducción. Cruza del contexto del reproductor al del
/// secuenciador como mensaje; nunca toca el estado compartido directamente.
#[derive(Debug, Clone)]
pub struct FinishSignal {
    guild_id: GuildId,
    token: PlayToken,
    events: mpsc::UnboundedSender<SequencerEvent>,
}

impl FinishSignal {
    pub fn new(
        guild_id: GuildId,
        token: PlayToken,
        events: mpsc::UnboundedSender<SequencerEvent>,
    ) -> Self {
        Self {
            guild_id,
            token,
            events,
        }
    }

    pub fn finish(&self, error: Option<String>) {
        let event = SequencerEvent::PlaybackFinished {
            guild_id: self.guild_id,
            token: self.token,
            error,
        };
        if self.events.send(event).is_err() {
            warn!("⚠️ Secuenciador detenido; fin de reproducción descartado");
        }
    }
}

/// Reproductor externo de una guild
#[async_trait]
pub trait PlayerSink: Send + Sync {
    async fn play(&self, stream: &StreamHandle, on_finished: FinishSignal)
        -> Result<(), PlaybackFailure>;
    async fn stop(&self);
    async fn pause(&self);
    async fn resume(&self);
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
    async fn is_connected(&self) -> bool;
    async fn disconnect(&self);
}

/// Reproductor sobre la llamada de voz de Songbird
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    client: reqwest::Client,
    volume: f32,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        client: reqwest::Client,
        volume: f32,
    ) -> Self {
        Self {
            manager,
            guild_id,
            client,
            volume: volume.clamp(0.0, 2.0),
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let track = self.current()?;
        track.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl PlayerSink for SongbirdSink {
    async fn play(
        &self,
        stream: &StreamHandle,
        on_finished: FinishSignal,
    ) -> Result<(), PlaybackFailure> {
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or(PlaybackFailure::NotConnected)?;

        let input = HttpRequest::new_with_headers(
            self.client.clone(),
            stream.url().to_string(),
            stream.headers().clone(),
        );

        let track_handle = {
            let mut handler = call.lock().await;
            if handler.current_channel().is_none() {
                return Err(PlaybackFailure::NotConnected);
            }
            handler.play_only_input(input.into())
        };

        let _ = track_handle.set_volume(self.volume);

        let handler = TrackEndHandler {
            signal: on_finished,
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            track_handle
                .add_event(Event::Track(event), handler.clone())
                .map_err(|e| PlaybackFailure::Rejected(e.to_string()))?;
        }

        *self.current.lock() = Some(track_handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(track) = self.current.lock().take() {
            let _ = track.stop();
        }
    }

    async fn pause(&self) {
        if let Some(track) = self.current() {
            let _ = track.pause();
            info!("⏸️ Reproducción pausada");
        }
    }

    async fn resume(&self) {
        if let Some(track) = self.current() {
            let _ = track.play();
            info!("▶️ Reproducción reanudada");
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn is_connected(&self) -> bool {
        match self.manager.get(self.guild_id) {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn disconnect(&self) {
        self.current.lock().take();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Desconexión de guild {}: {:?}", self.guild_id, e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }
}

/// Handler para cuando termina (o falla) una canción
#[derive(Clone)]
struct TrackEndHandler {
    signal: FinishSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        match &error {
            Some(e) => error!("❌ Error de reproducción: {}", e),
            None => debug!("Track terminado, avanzando la cola..."),
        }

        self.signal.finish(error);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_handle_requires_http_url() {
        assert!(StreamHandle::new("https://cdn.example/a.webm", &HashMap::new()).is_ok());
        assert!(matches!(
            StreamHandle::new("file:///etc/passwd", &HashMap::new()),
            Err(PlaybackFailure::InvalidStream(_))
        ));
        assert!(matches!(
            StreamHandle::new("not a url", &HashMap::new()),
            Err(PlaybackFailure::InvalidStream(_))
        ));
    }

    #[test]
    fn stream_handle_keeps_valid_headers() {
        let headers = HashMap::from([
            ("User-Agent".to_string(), "Mozilla/5.0".to_string()),
            ("Bad Header".to_string(), "x".to_string()),
        ]);
        let handle = StreamHandle::new("https://cdn.example/a", &headers).expect("url válida");

        assert_eq!(handle.headers().len(), 1);
        assert_eq!(
            handle.headers().get("user-agent").and_then(|v| v.to_str().ok()),
            Some("Mozilla/5.0")
        );
    }

    #[tokio::test]
    async fn finish_signal_carries_guild_and_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signal = FinishSignal::new(GuildId::new(7), 3, tx);

        signal.finish(Some("decode error".to_string()));

        match rx.recv().await {
            Some(SequencerEvent::PlaybackFinished {
                guild_id,
                token,
                error,
            }) => {
                assert_eq!(guild_id, GuildId::new(7));
                assert_eq!(token, 3);
                assert_eq!(error.as_deref(), Some("decode error"));
            }
            other => panic!("evento inesperado: {:?}", other),
        }
    }
}
