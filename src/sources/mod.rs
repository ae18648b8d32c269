//! # Sources Module
//!
//! Turns whatever the user typed into something the player can stream.
//!
//! - [`MediaExtractor`] is the boundary to the metadata/stream extractor
//!   (yt-dlp in production, see [`ytdlp`]).
//! - [`resolver::TrackResolver`] orchestrates a full resolution: short-link
//!   normalization, streaming-service detection, classification of failures
//!   and the DRM fallback.
//! - [`page_hints`] scrapes streaming-service pages for an artist/title hint.
//! - [`alternative`] searches for a playable stand-in for an unplayable link.

pub mod alternative;
pub mod failure;
pub mod page_hints;
pub mod resolver;
pub mod youtube;
pub mod ytdlp;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub use failure::{FailureKind, ResolutionFailure};

/// Identidad de un track: su URL. Clave de la cola y de ambos caches.
pub type TrackRef = String;

/// Metadata de un track resuelto
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    /// Segundos; 0 = desconocida
    pub duration: u64,
    pub url: Option<String>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, duration: u64, url: Option<String>) -> Self {
        Self {
            title: title.into(),
            duration,
            url,
        }
    }

    /// Duración como `m:ss`, `None` si es desconocida
    pub fn duration_label(&self) -> Option<String> {
        (self.duration > 0).then(|| format_duration(self.duration))
    }
}

pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Opciones de extracción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Desactiva la expansión de playlists (`--no-playlist`)
    pub single_track: bool,
    /// Metadata plana de las entradas de playlist, sin resolver sus streams
    pub flat: bool,
}

impl ExtractOptions {
    /// Resolución inicial de una consulta: playlists permitidas, entradas planas
    pub const fn browse() -> Self {
        Self {
            single_track: false,
            flat: true,
        }
    }

    /// Resolución completa de un único track, con formatos y URL de stream
    pub const fn single() -> Self {
        Self {
            single_track: true,
            flat: false,
        }
    }

    /// Búsqueda de un único resultado, sin resolver su stream
    pub const fn search() -> Self {
        Self {
            single_track: true,
            flat: true,
        }
    }
}

/// Error crudo del extractor; su texto alimenta la clasificación
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ExtractorError {
    pub message: String,
}

impl ExtractorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Codificación disponible para un track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioFormat {
    pub format_id: Option<String>,
    pub url: String,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    /// kbps
    pub abr: Option<f64>,
    pub http_headers: HashMap<String, String>,
}

impl AudioFormat {
    pub fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(codec) if codec != "none")
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && matches!(self.vcodec.as_deref(), Some("none"))
    }
}

/// Información de un único medio devuelta por el extractor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
    /// URL de la página (identidad canónica)
    pub webpage_url: Option<String>,
    /// URL directa del stream elegido, o URL de la entrada en modo plano
    pub url: Option<String>,
    pub formats: Vec<AudioFormat>,
    pub http_headers: HashMap<String, String>,
}

impl MediaInfo {
    /// Referencia utilizable para la cola: `webpage_url` o, si falta, `url`
    pub fn reference(&self) -> Option<TrackRef> {
        self.webpage_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    }

    pub fn title_or_unknown(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn metadata(&self) -> TrackMetadata {
        TrackMetadata {
            title: self.title_or_unknown(),
            duration: self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            url: self.reference(),
        }
    }

    /// Mejor codificación con audio por bitrate; prefiere las de solo audio
    pub fn best_audio_format(&self) -> Option<&AudioFormat> {
        let by_bitrate = |a: &&AudioFormat, b: &&AudioFormat| {
            a.abr
                .unwrap_or(0.0)
                .partial_cmp(&b.abr.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        };

        self.formats
            .iter()
            .filter(|f| f.is_audio_only())
            .max_by(by_bitrate)
            .or_else(|| self.formats.iter().filter(|f| f.has_audio()).max_by(by_bitrate))
    }
}

/// Playlist devuelta por el extractor, con sus entradas en orden
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistInfo {
    pub title: Option<String>,
    pub entries: Vec<MediaInfo>,
}

impl PlaylistInfo {
    /// Entradas con una referencia utilizable, en orden
    pub fn playable_entries(&self) -> impl Iterator<Item = (TrackRef, &MediaInfo)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.reference().map(|r| (r, entry)))
    }
}

/// Resultado del extractor: un track o una playlist
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Track(MediaInfo),
    Playlist(PlaylistInfo),
}

/// Capacidad externa que convierte una consulta en metadata y/o stream
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn extract(
        &self,
        query: &str,
        options: ExtractOptions,
    ) -> Result<Extracted, ExtractorError>;
}

/// Tipo de consulta recibida en /play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Enlace de Spotify o Apple Music (sin extracción directa posible)
    StreamingService,
    Url,
    Search,
}

impl QueryKind {
    pub fn of(query: &str) -> Self {
        if is_streaming_service_url(query) {
            QueryKind::StreamingService
        } else if is_url(query) {
            QueryKind::Url
        } else {
            QueryKind::Search
        }
    }
}

pub fn is_url(query: &str) -> bool {
    query.starts_with("http://") || query.starts_with("https://")
}

pub fn is_spotify_url(query: &str) -> bool {
    query.to_lowercase().contains("spotify.com")
}

pub fn is_apple_music_url(query: &str) -> bool {
    query.to_lowercase().contains("music.apple.com")
}

pub fn is_streaming_service_url(query: &str) -> bool {
    is_spotify_url(query) || is_apple_music_url(query)
}

/// Indica si la consulta parece una playlist
pub fn looks_like_playlist(query: &str) -> bool {
    query.contains("playlist") || query.contains("list=")
}
