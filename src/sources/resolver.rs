use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    alternative::AlternativeSearch,
    looks_like_playlist,
    page_hints::{self, PageFetcher},
    youtube, ExtractOptions, Extracted, FailureKind, MediaExtractor, MediaInfo, QueryKind,
    ResolutionFailure, TrackMetadata, TrackRef,
};
use crate::notify::Notifier;

/// Track listo para encolar
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub reference: TrackRef,
    pub metadata: TrackMetadata,
}

impl ResolvedTrack {
    fn from_media(info: &MediaInfo) -> Option<Self> {
        let reference = info.reference()?;
        Some(Self {
            metadata: TrackMetadata {
                url: Some(reference.clone()),
                ..info.metadata()
            },
            reference,
        })
    }
}

/// Playlist resuelta: solo la primera entrada se resuelve de inmediato
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlaylist {
    /// Consulta a registrar para la expansión en segundo plano
    pub query: String,
    pub title: Option<String>,
    pub first: Option<ResolvedTrack>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Track(ResolvedTrack),
    Playlist(ResolvedPlaylist),
}

/// Orquesta la resolución de una consulta de /play, incluida la cadena de fallback
pub struct TrackResolver {
    extractor: Arc<dyn MediaExtractor>,
    fetcher: Arc<dyn PageFetcher>,
    alternative: Arc<dyn AlternativeSearch>,
}

impl TrackResolver {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        fetcher: Arc<dyn PageFetcher>,
        alternative: Arc<dyn AlternativeSearch>,
    ) -> Self {
        Self {
            extractor,
            fetcher,
            alternative,
        }
    }

    /// Resuelve la consulta. Los avisos de progreso se envían a `progress`.
    pub async fn resolve(
        &self,
        query: &str,
        progress: &dyn Notifier,
    ) -> Result<Resolution, ResolutionFailure> {
        let query = query.trim();
        let mut search = false;

        let target = match QueryKind::of(query) {
            QueryKind::StreamingService => {
                progress
                    .notify("🔄 Processing link... Searching for alternative source...".to_string())
                    .await;
                let alternative = self.alternative.find_alternative(query).await;
                if alternative.found {
                    progress.notify(format!("✅ {}", alternative.message)).await;
                    alternative.url
                } else {
                    let hints = page_hints::extract_page_hints(self.fetcher.as_ref(), query).await;
                    if hints.is_empty() {
                        return Err(ResolutionFailure::new(
                            FailureKind::Unknown,
                            "Could not extract song information",
                        ));
                    }
                    progress
                        .notify(format!("🔍 Searching for: {}", hints.title))
                        .await;
                    search = true;
                    format!("ytsearch1:{}", hints.search_phrase)
                }
            }
            QueryKind::Search => {
                progress.notify(format!("🔍 Searching for: {}", query)).await;
                search = true;
                format!("ytsearch1:{}", query)
            }
            QueryKind::Url => youtube::normalize_short_link(query),
        };

        if !search && looks_like_playlist(&target) {
            progress
                .notify("Processing playlist... This might take a moment.".to_string())
                .await;
        }

        let options = if search {
            ExtractOptions::search()
        } else {
            ExtractOptions::browse()
        };

        debug!("🔎 Resolviendo '{}' como '{}'", query, target);

        match self.extractor.extract(&target, options).await {
            Ok(extracted) => Self::into_resolution(target, extracted, search),
            Err(e) => {
                let failure = ResolutionFailure::from_raw(e.message);
                warn!("❌ Falló la resolución de '{}' ({})", target, failure.kind);

                if failure.kind == FailureKind::DrmProtected {
                    return self.drm_fallback(&target, failure, progress).await;
                }
                Err(failure)
            }
        }
    }

    async fn drm_fallback(
        &self,
        target: &str,
        failure: ResolutionFailure,
        progress: &dyn Notifier,
    ) -> Result<Resolution, ResolutionFailure> {
        progress
            .notify("🔄 DRM protection detected. Searching for alternative source...".to_string())
            .await;

        let alternative = self.alternative.find_alternative(target).await;
        if !alternative.found {
            info!("🔒 Sin alternativa para contenido con DRM: {}", alternative.message);
            return Err(failure);
        }

        match self
            .extractor
            .extract(&alternative.url, ExtractOptions::search())
            .await
        {
            Ok(extracted) => {
                let track = match extracted {
                    Extracted::Track(info) => ResolvedTrack::from_media(&info),
                    Extracted::Playlist(playlist) => playlist
                        .entries
                        .iter()
                        .find_map(ResolvedTrack::from_media),
                };

                match track {
                    Some(track) => {
                        progress.notify(format!("✅ {}", alternative.message)).await;
                        Ok(Resolution::Track(track))
                    }
                    None => Err(failure),
                }
            }
            Err(e) => {
                warn!("❌ Error al reproducir fuente alternativa: {}", e);
                Err(failure)
            }
        }
    }

    fn into_resolution(
        target: String,
        extracted: Extracted,
        search: bool,
    ) -> Result<Resolution, ResolutionFailure> {
        match extracted {
            // Una búsqueda devuelve una lista de resultados: solo interesa el primero
            Extracted::Playlist(playlist) if search => playlist
                .entries
                .iter()
                .find_map(ResolvedTrack::from_media)
                .map(Resolution::Track)
                .ok_or_else(|| {
                    ResolutionFailure::new(FailureKind::Unknown, "Could not find any playable audio!")
                }),
            Extracted::Playlist(playlist) => Ok(Resolution::Playlist(ResolvedPlaylist {
                first: playlist.entries.iter().find_map(ResolvedTrack::from_media),
                title: playlist.title,
                query: target,
            })),
            Extracted::Track(info) => ResolvedTrack::from_media(&info)
                .map(Resolution::Track)
                .ok_or_else(|| {
                    ResolutionFailure::new(FailureKind::Unknown, "Could not process the track!")
                }),
        }
    }
}
