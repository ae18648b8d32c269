use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    is_streaming_service_url, is_url,
    page_hints::{self, PageFetcher},
    ExtractOptions, Extracted, MediaExtractor, MediaInfo,
};

/// Resultado de la búsqueda de una fuente alternativa
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeResult {
    pub found: bool,
    pub url: String,
    pub message: String,
}

impl AlternativeResult {
    pub fn found(url: impl Into<String>, title: &str) -> Self {
        Self {
            found: true,
            url: url.into(),
            message: format!("Found alternative: {}", title),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            found: false,
            url: String::new(),
            message: message.into(),
        }
    }
}

/// Busca un sustituto reproducible para un enlace que no se puede extraer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlternativeSearch: Send + Sync {
    async fn find_alternative(&self, query: &str) -> AlternativeResult;
}

/// Variantes de búsqueda en orden de prioridad
pub fn search_variants(phrase: &str) -> [String; 3] {
    [
        format!("{} official audio", phrase),
        format!("{} lyrics", phrase),
        phrase.to_string(),
    ]
}

/// Búsqueda alternativa: pistas de la página, luego búsquedas por variantes
pub struct SearchFallback {
    extractor: Arc<dyn MediaExtractor>,
    fetcher: Arc<dyn PageFetcher>,
}

impl SearchFallback {
    pub fn new(extractor: Arc<dyn MediaExtractor>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { extractor, fetcher }
    }

    /// Frase de búsqueda para la consulta; vacía si no se pudo obtener nada
    async fn search_phrase(&self, query: &str) -> String {
        let hints = page_hints::extract_page_hints(self.fetcher.as_ref(), query).await;
        // Una frase sin título (p.ej. " - audio") no sirve para buscar
        if (!hints.is_empty() && !hints.title.trim().is_empty()) || is_url(&hints.search_phrase) {
            return hints.search_phrase;
        }

        if query.contains("spotify.com/track/") {
            if let Some(title) =
                page_hints::spotify_title_from_canonical(self.fetcher.as_ref(), query).await
            {
                debug!("🔎 Título desde página canónica de Spotify: {}", title);
                return title;
            }
        }

        if is_streaming_service_url(query) {
            if let Some(phrase) = page_hints::phrase_from_path(query) {
                debug!("🔎 Frase derivada de la URL: {}", phrase);
                return phrase;
            }
        }

        String::new()
    }

    /// Primer resultado con referencia utilizable
    async fn first_hit(&self, query: &str) -> Option<(String, String)> {
        let extracted = match self.extractor.extract(query, ExtractOptions::search()).await {
            Ok(extracted) => extracted,
            Err(e) => {
                debug!("🔎 Sin resultado para '{}': {}", query, e);
                return None;
            }
        };

        let first: Option<MediaInfo> = match extracted {
            Extracted::Track(info) => Some(info),
            Extracted::Playlist(playlist) => playlist.entries.into_iter().next(),
        };

        first.and_then(|info| info.reference().map(|url| (url, info.title_or_unknown())))
    }
}

#[async_trait]
impl AlternativeSearch for SearchFallback {
    async fn find_alternative(&self, query: &str) -> AlternativeResult {
        let phrase = self.search_phrase(query).await;
        if phrase.trim().is_empty() {
            warn!("⚠️ No se pudo extraer información de: {}", query);
            return AlternativeResult::not_found("Could not extract song information");
        }

        // YouTube Music ya entregó una URL canónica
        if is_url(&phrase) {
            if let Some((url, title)) = self.first_hit(&phrase).await {
                info!("✅ Alternativa encontrada: {}", title);
                return AlternativeResult::found(url, &title);
            }
            return AlternativeResult::not_found("Could not find an alternative source");
        }

        info!("🔍 Buscando alternativa: {}", phrase);
        for term in search_variants(&phrase) {
            if let Some((url, title)) = self.first_hit(&format!("ytsearch1:{}", term)).await {
                info!("✅ Alternativa encontrada: {}", title);
                return AlternativeResult::found(url, &title);
            }
        }

        warn!("❌ Ninguna variante produjo resultados para: {}", phrase);
        AlternativeResult::not_found("Could not find an alternative source")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{
        page_hints::{MockPageFetcher, PageResponse},
        ExtractorError, MockMediaExtractor, PlaylistInfo,
    };
    use mockall::{predicate::*, Sequence};
    use pretty_assertions::assert_eq;

    fn search_result(url: &str, title: &str) -> Extracted {
        Extracted::Playlist(PlaylistInfo {
            title: None,
            entries: vec![MediaInfo {
                title: Some(title.to_string()),
                url: Some(url.to_string()),
                ..MediaInfo::default()
            }],
        })
    }

    fn spotify_page() -> MockPageFetcher {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_get().returning(|_, _| {
            Ok(PageResponse {
                status: 200,
                body: r#"<meta property="og:title" content="Yellow - song by Coldplay">
                    <meta property="music:musician" content="a"><meta property="music:musician_name" content="Coldplay">"#
                    .to_string(),
            })
        });
        fetcher
    }

    #[tokio::test]
    async fn variants_are_tried_in_order_and_errors_are_swallowed() {
        let mut extractor = MockMediaExtractor::new();
        let mut seq = Sequence::new();
        extractor
            .expect_extract()
            .with(eq("ytsearch1:Coldplay - Yellow audio official audio"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ExtractorError::new("HTTP Error 429")));
        extractor
            .expect_extract()
            .with(eq("ytsearch1:Coldplay - Yellow audio lyrics"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Extracted::Playlist(PlaylistInfo::default())));
        extractor
            .expect_extract()
            .with(eq("ytsearch1:Coldplay - Yellow audio"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(search_result("https://www.youtube.com/watch?v=y", "Coldplay - Yellow")));

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(spotify_page()));
        let result = fallback.find_alternative("https://open.spotify.com/track/3AJ").await;

        assert_eq!(
            result,
            AlternativeResult {
                found: true,
                url: "https://www.youtube.com/watch?v=y".to_string(),
                message: "Found alternative: Coldplay - Yellow".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn first_successful_variant_wins() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .times(1)
            .returning(|_, _| Ok(search_result("https://www.youtube.com/watch?v=o", "Yellow (Official)")));

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(spotify_page()));
        let result = fallback.find_alternative("https://open.spotify.com/track/3AJ").await;

        assert!(result.found);
        assert_eq!(result.message, "Found alternative: Yellow (Official)");
    }

    #[tokio::test]
    async fn unreadable_page_falls_back_to_canonical_title() {
        let mut fetcher = MockPageFetcher::new();
        fetcher
            .expect_get()
            .with(eq("https://open.spotify.com/track/xyz?si=1"), always())
            .returning(|_, _| Ok(PageResponse { status: 403, body: String::new() }));
        fetcher
            .expect_get()
            .with(eq("https://open.spotify.com/track/xyz"), always())
            .returning(|_, _| {
                Ok(PageResponse {
                    status: 200,
                    body: "<title>Clocks | Spotify</title>".to_string(),
                })
            });

        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq("ytsearch1:Clocks official audio"), always())
            .times(1)
            .returning(|_, _| Ok(search_result("https://www.youtube.com/watch?v=c", "Clocks")));

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(fetcher));
        let result = fallback.find_alternative("https://open.spotify.com/track/xyz?si=1").await;

        assert_eq!(result.url, "https://www.youtube.com/watch?v=c");
    }

    #[tokio::test]
    async fn unreadable_canonical_page_falls_back_to_url_path() {
        let mut fetcher = MockPageFetcher::new();
        fetcher
            .expect_get()
            .with(eq("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv?si=1"), always())
            .times(1)
            .returning(|_, _| Ok(PageResponse { status: 403, body: String::new() }));
        fetcher
            .expect_get()
            .with(eq("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv"), always())
            .times(1)
            .returning(|_, _| Ok(PageResponse { status: 404, body: String::new() }));
        fetcher
            .expect_get()
            .with(eq("https://music.apple.com/us/song/bohemian-rhapsody/1440806041"), always())
            .times(1)
            .returning(|_, _| Ok(PageResponse { status: 500, body: String::new() }));

        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq("ytsearch1:4u7EnebtmKWzUH433cf5Qv official audio"), always())
            .times(1)
            .returning(|_, _| Ok(search_result("https://www.youtube.com/watch?v=s", "Spotify result")));
        extractor
            .expect_extract()
            .with(eq("ytsearch1:bohemian rhapsody official audio"), always())
            .times(1)
            .returning(|_, _| Ok(search_result("https://www.youtube.com/watch?v=b", "Bohemian Rhapsody")));

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(fetcher));

        let spotify = fallback
            .find_alternative("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv?si=1")
            .await;
        assert_eq!(spotify.url, "https://www.youtube.com/watch?v=s");

        // Apple Music: el slug con guiones de la ruta da la frase
        let apple = fallback
            .find_alternative("https://music.apple.com/us/song/bohemian-rhapsody/1440806041")
            .await;
        assert_eq!(
            apple,
            AlternativeResult::found("https://www.youtube.com/watch?v=b", "Bohemian Rhapsody")
        );
    }

    #[tokio::test]
    async fn nothing_to_search_for() {
        let mut fetcher = MockPageFetcher::new();
        fetcher
            .expect_get()
            .returning(|_, _| Ok(PageResponse { status: 500, body: String::new() }));
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract().never();

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(fetcher));
        let result = fallback.find_alternative("https://example.com/").await;

        assert_eq!(result, AlternativeResult::not_found("Could not extract song information"));
    }

    #[tokio::test]
    async fn exhausted_variants_report_failure() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .times(3)
            .returning(|_, _| Err(ExtractorError::new("no results")));

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(spotify_page()));
        let result = fallback.find_alternative("https://open.spotify.com/track/3AJ").await;

        assert!(!result.found);
        assert_eq!(result.message, "Could not find an alternative source");
    }

    #[tokio::test]
    async fn youtube_music_link_is_extracted_directly() {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_get().never();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq("https://www.youtube.com/watch?v=m1"), always())
            .times(1)
            .returning(|_, _| {
                Ok(Extracted::Track(MediaInfo {
                    title: Some("Song".to_string()),
                    webpage_url: Some("https://www.youtube.com/watch?v=m1".to_string()),
                    ..MediaInfo::default()
                }))
            });

        let fallback = SearchFallback::new(Arc::new(extractor), Arc::new(fetcher));
        let result = fallback.find_alternative("https://music.youtube.com/watch?v=m1").await;

        assert!(result.found);
        assert_eq!(result.url, "https://www.youtube.com/watch?v=m1");
    }
}
