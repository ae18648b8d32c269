use async_trait::async_trait;
use regex::Regex;
use std::{collections::HashMap, sync::LazyLock, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

use super::{is_apple_music_url, is_spotify_url, youtube};

/// User-Agent de navegador; los servicios devuelven páginas vacías a clientes desconocidos
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

static OG_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:title" content="([^"]+)""#).expect("regex og:title válida")
});

static OG_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta property="og:description" content="([^"]+)""#)
        .expect("regex og:description válida")
});

static MUSICIAN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<meta property="music:musician" content="[^"]+">.*?<meta property="music:musician_name" content="([^"]+)""#,
    )
    .expect("regex music:musician_name válida")
});

static SONG_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" - song by .*$").expect("regex de sufijo válida"));

static APPLE_ARTIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Song · (.+)").expect("regex de artista válida"));

static SPOTIFY_TITLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<title>(.*?) \| Spotify</title>").expect("regex de <title> válida")
});

#[derive(Debug, Error)]
pub enum PageFetchError {
    #[error("HTTP request failed: {0}")]
    Request(String),
}

/// Respuesta HTTP mínima
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// Capacidad externa de descarga de páginas
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Result<PageResponse, PageFetchError>;
}

/// Implementación sobre reqwest con timeout corto
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Cliente compartido; songbird lo reutiliza para los streams HTTP
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(
        &self,
        url: &str,
        headers: HashMap<String, String>,
    ) -> Result<PageResponse, PageFetchError> {
        let mut request = self.client.get(url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PageFetchError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PageFetchError::Request(e.to_string()))?;

        Ok(PageResponse { status, body })
    }
}

/// Pistas extraídas de la página de un servicio de streaming.
/// Todos los campos vacíos significa "sin información".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageHints {
    pub artist: String,
    pub title: String,
    pub search_phrase: String,
}

impl PageHints {
    fn phrase_only(search_phrase: String) -> Self {
        Self {
            search_phrase,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search_phrase.trim().is_empty()
    }
}

fn browser_headers() -> HashMap<String, String> {
    HashMap::from([("User-Agent".to_string(), BROWSER_USER_AGENT.to_string())])
}

/// GET que solo devuelve el cuerpo con estado 200; cualquier otro resultado es `None`
async fn fetch_ok(fetcher: &dyn PageFetcher, url: &str) -> Option<String> {
    match fetcher.get(url, browser_headers()).await {
        Ok(response) if response.status == 200 => Some(response.body),
        Ok(response) => {
            debug!("🌐 {} respondió {}", url, response.status);
            None
        }
        Err(e) => {
            warn!("⚠️ Error al obtener {}: {}", url, e);
            None
        }
    }
}

/// Extrae artista/título de una página de Spotify, Apple Music o YouTube Music.
/// Nunca falla: sin coincidencias devuelve campos vacíos.
pub async fn extract_page_hints(fetcher: &dyn PageFetcher, url: &str) -> PageHints {
    // YouTube Music con video ID no necesita scraping
    if url.to_lowercase().contains("music.youtube.com") {
        if let Some(video_id) = youtube::watch_video_id(url) {
            return PageHints::phrase_only(youtube::watch_url(&video_id));
        }
    }

    let Some(body) = fetch_ok(fetcher, url).await else {
        return PageHints::default();
    };

    parse_page(url, &body)
}

fn parse_page(url: &str, body: &str) -> PageHints {
    let lowered = url.to_lowercase();
    let Some(title) = capture(&OG_TITLE, body) else {
        return PageHints::default();
    };

    if is_spotify_url(&lowered) {
        let artist = capture(&MUSICIAN_NAME, body).unwrap_or_default();
        let title = SONG_BY.replace(&title, "").into_owned();
        let search_phrase = format!("{} - {} audio", artist, title);
        PageHints {
            artist,
            title,
            search_phrase,
        }
    } else if is_apple_music_url(&lowered) {
        let artist = capture(&OG_DESCRIPTION, body)
            .and_then(|description| capture(&APPLE_ARTIST, &description))
            .unwrap_or_default();
        let search_phrase = format!("{} {} audio", artist, title);
        PageHints {
            artist,
            title,
            search_phrase,
        }
    } else if lowered.contains("music.youtube.com") {
        let search_phrase = format!("{} audio", title);
        PageHints {
            artist: String::new(),
            title,
            search_phrase,
        }
    } else {
        PageHints::default()
    }
}

/// Reintento para `spotify.com/track/{id}`: página canónica y su etiqueta `<title>`
pub async fn spotify_title_from_canonical(fetcher: &dyn PageFetcher, url: &str) -> Option<String> {
    let track_id = spotify_track_id(url)?;
    let canonical = format!("https://open.spotify.com/track/{}", track_id);
    let body = fetch_ok(fetcher, &canonical).await?;
    capture(&SPOTIFY_TITLE_TAG, &body).filter(|t| !t.trim().is_empty())
}

pub fn spotify_track_id(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("spotify.com/track/")?;
    let id = rest.split(['?', '#', '/']).next()?;
    (!id.is_empty()).then_some(id)
}

/// Frase derivada del último segmento de la ruta de la URL
pub fn phrase_from_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();

    // Apple Music: /us/song/nombre-de-la-cancion/123456 ; preferir el slug con guiones
    let slug = segments
        .iter()
        .rev()
        .find(|s| s.contains('-'))
        .or_else(|| segments.last())?;

    let phrase = slug.replace(['-', '_', '+'], " ");
    let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    (!phrase.is_empty()).then_some(phrase)
}

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_html(m.as_str().trim()))
}

fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
