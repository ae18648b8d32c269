use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static WATCH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"watch\?v=([a-zA-Z0-9_-]+)").expect("regex de video ID válida"));

/// URL canónica de reproducción para un video ID
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Extrae el video ID de un parámetro `watch?v=` presente en la URL
pub fn watch_video_id(url: &str) -> Option<String> {
    WATCH_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extrae video ID de URL de YouTube (forma larga o corta)
pub fn extract_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    // youtu.be/VIDEO_ID
    if parsed.host_str() == Some("youtu.be") {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }

    // youtube.com/watch?v=VIDEO_ID
    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// Convierte enlaces cortos (youtu.be) a la forma larga canónica.
/// Cualquier otra entrada se devuelve tal cual.
pub fn normalize_short_link(query: &str) -> String {
    if !query.contains("youtu.be/") {
        return query.to_string();
    }

    match extract_video_id(query) {
        Some(video_id) => watch_url(&video_id),
        None => query.to_string(),
    }
}
