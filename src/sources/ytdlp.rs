use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{AudioFormat, ExtractOptions, Extracted, ExtractorError, MediaExtractor, MediaInfo, PlaylistInfo};

/// Configuración del extractor yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpSettings {
    pub binary: String,
    pub cookies: Option<PathBuf>,
    pub timeout: Duration,
    pub max_playlist_size: usize,
    /// Invocaciones simultáneas permitidas
    pub concurrency: usize,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            cookies: None,
            timeout: Duration::from_secs(60),
            max_playlist_size: 100,
            concurrency: 3,
        }
    }
}

/// Cliente que resuelve consultas ejecutando yt-dlp
pub struct YtDlpExtractor {
    settings: YtDlpSettings,
    // Limitar procesos concurrentes para evitar rate limiting
    permits: Arc<Semaphore>,
}

/// Información extraída de yt-dlp (`--dump-single-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
    #[serde(default)]
    entries: Vec<Option<YtDlpInfo>>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: Option<String>,
    url: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl YtDlpExtractor {
    pub fn new(settings: YtDlpSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        Self { settings, permits }
    }

    /// Verifica que yt-dlp esté disponible y devuelve su versión
    pub async fn verify_installation(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.settings.binary)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse correctamente");
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp versión: {}", version);
        Ok(version)
    }

    fn build_args(&self, query: &str, options: ExtractOptions) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--dump-single-json".into(),
            "--no-warnings".into(),
            "--quiet".into(),
            "--format".into(),
            "bestaudio[acodec=opus]/bestaudio/best".into(),
            "--socket-timeout".into(),
            "15".into(),
        ];

        if options.single_track {
            args.push("--no-playlist".into());
        } else {
            args.push("--yes-playlist".into());
            args.push("--playlist-end".into());
            args.push(self.settings.max_playlist_size.to_string());
        }

        if options.flat {
            args.push("--flat-playlist".into());
        }

        if let Some(cookies) = &self.settings.cookies {
            args.push("--cookies".into());
            args.push(cookies.display().to_string());
        }

        args.push("--".into());
        args.push(query.to_string());
        args
    }

    async fn run(&self, query: &str, options: ExtractOptions) -> Result<Vec<u8>, ExtractorError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ExtractorError::new("extractor cerrado"))?;

        debug!("📊 yt-dlp {:?} -> {}", options, query);

        let mut command = Command::new(&self.settings.binary);
        command.args(self.build_args(query, options)).kill_on_drop(true);

        let output = tokio::time::timeout(self.settings.timeout, command.output())
            .await
            .map_err(|_| {
                ExtractorError::new(format!(
                    "network error: yt-dlp timed out after {}s",
                    self.settings.timeout.as_secs()
                ))
            })?
            .map_err(|e| ExtractorError::new(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("❌ yt-dlp falló para {}: {}", query, stderr);
            return Err(ExtractorError::new(if stderr.is_empty() {
                format!("yt-dlp terminó con estado {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn extract(
        &self,
        query: &str,
        options: ExtractOptions,
    ) -> Result<Extracted, ExtractorError> {
        let stdout = self.run(query, options).await?;
        parse_dump(&stdout)
    }
}

/// Convierte la salida JSON de yt-dlp al modelo interno
fn parse_dump(stdout: &[u8]) -> Result<Extracted, ExtractorError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)
        .map_err(|e| ExtractorError::new(format!("Error al parsear respuesta de yt-dlp: {}", e)))?;

    let is_playlist = matches!(info.kind.as_deref(), Some("playlist" | "multi_video"))
        || !info.entries.is_empty();

    if is_playlist {
        Ok(Extracted::Playlist(PlaylistInfo {
            title: info.title,
            entries: info.entries.into_iter().flatten().map(into_media).collect(),
        }))
    } else {
        Ok(Extracted::Track(into_media(info)))
    }
}

fn into_media(info: YtDlpInfo) -> MediaInfo {
    MediaInfo {
        title: info.title,
        duration: info.duration,
        webpage_url: info.webpage_url,
        url: info.url,
        formats: info
            .formats
            .into_iter()
            .filter_map(|f| {
                Some(AudioFormat {
                    format_id: f.format_id,
                    url: f.url?,
                    acodec: f.acodec,
                    vcodec: f.vcodec,
                    abr: f.abr,
                    http_headers: f.http_headers,
                })
            })
            .collect(),
        http_headers: info.http_headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_single_video() {
        let json = br#"{
            "id": "abc",
            "title": "Song",
            "duration": 215.4,
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "url": "https://rr1.googlevideo.com/stream",
            "http_headers": {"User-Agent": "UA"},
            "formats": [
                {"format_id": "251", "url": "https://cdn/251", "acodec": "opus", "vcodec": "none", "abr": 160.0},
                {"format_id": "sb0", "acodec": "none", "vcodec": "none"}
            ]
        }"#;

        let Extracted::Track(info) = parse_dump(json).expect("json válido") else {
            panic!("se esperaba un track");
        };

        assert_eq!(info.title.as_deref(), Some("Song"));
        assert_eq!(info.metadata().duration, 215);
        assert_eq!(info.reference().as_deref(), Some("https://www.youtube.com/watch?v=abc"));
        // El formato sin URL se descarta
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.formats[0].format_id.as_deref(), Some("251"));
        assert_eq!(info.http_headers.get("User-Agent").map(String::as_str), Some("UA"));
    }

    #[test]
    fn parses_flat_playlist_and_skips_null_entries() {
        let json = br#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"_type": "url", "title": "One", "url": "https://www.youtube.com/watch?v=1"},
                null,
                {"_type": "url", "title": "Two", "url": "https://www.youtube.com/watch?v=2", "duration": 60}
            ]
        }"#;

        let Extracted::Playlist(playlist) = parse_dump(json).expect("json válido") else {
            panic!("se esperaba una playlist");
        };

        let refs: Vec<_> = playlist.playable_entries().map(|(r, _)| r).collect();
        assert_eq!(
            refs,
            vec![
                "https://www.youtube.com/watch?v=1".to_string(),
                "https://www.youtube.com/watch?v=2".to_string()
            ]
        );
    }

    #[test]
    fn invalid_output_is_an_extractor_error() {
        assert!(parse_dump(b"not json").is_err());
    }

    #[test]
    fn args_respect_options() {
        let extractor = YtDlpExtractor::new(YtDlpSettings {
            cookies: Some(PathBuf::from("/tmp/cookies.txt")),
            max_playlist_size: 25,
            ..YtDlpSettings::default()
        });

        let single = extractor.build_args("https://x", ExtractOptions::single());
        assert!(single.contains(&"--no-playlist".to_string()));
        assert!(!single.contains(&"--flat-playlist".to_string()));

        let browse = extractor.build_args("https://x", ExtractOptions::browse());
        assert!(browse.contains(&"--flat-playlist".to_string()));
        assert!(browse.windows(2).any(|w| w[0] == "--playlist-end" && w[1] == "25"));
        assert!(browse.windows(2).any(|w| w[0] == "--cookies" && w[1] == "/tmp/cookies.txt"));
        assert_eq!(browse.last().map(String::as_str), Some("https://x"));
    }
}
