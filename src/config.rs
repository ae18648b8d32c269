use anyhow::{Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{audio::sequencer::SequencerSettings, cache::CacheLimits, sources::ytdlp::YtDlpSettings};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,

    // Cache por guild
    pub cache_size: usize,
    pub audio_cache_size: usize,
    pub audio_cache_ttl: Duration,

    // Cola y reproducción
    pub max_playlist_size: usize,
    pub preload_ahead: usize,
    pub playlist_preload: usize,
    pub max_play_attempts: usize,
    pub retry_delay: Duration,

    // Resolución
    pub resolver_concurrency: usize,
    pub extractor_timeout: Duration,
    pub page_fetch_timeout: Duration,
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<PathBuf>,

    // Rendimiento
    pub worker_threads: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una fuente de variables arbitraria
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,

            cache_size: parse_or(var("CACHE_SIZE"), "CACHE_SIZE", defaults.cache_size)?,
            audio_cache_size: parse_or(var("AUDIO_CACHE_SIZE"), "AUDIO_CACHE_SIZE", defaults.audio_cache_size)?,
            audio_cache_ttl: duration_or(var("AUDIO_CACHE_TTL"), "AUDIO_CACHE_TTL", defaults.audio_cache_ttl)?,

            max_playlist_size: parse_or(var("MAX_PLAYLIST_SIZE"), "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            preload_ahead: parse_or(var("PRELOAD_AHEAD"), "PRELOAD_AHEAD", defaults.preload_ahead)?,
            playlist_preload: parse_or(var("PLAYLIST_PRELOAD"), "PLAYLIST_PRELOAD", defaults.playlist_preload)?,
            max_play_attempts: parse_or(var("MAX_PLAY_ATTEMPTS"), "MAX_PLAY_ATTEMPTS", defaults.max_play_attempts)?,
            retry_delay: duration_or(var("RETRY_DELAY"), "RETRY_DELAY", defaults.retry_delay)?,

            resolver_concurrency: parse_or(
                var("RESOLVER_CONCURRENCY"),
                "RESOLVER_CONCURRENCY",
                defaults.resolver_concurrency,
            )?,
            extractor_timeout: duration_or(var("EXTRACTOR_TIMEOUT"), "EXTRACTOR_TIMEOUT", defaults.extractor_timeout)?,
            page_fetch_timeout: duration_or(
                var("PAGE_FETCH_TIMEOUT"),
                "PAGE_FETCH_TIMEOUT",
                defaults.page_fetch_timeout,
            )?,
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: var("YTDLP_COOKIES").map(PathBuf::from),

            worker_threads: parse_or(var("WORKER_THREADS"), "WORKER_THREADS", defaults.worker_threads)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Cache sizes, attempts and concurrency must be greater than 0
    /// - The cookies file, when given, must exist
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.audio_cache_size == 0 {
            anyhow::bail!("Audio cache size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.max_play_attempts == 0 {
            anyhow::bail!("Max play attempts must be greater than 0");
        }

        if self.resolver_concurrency == 0 {
            anyhow::bail!("Resolver concurrency must be greater than 0");
        }

        if self.worker_threads == 0 {
            anyhow::bail!("Worker threads must be greater than 0");
        }

        if let Some(cookies) = &self.ytdlp_cookies {
            if !cookies.is_file() {
                anyhow::bail!("Cookies file not found: {}", cookies.display());
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Cache: {} metadata, {} audio (ttl {})\n  \
            Playback: {} attempts, retry {}, preload {} / playlist {}\n  \
            Resolver: {} ({} concurrent, timeout {}, cookies: {})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.cache_size,
            self.audio_cache_size,
            humantime::format_duration(self.audio_cache_ttl),
            self.max_play_attempts,
            humantime::format_duration(self.retry_delay),
            self.preload_ahead,
            self.playlist_preload,
            self.ytdlp_path,
            self.resolver_concurrency,
            humantime::format_duration(self.extractor_timeout),
            if self.ytdlp_cookies.is_some() { "yes" } else { "no" },
        )
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            metadata_entries: self.cache_size,
            audio_entries: self.audio_cache_size,
            audio_ttl: Some(self.audio_cache_ttl),
        }
    }

    pub fn ytdlp_settings(&self) -> YtDlpSettings {
        YtDlpSettings {
            binary: self.ytdlp_path.clone(),
            cookies: self.ytdlp_cookies.clone(),
            timeout: self.extractor_timeout,
            max_playlist_size: self.max_playlist_size,
            concurrency: self.resolver_concurrency,
        }
    }

    pub fn sequencer_settings(&self) -> SequencerSettings {
        SequencerSettings {
            max_attempts: self.max_play_attempts,
            retry_delay: self.retry_delay,
            preload_ahead: self.preload_ahead,
        }
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, raw)),
        None => Ok(default),
    }
}

fn duration_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match value {
        Some(raw) => humantime::parse_duration(raw.trim())
            .with_context(|| format!("{} inválido: {}", key, raw)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,

            cache_size: 500,
            audio_cache_size: 50,
            audio_cache_ttl: Duration::from_secs(2 * 60 * 60),

            max_playlist_size: 100,
            preload_ahead: 2,
            playlist_preload: 3,
            max_play_attempts: 3,
            retry_delay: Duration::from_secs(1),

            resolver_concurrency: 3,
            extractor_timeout: Duration::from_secs(60),
            page_fetch_timeout: Duration::from_secs(5),
            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_cookies: None,

            worker_threads: num_cpus::get(),
        }
    }
}
