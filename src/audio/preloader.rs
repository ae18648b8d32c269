use dashmap::DashSet;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::StreamHandle,
        queue::{QueueStore, ResolvedAudio},
    },
    notify::Notifier,
    sources::{ExtractOptions, Extracted, MediaExtractor, MediaInfo, TrackRef},
};

/// Resultado de una pasada de expansión de playlists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionReport {
    pub appended: Vec<TrackRef>,
    pub scheduled_preloads: Vec<TrackRef>,
    pub failed_playlists: usize,
}

/// Resuelve por adelantado las entradas próximas de la cola
pub struct Preloader {
    store: Arc<QueueStore>,
    extractor: Arc<dyn MediaExtractor>,
    in_flight: DashSet<(GuildId, TrackRef)>,
    playlist_preload: usize,
}

impl Preloader {
    pub fn new(
        store: Arc<QueueStore>,
        extractor: Arc<dyn MediaExtractor>,
        playlist_preload: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            in_flight: DashSet::new(),
            playlist_preload,
        }
    }

    /// Devuelve el audio resuelto de `reference`, resolviéndolo si no está en cache.
    /// Cualquier fallo se traduce en `None`.
    pub async fn preload(&self, guild_id: GuildId, reference: &str) -> Option<Arc<ResolvedAudio>> {
        if let Some(cached) = self.store.get_audio(guild_id, reference) {
            debug!("💾 Audio en cache: {}", reference);
            return Some(cached);
        }

        let info = match self.extractor.extract(reference, ExtractOptions::single()).await {
            Ok(Extracted::Track(info)) => info,
            Ok(Extracted::Playlist(playlist)) => playlist.entries.into_iter().next()?,
            Err(e) => {
                warn!("⚠️ Error precargando {}: {}", reference, e);
                return None;
            }
        };

        let stream = match stream_for(&info) {
            Some(stream) => stream,
            None => {
                warn!("⚠️ Sin stream reproducible para {}", reference);
                return None;
            }
        };

        let mut metadata = info.metadata();
        metadata.url = Some(reference.to_string());

        let audio = Arc::new(ResolvedAudio::new(stream, metadata.clone()));
        self.store
            .set_audio(guild_id, reference.to_string(), audio.clone());
        self.store
            .set_metadata(guild_id, reference.to_string(), metadata);

        debug!("✅ Precargado: {}", reference);
        Some(audio)
    }

    /// Precarga en segundo plano; `None` si ya está en cache o en curso
    pub fn schedule(
        self: &Arc<Self>,
        guild_id: GuildId,
        reference: TrackRef,
    ) -> Option<JoinHandle<Option<Arc<ResolvedAudio>>>> {
        if self.store.has_audio(guild_id, &reference) {
            return None;
        }
        if !self.in_flight.insert((guild_id, reference.clone())) {
            return None;
        }

        let preloader = Arc::clone(self);
        Some(tokio::spawn(async move {
            let result = preloader.preload(guild_id, &reference).await;
            preloader.in_flight.remove(&(guild_id, reference));
            result
        }))
    }

    /// Programa la precarga de las primeras `count` entradas que no estén en cache
    pub fn preload_next(self: &Arc<Self>, guild_id: GuildId, count: usize) -> Vec<TrackRef> {
        self.store
            .upcoming(guild_id, count)
            .into_iter()
            .filter(|reference| self.schedule(guild_id, reference.clone()).is_some())
            .collect()
    }

    /// Expande en segundo plano las playlists pendientes de la guild. El
    /// conjunto pendiente se vacía al comenzar la pasada; si la cola se limpia
    /// mientras tanto, las entradas restantes se descartan.
    pub fn expand_pending_playlists(
        self: &Arc<Self>,
        guild_id: GuildId,
        notifier: Arc<dyn Notifier>,
    ) -> JoinHandle<ExpansionReport> {
        let pending = self.store.take_pending_playlists(guild_id);
        let preloader = Arc::clone(self);

        tokio::spawn(async move {
            let mut report = ExpansionReport::default();
            for query in pending.queries {
                if preloader.store.generation(guild_id) != pending.generation {
                    debug!("🚫 Expansión cancelada en guild {}: la cola fue limpiada", guild_id);
                    break;
                }
                match preloader
                    .expand_one(guild_id, pending.generation, &query, &mut report)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(message) => {
                        report.failed_playlists += 1;
                        notifier
                            .notify(format!("Error processing playlist: {}", message))
                            .await;
                    }
                }
            }

            if !report.appended.is_empty() {
                info!(
                    "📑 {} canciones agregadas desde playlists en guild {}",
                    report.appended.len(),
                    guild_id
                );
            }
            report
        })
    }

    /// `Ok(false)` si la cola se limpió durante la expansión
    async fn expand_one(
        self: &Arc<Self>,
        guild_id: GuildId,
        generation: u64,
        query: &str,
        report: &mut ExpansionReport,
    ) -> Result<bool, String> {
        let playlist = match self.extractor.extract(query, ExtractOptions::browse()).await {
            Ok(Extracted::Playlist(playlist)) => playlist,
            Ok(Extracted::Track(_)) => return Ok(true),
            Err(e) => {
                warn!("❌ Error expandiendo playlist {}: {}", query, e);
                return Err(e.message);
            }
        };

        // La primera entrada ya se encoló al resolver la consulta
        for (position, (reference, entry)) in playlist.playable_entries().skip(1).enumerate() {
            if !self
                .store
                .append_if_generation(guild_id, generation, reference.clone())
            {
                return Ok(false);
            }
            self.store
                .set_metadata(guild_id, reference.clone(), entry.metadata());

            if position < self.playlist_preload
                && self.schedule(guild_id, reference.clone()).is_some()
            {
                report.scheduled_preloads.push(reference.clone());
            }
            report.appended.push(reference);
        }

        Ok(true)
    }
}

/// Stream directo elegido por el extractor o, si falta, la mejor codificación de audio
fn stream_for(info: &MediaInfo) -> Option<StreamHandle> {
    let direct = info
        .url
        .as_deref()
        .filter(|url| Some(*url) != info.webpage_url.as_deref());

    if let Some(url) = direct {
        if let Ok(stream) = StreamHandle::new(url, &info.http_headers) {
            return Some(stream);
        }
    }

    let format = info.best_audio_format()?;
    debug!(
        "🎚️ Formato {} ({:?}, {:?} kbps)",
        format.format_id.as_deref().unwrap_or("?"),
        format.acodec,
        format.abr
    );
    let headers = if format.http_headers.is_empty() {
        &info.http_headers
    } else {
        &format.http_headers
    };
    StreamHandle::new(&format.url, headers).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CacheLimits,
        sources::{AudioFormat, ExtractorError, MockMediaExtractor, PlaylistInfo},
        testing::RecordingNotifier,
    };
    use mockall::predicate::*;
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(11);

    fn playable(reference: &str) -> Extracted {
        Extracted::Track(MediaInfo {
            title: Some(format!("title of {reference}")),
            duration: Some(120.0),
            webpage_url: Some(reference.to_string()),
            formats: vec![AudioFormat {
                url: format!("https://cdn.example/{}", reference.len()),
                acodec: Some("opus".to_string()),
                vcodec: Some("none".to_string()),
                abr: Some(160.0),
                ..AudioFormat::default()
            }],
            ..MediaInfo::default()
        })
    }

    fn entry(n: usize) -> MediaInfo {
        MediaInfo {
            title: Some(format!("Track {n}")),
            url: Some(format!("https://www.youtube.com/watch?v={n}")),
            ..MediaInfo::default()
        }
    }

    fn preloader(extractor: MockMediaExtractor) -> (Arc<QueueStore>, Arc<Preloader>) {
        let store = Arc::new(QueueStore::new(CacheLimits::default()));
        let preloader = Arc::new(Preloader::new(store.clone(), Arc::new(extractor), 3));
        (store, preloader)
    }

    #[tokio::test]
    async fn preloading_a_cached_reference_does_no_work() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq("https://www.youtube.com/watch?v=a"), eq(ExtractOptions::single()))
            .times(1)
            .returning(|reference, _| Ok(playable(reference)));

        let (_, preloader) = preloader(extractor);

        let first = preloader
            .preload(GUILD, "https://www.youtube.com/watch?v=a")
            .await
            .expect("precarga");
        let second = preloader
            .preload(GUILD, "https://www.youtube.com/watch?v=a")
            .await
            .expect("cache");

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failures_yield_none() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq("bad"), always())
            .returning(|_, _| Err(ExtractorError::new("Video unavailable")));
        extractor
            .expect_extract()
            .with(eq("no-audio"), always())
            .returning(|_, _| Ok(Extracted::Track(MediaInfo::default())));

        let (store, preloader) = preloader(extractor);

        assert!(preloader.preload(GUILD, "bad").await.is_none());
        assert!(preloader.preload(GUILD, "no-audio").await.is_none());
        assert!(!store.has_audio(GUILD, "bad"));
    }

    #[tokio::test]
    async fn preload_picks_best_audio_and_refreshes_metadata() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .returning(|reference, _| Ok(playable(reference)));

        let (store, preloader) = preloader(extractor);
        let audio = preloader.preload(GUILD, "https://x/abc").await.expect("precarga");

        assert_eq!(audio.stream.url(), "https://cdn.example/13");
        assert_eq!(
            store.get_metadata(GUILD, "https://x/abc").map(|m| m.title),
            Some("title of https://x/abc".to_string())
        );
    }

    #[tokio::test]
    async fn preload_next_skips_cached_entries() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .returning(|reference, _| Ok(playable(reference)));

        let (store, preloader) = preloader(extractor);
        for r in ["https://x/1", "https://x/2", "https://x/3"] {
            store.append(GUILD, r.to_string());
        }
        preloader.preload(GUILD, "https://x/1").await;

        let scheduled = preloader.preload_next(GUILD, 2);

        assert_eq!(scheduled, vec!["https://x/2".to_string()]);
    }

    #[tokio::test]
    async fn playlist_expansion_appends_remaining_entries() {
        let query = "https://www.youtube.com/playlist?list=PL1";
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq(query), eq(ExtractOptions::browse()))
            .times(1)
            .returning(|_, _| {
                Ok(Extracted::Playlist(PlaylistInfo {
                    title: Some("Mix".to_string()),
                    entries: (0..6).map(entry).collect(),
                }))
            });
        extractor
            .expect_extract()
            .with(always(), eq(ExtractOptions::single()))
            .returning(|reference, _| Ok(playable(reference)));

        let (store, preloader) = preloader(extractor);

        // La primera entrada se encola de forma inmediata al resolver
        store.append(GUILD, "https://www.youtube.com/watch?v=0".to_string());
        store.add_pending_playlist(GUILD, query.to_string());
        assert_eq!(store.len(GUILD), 1);

        let notifier = Arc::new(RecordingNotifier::default());
        let report = preloader
            .expand_pending_playlists(GUILD, notifier.clone())
            .await
            .expect("tarea de expansión");

        let expected: Vec<String> = (0..6)
            .map(|n| format!("https://www.youtube.com/watch?v={n}"))
            .collect();
        assert_eq!(store.get_queue(GUILD), expected);
        assert_eq!(report.appended, expected[1..].to_vec());
        assert_eq!(report.scheduled_preloads, expected[1..4].to_vec());
        assert_eq!(
            store.get_metadata(GUILD, &expected[5]).map(|m| m.title),
            Some("Track 5".to_string())
        );
        assert!(store.take_pending_playlists(GUILD).queries.is_empty());
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn expansion_errors_are_reported_and_do_not_stop_other_playlists() {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .with(eq("broken"), always())
            .returning(|_, _| Err(ExtractorError::new("HTTP Error 404")));
        extractor
            .expect_extract()
            .with(eq("fine"), eq(ExtractOptions::browse()))
            .returning(|_, _| {
                Ok(Extracted::Playlist(PlaylistInfo {
                    title: None,
                    entries: (0..2).map(entry).collect(),
                }))
            });
        extractor
            .expect_extract()
            .with(always(), eq(ExtractOptions::single()))
            .returning(|reference, _| Ok(playable(reference)));

        let (store, preloader) = preloader(extractor);
        store.add_pending_playlist(GUILD, "broken".to_string());
        store.add_pending_playlist(GUILD, "fine".to_string());

        let notifier = Arc::new(RecordingNotifier::default());
        let report = preloader
            .expand_pending_playlists(GUILD, notifier.clone())
            .await
            .expect("tarea de expansión");

        assert_eq!(report.failed_playlists, 1);
        assert_eq!(store.get_queue(GUILD), vec!["https://www.youtube.com/watch?v=1".to_string()]);
        assert_eq!(
            notifier.messages(),
            vec!["Error processing playlist: HTTP Error 404".to_string()]
        );
    }

    #[tokio::test]
    async fn expansion_taken_before_a_clear_adds_nothing() {
        // Sin expectativas: la playlist no debe ni extraerse
        let (store, preloader) = preloader(MockMediaExtractor::new());
        store.append(GUILD, "https://www.youtube.com/watch?v=0".to_string());
        store.add_pending_playlist(GUILD, "https://www.youtube.com/playlist?list=PL1".to_string());

        let expansion = preloader.expand_pending_playlists(GUILD, Arc::new(RecordingNotifier::default()));
        store.clear(GUILD);

        let report = expansion.await.expect("tarea de expansión");
        assert_eq!(report, ExpansionReport::default());
        assert!(store.get_queue(GUILD).is_empty());
    }
}
