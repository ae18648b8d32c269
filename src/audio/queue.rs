use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, info};

use crate::{
    audio::player::StreamHandle,
    cache::{CacheLimits, CacheMetrics, LRUCache},
    sources::{TrackMetadata, TrackRef},
};

/// Audio resuelto y listo para entregar al reproductor
#[derive(Debug, Clone)]
pub struct ResolvedAudio {
    pub stream: StreamHandle,
    pub source: TrackMetadata,
}

impl ResolvedAudio {
    pub fn new(stream: StreamHandle, source: TrackMetadata) -> Self {
        Self { stream, source }
    }
}

/// Estado de una guild: cola, caches y playlists pendientes
#[derive(Debug)]
struct GuildState {
    queue: VecDeque<TrackRef>,
    titles: LRUCache<TrackRef, TrackMetadata>,
    audio: LRUCache<TrackRef, Arc<ResolvedAudio>>,
    // Orden de registro, sin duplicados
    pending_playlists: Vec<String>,
    // Cambia con cada clear(); invalida expansiones en curso
    generation: u64,
}

impl GuildState {
    fn new(limits: &CacheLimits) -> Self {
        Self {
            queue: VecDeque::new(),
            titles: LRUCache::new(limits.metadata_entries),
            audio: LRUCache::with_ttl(limits.audio_entries, limits.audio_ttl),
            pending_playlists: Vec::new(),
            generation: 0,
        }
    }
}

/// Playlists pendientes tomadas para expandir, junto con la generación de la
/// cola en el momento de tomarlas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingPlaylists {
    pub generation: u64,
    pub queries: Vec<String>,
}

/// Métricas agregadas de los caches de todas las guilds
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub guilds: usize,
    pub queued: usize,
    pub metadata: CacheMetrics,
    pub audio: CacheMetrics,
}

/// Colas y caches por guild. Ninguna operación hace I/O ni falla: una guild o
/// referencia ausente se lee como vacía.
pub struct QueueStore {
    guilds: DashMap<GuildId, Arc<Mutex<GuildState>>>,
    limits: CacheLimits,
}

impl QueueStore {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            guilds: DashMap::new(),
            limits,
        }
    }

    fn guild(&self, guild_id: GuildId) -> Arc<Mutex<GuildState>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildState::new(&self.limits))))
            .clone()
    }

    /// Copia de la cola (crea la guild si no existe)
    pub fn get_queue(&self, guild_id: GuildId) -> Vec<TrackRef> {
        self.guild(guild_id).lock().queue.iter().cloned().collect()
    }

    pub fn append(&self, guild_id: GuildId, reference: TrackRef) {
        let guild = self.guild(guild_id);
        let mut state = guild.lock();
        debug!("➕ Agregado a la cola de {}: {}", guild_id, reference);
        state.queue.push_back(reference);
    }

    /// Agrega solo si la cola no se limpió desde `generation`
    pub fn append_if_generation(
        &self,
        guild_id: GuildId,
        generation: u64,
        reference: TrackRef,
    ) -> bool {
        let guild = self.guild(guild_id);
        let mut state = guild.lock();
        if state.generation != generation {
            debug!("🚫 Descartado {} en guild {}: la cola fue limpiada", reference, guild_id);
            return false;
        }
        state.queue.push_back(reference);
        true
    }

    pub fn generation(&self, guild_id: GuildId) -> u64 {
        self.guild(guild_id).lock().generation
    }

    pub fn pop_head(&self, guild_id: GuildId) -> Option<TrackRef> {
        self.guild(guild_id).lock().queue.pop_front()
    }

    pub fn head(&self, guild_id: GuildId) -> Option<TrackRef> {
        self.guild(guild_id).lock().queue.front().cloned()
    }

    /// Quita la cabeza solo si sigue siendo `reference`
    pub fn remove_head_if(&self, guild_id: GuildId, reference: &str) -> bool {
        let guild = self.guild(guild_id);
        let mut state = guild.lock();
        if state.queue.front().map(String::as_str) == Some(reference) {
            state.queue.pop_front();
            true
        } else {
            false
        }
    }

    /// Primeras `count` referencias de la cola
    pub fn upcoming(&self, guild_id: GuildId, count: usize) -> Vec<TrackRef> {
        self.guild(guild_id)
            .lock()
            .queue
            .iter()
            .take(count)
            .cloned()
            .collect()
    }

    pub fn len(&self, guild_id: GuildId) -> usize {
        self.guilds
            .get(&guild_id)
            .map(|guild| guild.lock().queue.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, guild_id: GuildId) -> bool {
        self.len(guild_id) == 0
    }

    /// Vacía la cola y las playlists pendientes; los caches se conservan.
    /// Las expansiones ya en curso dejan de poder agregar entradas.
    pub fn clear(&self, guild_id: GuildId) {
        let guild = self.guild(guild_id);
        let mut state = guild.lock();
        state.queue.clear();
        state.pending_playlists.clear();
        state.generation += 1;
        info!("🗑️ Cola limpiada en guild {}", guild_id);
    }

    pub fn set_metadata(&self, guild_id: GuildId, reference: TrackRef, metadata: TrackMetadata) {
        self.guild(guild_id).lock().titles.insert(reference, metadata);
    }

    pub fn get_metadata(&self, guild_id: GuildId, reference: &str) -> Option<TrackMetadata> {
        self.guild(guild_id).lock().titles.get(reference)
    }

    pub fn set_audio(&self, guild_id: GuildId, reference: TrackRef, audio: Arc<ResolvedAudio>) {
        self.guild(guild_id).lock().audio.insert(reference, audio);
    }

    pub fn get_audio(&self, guild_id: GuildId, reference: &str) -> Option<Arc<ResolvedAudio>> {
        self.guild(guild_id).lock().audio.get(reference)
    }

    pub fn has_audio(&self, guild_id: GuildId, reference: &str) -> bool {
        self.guild(guild_id).lock().audio.contains(reference)
    }

    pub fn remove_audio(&self, guild_id: GuildId, reference: &str) {
        self.guild(guild_id).lock().audio.remove(reference);
    }

    /// Registra una playlist para expandir; una consulta ya pendiente se ignora
    pub fn add_pending_playlist(&self, guild_id: GuildId, query: String) -> bool {
        let guild = self.guild(guild_id);
        let mut state = guild.lock();
        if state.pending_playlists.contains(&query) {
            return false;
        }
        state.pending_playlists.push(query);
        true
    }

    /// Vacía el conjunto de playlists pendientes y devuelve su contenido
    pub fn take_pending_playlists(&self, guild_id: GuildId) -> PendingPlaylists {
        let guild = self.guild(guild_id);
        let mut state = guild.lock();
        PendingPlaylists {
            generation: state.generation,
            queries: std::mem::take(&mut state.pending_playlists),
        }
    }

    /// Elimina entradas de audio expiradas en todas las guilds
    pub fn cleanup_expired(&self) -> usize {
        let removed: usize = self
            .guilds
            .iter()
            .map(|guild| {
                let mut state = guild.lock();
                state.audio.cleanup_expired() + state.titles.cleanup_expired()
            })
            .sum();

        if removed > 0 {
            info!("🧹 Eliminadas {} entradas expiradas del cache", removed);
        }
        removed
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for guild in self.guilds.iter() {
            let state = guild.lock();
            stats.guilds += 1;
            stats.queued += state.queue.len();
            stats.metadata.merge(&state.titles.metrics());
            stats.audio.merge(&state.audio.metrics());
        }
        stats
    }
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, time::Duration};

    const GUILD: GuildId = GuildId::new(1);

    fn audio(url: &str) -> Arc<ResolvedAudio> {
        let stream = StreamHandle::new(url, &HashMap::new()).expect("url válida");
        Arc::new(ResolvedAudio::new(stream, TrackMetadata::new("t", 0, None)))
    }

    #[test]
    fn pop_head_returns_append_order() {
        let store = QueueStore::default();
        let refs: Vec<String> = (0..25).map(|i| format!("https://x/{i}")).collect();

        for r in &refs {
            store.append(GUILD, r.clone());
        }

        let mut popped = Vec::new();
        while let Some(r) = store.pop_head(GUILD) {
            popped.push(r);
        }
        assert_eq!(popped, refs);
        assert!(store.is_empty(GUILD));
    }

    #[test]
    fn guilds_are_isolated() {
        let store = QueueStore::default();
        store.append(GUILD, "a".to_string());
        store.set_metadata(GUILD, "a".to_string(), TrackMetadata::new("A", 1, None));

        let other = GuildId::new(2);
        assert!(store.get_queue(other).is_empty());
        assert_eq!(store.get_metadata(other, "a"), None);
        assert_eq!(store.get_queue(GUILD), vec!["a".to_string()]);
    }

    #[test]
    fn absent_keys_read_as_empty() {
        let store = QueueStore::default();
        assert_eq!(store.pop_head(GUILD), None);
        assert_eq!(store.get_metadata(GUILD, "missing"), None);
        assert!(store.get_audio(GUILD, "missing").is_none());
        assert!(store.take_pending_playlists(GUILD).queries.is_empty());
    }

    #[test]
    fn clear_keeps_caches() {
        let store = QueueStore::default();
        store.append(GUILD, "a".to_string());
        store.add_pending_playlist(GUILD, "https://list".to_string());
        store.set_audio(GUILD, "a".to_string(), audio("https://cdn/a"));

        store.clear(GUILD);

        assert!(store.get_queue(GUILD).is_empty());
        assert!(store.take_pending_playlists(GUILD).queries.is_empty());
        assert!(store.get_audio(GUILD, "a").is_some());
    }

    #[test]
    fn remove_head_if_only_matches_current_head() {
        let store = QueueStore::default();
        store.append(GUILD, "a".to_string());
        store.append(GUILD, "b".to_string());

        assert!(!store.remove_head_if(GUILD, "b"));
        assert!(store.remove_head_if(GUILD, "a"));
        assert_eq!(store.get_queue(GUILD), vec!["b".to_string()]);
    }

    #[test]
    fn audio_cache_is_bounded_per_guild() {
        let store = QueueStore::new(CacheLimits {
            metadata_entries: 10,
            audio_entries: 2,
            audio_ttl: None,
        });

        store.set_audio(GUILD, "a".to_string(), audio("https://cdn/a"));
        store.set_audio(GUILD, "b".to_string(), audio("https://cdn/b"));
        store.get_audio(GUILD, "a");
        store.set_audio(GUILD, "c".to_string(), audio("https://cdn/c"));

        assert!(store.has_audio(GUILD, "a"));
        assert!(!store.has_audio(GUILD, "b"));
        assert!(store.has_audio(GUILD, "c"));
    }

    #[test]
    fn expired_audio_reads_as_absent() {
        let store = QueueStore::new(CacheLimits {
            audio_ttl: Some(Duration::ZERO),
            ..CacheLimits::default()
        });
        store.set_audio(GUILD, "a".to_string(), audio("https://cdn/a"));
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.get_audio(GUILD, "a").is_none());
    }

    #[test]
    fn pending_playlists_drain_once() {
        let store = QueueStore::default();
        store.add_pending_playlist(GUILD, "p1".to_string());
        store.add_pending_playlist(GUILD, "p2".to_string());

        assert_eq!(
            store.take_pending_playlists(GUILD).queries,
            vec!["p1".to_string(), "p2".to_string()]
        );
        assert!(store.take_pending_playlists(GUILD).queries.is_empty());
    }

    #[test]
    fn repeated_pending_playlist_is_registered_once() {
        let store = QueueStore::default();
        assert!(store.add_pending_playlist(GUILD, "p1".to_string()));
        assert!(store.add_pending_playlist(GUILD, "p2".to_string()));
        assert!(!store.add_pending_playlist(GUILD, "p1".to_string()));

        assert_eq!(
            store.take_pending_playlists(GUILD).queries,
            vec!["p1".to_string(), "p2".to_string()]
        );

        // Una vez tomada, la misma consulta puede volver a registrarse
        assert!(store.add_pending_playlist(GUILD, "p1".to_string()));
    }

    #[test]
    fn appends_from_before_a_clear_are_dropped() {
        let store = QueueStore::default();
        store.add_pending_playlist(GUILD, "p1".to_string());
        let pending = store.take_pending_playlists(GUILD);

        assert!(store.append_if_generation(GUILD, pending.generation, "a".to_string()));
        store.clear(GUILD);
        assert!(!store.append_if_generation(GUILD, pending.generation, "b".to_string()));

        store.append(GUILD, "new".to_string());
        assert_eq!(store.get_queue(GUILD), vec!["new".to_string()]);
        assert_eq!(store.generation(GUILD), pending.generation + 1);
    }
}
