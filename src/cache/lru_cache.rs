use std::{
    borrow::Borrow,
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};
use tracing::debug;

/// Cache entry con TTL y marca de último uso
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_used: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        match ttl {
            Some(ttl) => now.saturating_duration_since(self.created_at) > ttl,
            None => false,
        }
    }
}

/// Cache LRU acotado con expiración opcional por antigüedad.
///
/// No es concurrente: cada guild guarda sus caches detrás de su propio mutex,
/// así que todas las operaciones toman `&mut self`.
#[derive(Debug)]
pub struct LRUCache<K: Eq + Hash, V> {
    data: HashMap<K, CacheEntry<V>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: u64,
    metrics: CacheMetrics,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, None)
    }

    pub fn with_ttl(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            data: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            clock: 0,
            metrics: CacheMetrics::default(),
        }
    }

    /// Inserta (o reemplaza) un valor, desalojando el menos usado si está lleno
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let tick = self.tick();

        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_one();
        }

        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            last_used: tick,
        };
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let tick = self.tick();
        let ttl = self.ttl;

        let expired = match self.data.get_mut(key) {
            Some(entry) if entry.is_expired(ttl, now) => true,
            Some(entry) => {
                entry.last_used = tick;
                self.metrics.hits += 1;
                return Some(entry.value.clone());
            }
            None => false,
        };

        if expired {
            self.data.remove(key);
            self.metrics.expired_removals += 1;
        }
        self.metrics.misses += 1;
        None
    }

    /// Comprueba presencia sin contar como uso
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.data
            .get(key)
            .is_some_and(|entry| !entry.is_expired(self.ttl, now))
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.data.remove(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.data.len();

        self.data.retain(|_, entry| !entry.is_expired(ttl, now));

        let removed = before - self.data.len();
        if removed > 0 {
            self.metrics.expired_removals += removed as u64;
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }
        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.clone()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_one(&mut self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            self.metrics.evictions += 1;
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    /// Acumula las métricas de otro cache (para reportes agregados)
    pub fn merge(&mut self, other: &CacheMetrics) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.expired_removals += other.expired_removals;
    }
}
