//! # Cache Module
//!
//! Bounded caches for resolved track data.
//!
//! Every guild owns two caches, both keyed by track reference:
//!
//! - **Metadata**: title, duration and canonical URL of each resolved track,
//!   used by the queue view and the "now playing" notices.
//! - **Resolved audio**: ready-to-play stream handles produced by the
//!   preloader. Stream URLs handed out by extractors expire, so these entries
//!   carry a time-to-live measured from their creation.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_SIZE=500              # Metadata entries per guild
//! AUDIO_CACHE_SIZE=50         # Resolved audio entries per guild
//! AUDIO_CACHE_TTL=2h          # Lifetime of a resolved stream
//! ```
//!
//! Expired entries read as absent immediately; the hourly maintenance task
//! additionally sweeps them so idle guilds release memory.

pub mod lru_cache;

pub use lru_cache::{CacheMetrics, LRUCache};

use std::time::Duration;

/// Límites de cache aplicados a cada guild
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheLimits {
    pub metadata_entries: usize,
    pub audio_entries: usize,
    pub audio_ttl: Option<Duration>,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            metadata_entries: 500,
            audio_entries: 50,
            audio_ttl: Some(Duration::from_secs(2 * 3600)),
        }
    }
}
