//! # Audio Module
//!
//! Queue and playback engine, one independent state bundle per guild.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Store
//! - FIFO queue of track references per guild
//! - Bounded metadata cache and resolved-audio cache (LRU, TTL on audio)
//! - Pending playlists awaiting background expansion
//!
//! ### [`preloader`] - Preloader
//! - Resolves upcoming entries into playable streams before they are needed
//! - Expands pending playlists in the background
//!
//! ### [`sequencer`] - Playback Sequencer
//! - Plays the head of the queue with a bounded retry
//! - Advances when the player reports the end of a track
//!
//! ### [`player`] - Player boundary
//! - [`player::PlayerSink`] trait and its Songbird implementation
//!
//! ## Completion events
//!
//! Songbird runs track events on its own driver tasks. The handler never
//! touches queue state: it sends a [`sequencer::SequencerEvent`] over a
//! channel, and the sequencer event loop performs the advance. Every hand-off
//! carries a play token, so an event for a track that is no longer current
//! (after `stop`, or a duplicate End/Error pair) is dropped.

pub mod player;
pub mod preloader;
pub mod queue;
pub mod sequencer;
