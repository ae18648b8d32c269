//! Structured replies ("cards") and their conversion to Discord embeds.

pub mod embeds;

pub use embeds::{Card, CardField};
