//! Core library for the Car Wash Mixer.
//!
//! Two independent operations live here, each usable without the HTTP layer:
//!
//! - [`loudness::normalize`] measures an audio file's integrated loudness and
//!   rewrites it at -14 LUFS.
//! - [`lyrics::map_lyrics`] buckets LRC-timestamped lyric lines into musical
//!   bars.
//!
//! The [`cache`] module supplies the key derivation and the gateway trait the
//! server uses to memoize both.

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod loudness;
pub mod lyrics;
pub mod mapping;
pub mod timeline;

pub use audio::{AudioBuffer, OutputFormat};
pub use cache::{cache_key, CacheGateway, CacheStatus, MemoryCache, NoCache, RedisCache};
pub use config::{CacheBackend, CacheConfig, ServerConfig, ServiceConfig};
pub use error::{MixerError, Result};
pub use loudness::{integrated_loudness, normalize, DEFAULT_PRESET, TARGET_LOUDNESS_LUFS};
pub use lyrics::{map_lyrics, LyricLine, LyricsReport, SkipReason};
pub use mapping::BarMapping;
pub use timeline::{BarTiming, DEFAULT_BEATS_PER_BAR};
