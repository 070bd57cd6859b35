//! Real-time playback core for a tempo- and pitch-adjustable media player.
//!
//! A producer thread decodes, resamples and modulates audio into a bounded
//! frame ring buffer; the output device callback drains it and advances a
//! clock that counts only frames actually delivered. [`PlaybackEngine`] ties
//! these together and coordinates open, seek and close.

pub mod config;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use engine::source::{DecodedSource, MemorySource, PcmSource};
pub use engine::{PlaybackEngine, RenderOutcome, SilenceReason};
pub use error::{EngineError, Result};
