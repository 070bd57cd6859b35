pub mod buffer;
pub mod clock;
pub mod shared;
pub mod decoder;
pub mod dsp;
pub mod engine;
pub mod meter;
pub mod modulation;
pub mod output;
pub mod producer;
pub mod source;
pub mod state;

pub use engine::PlaybackEngine;
pub use output::{RenderOutcome, SilenceReason};
