//! Engine configuration.
//!
//! Every timing and sizing constant the core uses lives here so tests can
//! shrink buffers and sleeps. Values can be loaded from a TOML file; missing
//! keys fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Output sample rate the engine runs at unless configured otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
/// Interleaved channel count.
pub const DEFAULT_CHANNELS: usize = 2;
/// Ring buffer capacity in frames.
pub const DEFAULT_RING_CAPACITY_FRAMES: usize = 16384;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: usize,
    pub ring_capacity_frames: usize,
    /// Producer stops decoding while more than this many frames are buffered.
    pub high_watermark_frames: usize,
    /// Minimum cushion before output resumes after open/seek.
    pub warmup_frames: usize,
    /// Frames moved from the modulator to the ring buffer per transfer.
    pub drain_chunk_frames: usize,
    /// Size of the last-output window used for metering.
    pub meter_frames: usize,
    pub idle_sleep_ms: u64,
    pub backpressure_sleep_ms: u64,
    /// A producer join slower than this is logged as a warning.
    pub join_warn_ms: u64,
    pub default_tempo: f64,
    pub default_pitch: f64,
    pub default_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            ring_capacity_frames: DEFAULT_RING_CAPACITY_FRAMES,
            high_watermark_frames: DEFAULT_RING_CAPACITY_FRAMES * 3 / 4,
            warmup_frames: DEFAULT_SAMPLE_RATE as usize / 10,
            drain_chunk_frames: 1024,
            meter_frames: 4096,
            idle_sleep_ms: 10,
            backpressure_sleep_ms: 5,
            join_warn_ms: 250,
            default_tempo: 1.0,
            default_pitch: 0.0,
            default_volume: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::Config("sample_rate must be non-zero".to_string()));
        }
        if self.channels == 0 {
            return Err(EngineError::Config("channels must be non-zero".to_string()));
        }
        if self.ring_capacity_frames == 0 {
            return Err(EngineError::Config("ring_capacity_frames must be non-zero".to_string()));
        }
        if self.high_watermark_frames > self.ring_capacity_frames {
            return Err(EngineError::Config(format!(
                "high_watermark_frames ({}) exceeds ring capacity ({})",
                self.high_watermark_frames, self.ring_capacity_frames
            )));
        }
        if self.warmup_frames > self.ring_capacity_frames {
            return Err(EngineError::Config(format!(
                "warmup_frames ({}) exceeds ring capacity ({})",
                self.warmup_frames, self.ring_capacity_frames
            )));
        }
        if self.drain_chunk_frames == 0 || self.meter_frames == 0 {
            return Err(EngineError::Config(
                "drain_chunk_frames and meter_frames must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn backpressure_sleep(&self) -> Duration {
        Duration::from_millis(self.backpressure_sleep_ms)
    }

    pub fn join_warn(&self) -> Duration {
        Duration::from_millis(self.join_warn_ms)
    }

    /// Converts a millisecond position to a frame count at the output rate.
    pub fn ms_to_frames(&self, position_ms: f64) -> u64 {
        if !position_ms.is_finite() || position_ms <= 0.0 {
            return 0;
        }
        (position_ms * self.sample_rate as f64 / 1000.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.ring_capacity_frames, 16384);
        assert_eq!(config.high_watermark_frames, 12288);
        assert_eq!(config.warmup_frames, 4410);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("sample_rate = 48000\nwarmup_frames = 4800\n").unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.warmup_frames, 4800);
        assert_eq!(config.channels, 2);
        assert_eq!(config.idle_sleep_ms, 10);
    }

    #[test]
    fn test_rejects_warmup_above_capacity() {
        let result = EngineConfig::from_toml_str("ring_capacity_frames = 1000\nhigh_watermark_frames = 750\nwarmup_frames = 2000\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(EngineConfig::from_toml_str("sample_rate = \"fast\"").is_err());
    }

    #[test]
    fn test_ms_to_frames() {
        let config = EngineConfig::default();
        assert_eq!(config.ms_to_frames(1000.0), 44100);
        assert_eq!(config.ms_to_frames(100.0), 4410);
        assert_eq!(config.ms_to_frames(-5.0), 0);
        assert_eq!(config.ms_to_frames(f64::NAN), 0);
    }
}
