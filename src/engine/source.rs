//! The decode + resample stage that feeds the producer loop.
//!
//! A `PcmSource` yields interleaved f32 frames already converted to the
//! engine's sample rate and channel count. Container parsing, decoding and
//! format conversion all live behind this trait.

use std::path::Path;

use tracing::{debug, warn};

use crate::engine::decoder::{symphonia_decoder::SymphoniaDecoder, AudioDecoder};
use crate::engine::dsp::remix::remix;
use crate::engine::dsp::resampler::Resampler;
use crate::error::Result;

/// Input frames per resampler chunk.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

pub trait PcmSource: Send {
    /// Next block of converted frames, or None when nothing is available
    /// (end of stream included).
    fn next_chunk(&mut self) -> Option<Vec<f32>>;

    /// Moves the read position to `position_secs` and drops any decode or
    /// resample state from the old position. Returns false if the underlying
    /// stream refused the seek.
    fn relocate(&mut self, position_secs: f64) -> bool;

    fn duration_secs(&self) -> Option<f64>;
}

/// A decoder plus channel remix plus sample-rate conversion.
pub struct DecodedSource {
    decoder: Box<dyn AudioDecoder>,
    resampler: Option<Resampler>,
    source_channels: usize,
    target_channels: usize,
    exhausted: bool,
}

impl DecodedSource {
    pub fn open<P: AsRef<Path>>(path: P, target_rate: u32, target_channels: usize) -> Result<Self> {
        let decoder = SymphoniaDecoder::new(path)?;
        Self::new(Box::new(decoder), target_rate, target_channels)
    }

    pub fn new(decoder: Box<dyn AudioDecoder>, target_rate: u32, target_channels: usize) -> Result<Self> {
        let source_rate = decoder.sample_rate();
        let source_channels = decoder.channels().max(1) as usize;

        let resampler = if source_rate != target_rate {
            debug!("Initializing resampler: {}Hz -> {}Hz, {}ch", source_rate, target_rate, target_channels);
            Some(Resampler::new(source_rate, target_rate, target_channels, RESAMPLE_CHUNK_FRAMES)?)
        } else {
            None
        };

        Ok(Self {
            decoder,
            resampler,
            source_channels,
            target_channels,
            exhausted: false,
        })
    }
}

impl PcmSource for DecodedSource {
    fn next_chunk(&mut self) -> Option<Vec<f32>> {
        if self.exhausted {
            return None;
        }

        loop {
            let Some(samples) = self.decoder.decode_next() else {
                self.exhausted = true;
                return match self.resampler.as_mut().map(|r| r.flush()) {
                    Some(Ok(tail)) if !tail.is_empty() => Some(tail),
                    Some(Err(e)) => {
                        warn!("Resampler flush failed: {}", e);
                        None
                    }
                    _ => None,
                };
            };

            let remixed = remix(&samples, self.source_channels, self.target_channels);
            let converted = match self.resampler.as_mut() {
                Some(r) => match r.process(&remixed) {
                    Ok(out) => out,
                    Err(e) => {
                        // Drop the block rather than feed unconverted audio.
                        warn!("Resampling error: {}", e);
                        continue;
                    }
                },
                None => remixed,
            };

            if !converted.is_empty() {
                return Some(converted);
            }
        }
    }

    fn relocate(&mut self, position_secs: f64) -> bool {
        self.exhausted = false;
        if let Some(r) = self.resampler.as_mut() {
            r.reset();
        }
        match self.decoder.seek(position_secs) {
            Ok(()) => true,
            Err(e) => {
                warn!("Seek to {:.3}s failed: {}", position_secs, e);
                false
            }
        }
    }

    fn duration_secs(&self) -> Option<f64> {
        self.decoder.duration()
    }
}

/// Interleaved PCM held in memory, already at the engine's format.
pub struct MemorySource {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    chunk_frames: usize,
    cursor: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize, chunk_frames: usize) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() / channels * channels;
        let mut samples = samples;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate: sample_rate.max(1),
            chunk_frames: chunk_frames.max(1),
            cursor: 0,
        }
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl PcmSource for MemorySource {
    fn next_chunk(&mut self) -> Option<Vec<f32>> {
        let total = self.total_frames();
        if self.cursor >= total {
            return None;
        }
        let end = (self.cursor + self.chunk_frames).min(total);
        let chunk = self.samples[self.cursor * self.channels..end * self.channels].to_vec();
        self.cursor = end;
        Some(chunk)
    }

    fn relocate(&mut self, position_secs: f64) -> bool {
        let frame = (position_secs.max(0.0) * self.sample_rate as f64) as usize;
        self.cursor = frame.min(self.total_frames());
        true
    }

    fn duration_secs(&self) -> Option<f64> {
        Some(self.total_frames() as f64 / self.sample_rate as f64)
    }
}
