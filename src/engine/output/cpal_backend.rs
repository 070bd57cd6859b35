use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{info, warn};

use crate::engine::engine::PlaybackEngine;
use crate::engine::output::AudioOutput;
use crate::error::{EngineError, Result};

/// Default output device driven by cpal. The device callback renders straight
/// from the engine at the engine's own rate and channel count.
pub struct CpalBackend {
    stream: Stream,
    is_healthy: Arc<AtomicBool>,
}

impl CpalBackend {
    pub fn new(engine: Arc<PlaybackEngine>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::AudioOutput("No output device available".to_string()))?;

        let sample_format = device
            .default_output_config()
            .map_err(output_error)?
            .sample_format();

        let engine_config = engine.config();
        let config = StreamConfig {
            channels: engine_config.channels as u16,
            sample_rate: engine_config.sample_rate,
            buffer_size: BufferSize::Default,
        };

        let is_healthy = Arc::new(AtomicBool::new(true));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, engine, is_healthy.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, engine, is_healthy.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, engine, is_healthy.clone()),
            other => {
                return Err(EngineError::AudioOutput(format!(
                    "Unsupported sample format {:?}",
                    other
                )))
            }
        }?;

        info!(
            "Audio output opened: {}Hz, {}ch, {:?}",
            config.sample_rate, config.channels, sample_format
        );

        Ok(Self { stream, is_healthy })
    }

    /// False once the device reported a stream error.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy.load(Ordering::SeqCst)
    }
}

impl AudioOutput for CpalBackend {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(output_error)
    }

    fn pause(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(output_error)
    }

    fn stop(&mut self) -> Result<()> {
        self.stream.pause().map_err(output_error)?;
        info!("Audio output stopped");
        Ok(())
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    engine: Arc<PlaybackEngine>,
    is_healthy: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let err_fn = move |err: cpal::StreamError| {
        warn!("Audio stream error: {}", err);
        is_healthy.store(false, Ordering::SeqCst);
    };

    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| write_block(data, &mut scratch, &engine),
            err_fn,
            None,
        )
        .map_err(output_error)
}

fn write_block<T: SizedSample + FromSample<f32>>(data: &mut [T], scratch: &mut Vec<f32>, engine: &PlaybackEngine) {
    if scratch.len() < data.len() {
        scratch.resize(data.len(), 0.0);
    }
    let block = &mut scratch[..data.len()];
    engine.render(block);
    for (out, &sample) in data.iter_mut().zip(block.iter()) {
        *out = T::from_sample(sample);
    }
}

fn output_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::AudioOutput(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_pause_failure_maps_to_output_error() {
        let err = output_error(cpal::PauseStreamError::DeviceNotAvailable);
        assert!(matches!(err, EngineError::AudioOutput(_)));
    }

    #[test]
    fn test_write_block_converts_engine_output() {
        let engine = PlaybackEngine::new(EngineConfig::default()).unwrap();
        let mut scratch = Vec::new();
        let mut data = vec![i16::MAX; 64];
        write_block(&mut data, &mut scratch, &engine);
        // Nothing open: the engine renders silence
        assert!(data.iter().all(|&s| s == 0));
        assert_eq!(scratch.len(), 64);
    }
}
