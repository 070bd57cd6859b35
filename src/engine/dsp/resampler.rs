use rubato::{Resampler as RubatoResampler, Fft, FixedSync};
use audioadapter_buffers::direct::SequentialSliceOfVecs;

use crate::error::{EngineError, Result};

/// Converts interleaved audio between sample rates in fixed input chunks.
/// Input that does not fill a whole chunk is held until the next call.
pub struct Resampler {
    resampler: Fft<f32>,
    channels: usize,
    chunk_size: usize,
    buffer: Vec<f32>,
}

impl Resampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: usize,
        chunk_size: usize,
    ) -> Result<Self> {
        let resampler = Fft::<f32>::new(
            source_sample_rate as usize,
            target_sample_rate as usize,
            chunk_size,
            2,
            channels,
            FixedSync::Input,
        )
        .map_err(|e| EngineError::Resample(e.to_string()))?;

        Ok(Self {
            resampler,
            channels,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size * channels),
        })
    }

    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.buffer.extend_from_slice(input);

        let mut all_output = Vec::new();

        while self.buffer.len() >= self.chunk_size * self.channels {
            let chunk: Vec<f32> = self.buffer.drain(0..self.chunk_size * self.channels).collect();
            let num_frames = self.chunk_size;

            let mut input_buffer = vec![vec![0.0; num_frames]; self.channels];
            for i in 0..num_frames {
                for ch in 0..self.channels {
                    input_buffer[ch][i] = chunk[i * self.channels + ch];
                }
            }

            let out_len = self.resampler.output_frames_next();
            let mut output_buffer = vec![vec![0.0; out_len]; self.channels];

            let input_adapter = SequentialSliceOfVecs::new(&input_buffer, self.channels, num_frames)
                .map_err(|e| EngineError::Resample(e.to_string()))?;
            let mut output_adapter = SequentialSliceOfVecs::new_mut(&mut output_buffer, self.channels, out_len)
                .map_err(|e| EngineError::Resample(e.to_string()))?;

            let (_, written) = self.resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| EngineError::Resample(e.to_string()))?;

            for i in 0..written.min(out_len) {
                for ch in 0..self.channels {
                    all_output.push(output_buffer[ch][i]);
                }
            }
        }

        Ok(all_output)
    }

    /// Pads the pending partial chunk with silence and pushes it through.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }

        let remaining_frames = self.buffer.len() / self.channels;
        let padding_needed = (self.chunk_size - remaining_frames) * self.channels;
        self.buffer.extend(vec![0.0; padding_needed]);

        self.process(&[])
    }

    /// Drops pending input and filter history (used on seek).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.resampler.reset();
    }
}
