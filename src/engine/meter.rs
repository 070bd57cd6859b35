//! Output level metering.
//!
//! The output callback snapshots what it just delivered into a fixed window;
//! visualizers read that window, its RMS level, or a log-band spectrum of it.

use realfft::RealFftPlanner;

use crate::error::{EngineError, Result};

/// Lower edge of the first analysis band.
const BAND_MIN_HZ: f32 = 50.0;
const DB_MIN: f64 = -80.0;
const DB_MAX: f64 = 0.0;

pub struct LevelMeter {
    channels: usize,
    frames: usize,
    window: Vec<f32>,
}

impl LevelMeter {
    pub fn new(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = frames.max(1);
        Self {
            channels,
            frames,
            window: vec![0.0; frames * channels],
        }
    }

    /// Records the most recent delivered frames, zero-padding a short block.
    pub fn capture(&mut self, delivered: &[f32]) {
        let ch = self.channels;
        let delivered_frames = delivered.len() / ch;
        let copy_frames = delivered_frames.min(self.frames);
        let start = (delivered_frames - copy_frames) * ch;

        self.window[..copy_frames * ch].copy_from_slice(&delivered[start..start + copy_frames * ch]);
        self.window[copy_frames * ch..].fill(0.0);
    }

    pub fn silence(&mut self) {
        self.window.fill(0.0);
    }

    /// Copies up to `max_frames` frames of the window into `dst`; returns frames copied.
    pub fn copy_last(&self, dst: &mut [f32], max_frames: usize) -> usize {
        let frames = max_frames.min(self.frames).min(dst.len() / self.channels);
        let n = frames * self.channels;
        dst[..n].copy_from_slice(&self.window[..n]);
        frames
    }

    /// RMS over the whole window, all channels.
    pub fn rms(&self) -> f64 {
        let sum: f64 = self.window.iter().map(|&v| (v as f64) * (v as f64)).sum();
        (sum / self.window.len() as f64).sqrt()
    }

    /// Splits the window into (left, right) channel vectors. Mono yields the
    /// same data twice.
    pub fn split_stereo(&self) -> (Vec<f32>, Vec<f32>) {
        let ch = self.channels;
        let left: Vec<f32> = self.window.chunks_exact(ch).map(|f| f[0]).collect();
        let right = if ch > 1 {
            self.window.chunks_exact(ch).map(|f| f[1]).collect()
        } else {
            left.clone()
        };
        (left, right)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BandAnalysis {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_size: usize,
    pub bands: usize,
    pub a_weighting: bool,
}

/// Per-hop band levels in [0, 1], row-major `[frames][bands]` per channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandSpectrum {
    pub frames: usize,
    pub bands: usize,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// Short-time band analysis of one or two channels.
///
/// Each hop is Hann-windowed and transformed; bins are grouped into
/// log-spaced bands from 50 Hz to Nyquist, the mean band power is turned into
/// a level and mapped from [-80, 0] dB onto [0, 1]. A missing right channel
/// reuses the left one. Fewer samples than one FFT yields zero frames.
pub fn analyze_bands(left: &[f32], right: Option<&[f32]>, params: &BandAnalysis) -> Result<BandSpectrum> {
    if left.is_empty() || params.sample_rate == 0 || params.fft_size < 2 || params.hop_size == 0 || params.bands == 0 {
        return Err(EngineError::InvalidArgument(format!(
            "band analysis needs samples and non-zero parameters (got {:?})",
            params
        )));
    }

    let fft_size = params.fft_size;
    let samples = match right {
        Some(r) => left.len().min(r.len()),
        None => left.len(),
    };
    if samples < fft_size {
        return Ok(BandSpectrum { frames: 0, bands: params.bands, ..Default::default() });
    }

    let frames = 1 + (samples - fft_size) / params.hop_size;
    let window = hann_window(fft_size);
    let (bin_start, bin_end) = log_band_bins(params.sample_rate, fft_size, params.bands);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();

    let mut result = BandSpectrum {
        frames,
        bands: params.bands,
        left: Vec::with_capacity(frames * params.bands),
        right: Vec::with_capacity(frames * params.bands),
    };

    for ch in 0..2 {
        let signal = if ch == 0 { left } else { right.unwrap_or(left) };

        for frame in 0..frames {
            let offset = frame * params.hop_size;
            for (i, slot) in input.iter_mut().enumerate() {
                *slot = signal[offset + i] * window[i];
            }
            fft.process_with_scratch(&mut input, &mut spectrum, &mut scratch)
                .map_err(|e| EngineError::InvalidArgument(format!("FFT failed: {:?}", e)))?;

            for band in 0..params.bands {
                let mut power_sum = 0.0f64;
                let mut bins = 0usize;
                for k in bin_start[band]..=bin_end[band] {
                    let c = spectrum[k];
                    let mut gain = 1.0f32;
                    if params.a_weighting {
                        let freq = k as f32 * params.sample_rate as f32 / fft_size as f32;
                        gain = a_weight_gain(freq);
                    }
                    power_sum += (c.re * c.re + c.im * c.im) as f64 * (gain as f64) * (gain as f64);
                    bins += 1;
                }
                let mean_power = power_sum / bins.max(1) as f64;
                let rms = mean_power.max(1e-24).sqrt();
                let db = 10.0 * rms.max(1e-24).log10();
                let norm = ((db - DB_MIN) / (DB_MAX - DB_MIN)).clamp(0.0, 1.0);

                if ch == 0 {
                    result.left.push(norm as f32);
                } else {
                    result.right.push(norm as f32);
                }
            }
        }
    }

    Ok(result)
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

/// Coarse IEC-style A-weighting, as a linear gain.
fn a_weight_gain(f: f32) -> f32 {
    let f2 = f * f;
    let r1 = f2 + 20.6 * 20.6;
    let r2 = f2 + 12200.0 * 12200.0;
    let r3 = (f2 + 107.7 * 107.7) * (f2 + 737.9 * 737.9);
    let ra = (12200.0f32 * 12200.0 * f2 * f2) / (r1 * r3.sqrt() * r2 + 1e-20);
    let a_db = 2.0 + 20.0 * (ra + 1e-20).log10();
    10f32.powf(a_db / 20.0)
}

/// Inclusive FFT bin ranges for `bands` log-spaced bands.
fn log_band_bins(sample_rate: u32, fft_size: usize, bands: usize) -> (Vec<usize>, Vec<usize>) {
    let nyquist_bin = fft_size / 2;
    let fmax = sample_rate as f32 / 2.0;
    let log_min = BAND_MIN_HZ.ln();
    let log_max = fmax.max(BAND_MIN_HZ * 2.0).ln();

    let mut starts = Vec::with_capacity(bands);
    let mut ends = Vec::with_capacity(bands);
    for b in 0..bands {
        let t0 = b as f32 / bands as f32;
        let t1 = (b + 1) as f32 / bands as f32;
        let f0 = (log_min + (log_max - log_min) * t0).exp();
        let f1 = (log_min + (log_max - log_min) * t1).exp();

        let k0 = ((f0 * fft_size as f32 / sample_rate as f32).floor() as usize).clamp(1, nyquist_bin);
        let mut k1 = ((f1 * fft_size as f32 / sample_rate as f32).ceil() as usize).min(nyquist_bin);
        if k1 <= k0 {
            k1 = (k0 + 1).min(nyquist_bin);
        }
        starts.push(k0);
        ends.push(k1.max(k0));
    }
    (starts, ends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_capture_short_block_is_zero_padded() {
        let mut meter = LevelMeter::new(4, 2);
        meter.capture(&[0.5, 0.5, -0.5, -0.5]);

        let mut dst = vec![9.0; 8];
        assert_eq!(meter.copy_last(&mut dst, 4), 4);
        assert_eq!(dst, vec![0.5, 0.5, -0.5, -0.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_capture_long_block_keeps_most_recent() {
        let mut meter = LevelMeter::new(2, 1);
        meter.capture(&[1.0, 2.0, 3.0, 4.0]);
        let mut dst = vec![0.0; 2];
        meter.copy_last(&mut dst, 2);
        assert_eq!(dst, vec![3.0, 4.0]);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let mut meter = LevelMeter::new(100, 2);
        meter.capture(&vec![0.5; 200]);
        assert_relative_eq!(meter.rms(), 0.5, epsilon = 1e-9);

        meter.silence();
        assert_eq!(meter.rms(), 0.0);
    }

    #[test]
    fn test_copy_last_respects_destination_size() {
        let meter = LevelMeter::new(16, 2);
        let mut dst = vec![0.0; 5];
        assert_eq!(meter.copy_last(&mut dst, 16), 2);
    }

    #[test]
    fn test_band_analysis_finds_tone_band() {
        let sample_rate = 44100;
        // Quiet enough that no band saturates at 0 dB
        let tone: Vec<f32> = (0..8192)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / sample_rate as f32).sin() * 0.001)
            .collect();
        let params = BandAnalysis { sample_rate, fft_size: 2048, hop_size: 1024, bands: 16, a_weighting: false };

        let spectrum = analyze_bands(&tone, None, &params).unwrap();
        assert_eq!(spectrum.frames, 7);
        assert_eq!(spectrum.left.len(), 7 * 16);
        assert_eq!(spectrum.left, spectrum.right);

        let first_row = &spectrum.left[..16];
        assert!(first_row.iter().all(|&level| level < 1.0));
        let loudest = (1..16).fold(0, |best, i| if first_row[i] > first_row[best] { i } else { best });
        let (starts, ends) = log_band_bins(sample_rate, 2048, 16);
        let tone_bin = (1000.0 * 2048.0 / sample_rate as f32).round() as usize;
        assert!(
            starts[loudest] <= tone_bin && tone_bin <= ends[loudest],
            "tone bin {} outside band {} ({}..={})",
            tone_bin,
            loudest,
            starts[loudest],
            ends[loudest]
        );
    }

    #[test]
    fn test_band_analysis_short_input_has_no_frames() {
        let params = BandAnalysis { sample_rate: 44100, fft_size: 1024, hop_size: 512, bands: 8, a_weighting: true };
        let spectrum = analyze_bands(&[0.0; 100], None, &params).unwrap();
        assert_eq!(spectrum.frames, 0);
    }

    #[test]
    fn test_band_analysis_rejects_bad_params() {
        let params = BandAnalysis { sample_rate: 44100, fft_size: 1024, hop_size: 0, bands: 8, a_weighting: false };
        assert!(matches!(analyze_bands(&[0.0; 2048], None, &params), Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_band_bins_are_in_range() {
        let (starts, ends) = log_band_bins(44100, 512, 64);
        for (s, e) in starts.iter().zip(&ends) {
            assert!(*s >= 1 && s <= e && *e <= 256);
        }
    }
}
