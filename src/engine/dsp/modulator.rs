//! Tempo and pitch modulation via signalsmith-stretch.
//!
//! `StretchModulator` sizes each output block as `input / tempo` and lets the
//! stretcher fill it, so the block length ratio sets the tempo. Pitch is the
//! stretcher's transpose factor. Tempo 1.0 at pitch 0 bypasses the stretcher
//! and passes audio through untouched.
//!
//! Parameter changes never discard audio already sitting in the output queue.
//! Leaving the stretcher (back to unity, or a rebuild for a new profile)
//! flushes its held tail into the queue first.

use std::collections::VecDeque;

use signalsmith_stretch::Stretch;
use tracing::debug;

use crate::engine::dsp::tuning::TuningProfile;

pub trait Modulator: Send {
    /// Queues interleaved input frames and processes whatever is ready.
    fn put_samples(&mut self, samples: &[f32]);

    /// Moves up to `max_frames` processed frames into `out`; returns frames written.
    fn receive_samples(&mut self, out: &mut [f32], max_frames: usize) -> usize;

    /// Drops all queued input, intermediate state and processed output.
    fn clear(&mut self);

    /// Pushes any held-back input through to the output queue (end of stream).
    fn flush(&mut self);

    fn set_tempo(&mut self, tempo: f64);

    fn set_pitch_semitones(&mut self, semitones: f64);

    fn apply_tuning(&mut self, profile: &TuningProfile);

    /// Frames queued but not yet turned into output.
    fn unprocessed_frames(&self) -> usize;

    /// Frames ready to be received.
    fn available_frames(&self) -> usize;
}

pub struct StretchModulator {
    channels: usize,
    sample_rate: u32,
    stretcher: Stretch,
    tempo: f64,
    pitch_semitones: f64,
    /// Profile the stretcher was built from; `None` while on the default preset.
    profile: Option<TuningProfile>,
    /// Fractional output frame carried between blocks.
    out_fract: f64,
    /// Frames fed to the stretcher since its last reset.
    held: usize,
    /// Input too short to yield a whole output frame yet.
    pending: Vec<f32>,
    scratch: Vec<f32>,
    output: VecDeque<f32>,
}

impl StretchModulator {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            sample_rate,
            stretcher: Stretch::preset_default(channels.max(1) as u32, sample_rate),
            tempo: 1.0,
            pitch_semitones: 0.0,
            profile: None,
            out_fract: 0.0,
            held: 0,
            pending: Vec::new(),
            scratch: Vec::new(),
            output: VecDeque::new(),
        }
    }

    fn is_unity(value: f64) -> bool {
        (value - 1.0).abs() < 1e-9
    }

    fn bypassed(&self) -> bool {
        Self::is_unity(self.tempo) && self.pitch_semitones == 0.0
    }

    /// Pads the stretcher with silence so the last real input reaches its
    /// output, flushes it into the queue and resets it.
    fn drain_tail(&mut self) {
        if self.held == 0 && self.pending.is_empty() {
            return;
        }
        let ch = self.channels;

        let mut input = std::mem::take(&mut self.pending);
        let leftover = input.len() / ch;
        let pad = self.stretcher.input_latency();
        input.resize((leftover + pad) * ch, 0.0);
        let pad_out = ((leftover + pad) as f64 / self.tempo).round() as usize;
        if pad_out > 0 {
            self.scratch.clear();
            self.scratch.resize(pad_out * ch, 0.0);
            self.stretcher.process(&input[..], &mut self.scratch[..]);
            self.output.extend(self.scratch.iter().copied());
        }
        input.clear();
        self.pending = input;

        let tail = self.stretcher.output_latency();
        if tail > 0 {
            self.scratch.clear();
            self.scratch.resize(tail * ch, 0.0);
            self.stretcher.flush(&mut self.scratch[..]);
            self.output.extend(self.scratch.iter().copied());
        }

        debug!("Stretcher tail flushed: {} + {} frames", pad_out, tail);
        self.stretcher.reset();
        self.held = 0;
        self.out_fract = 0.0;
    }

    fn rebuild(&mut self, profile: &TuningProfile) {
        let (block, interval) = profile.stretch_lengths(self.sample_rate);
        self.stretcher = Stretch::new(self.channels as u32, block, interval);
        self.stretcher
            .set_transpose_factor_semitones(self.pitch_semitones as f32, None);
        debug!("Stretcher rebuilt: block {} interval {}", block, interval);
    }
}

impl Modulator for StretchModulator {
    fn put_samples(&mut self, samples: &[f32]) {
        let ch = self.channels;
        let frames = samples.len() / ch;
        if frames == 0 {
            return;
        }
        let input = &samples[..frames * ch];

        if self.bypassed() {
            self.output.extend(input.iter().copied());
            return;
        }

        self.pending.extend_from_slice(input);
        self.out_fract += frames as f64 / self.tempo;
        let out_frames = self.out_fract.floor();
        self.out_fract -= out_frames;
        let out_frames = out_frames as usize;
        if out_frames == 0 {
            return;
        }

        self.scratch.clear();
        self.scratch.resize(out_frames * ch, 0.0);
        self.stretcher.process(&self.pending[..], &mut self.scratch[..]);
        self.output.extend(self.scratch.iter().copied());
        self.held += self.pending.len() / ch;
        self.pending.clear();
    }

    fn receive_samples(&mut self, out: &mut [f32], max_frames: usize) -> usize {
        let ch = self.channels;
        let frames = max_frames.min(out.len() / ch).min(self.output.len() / ch);
        for (dst, src) in out[..frames * ch].iter_mut().zip(self.output.drain(..frames * ch)) {
            *dst = src;
        }
        frames
    }

    fn clear(&mut self) {
        self.stretcher.reset();
        self.pending.clear();
        self.output.clear();
        self.held = 0;
        self.out_fract = 0.0;
    }

    fn flush(&mut self) {
        self.drain_tail();
    }

    fn set_tempo(&mut self, tempo: f64) {
        if !tempo.is_finite() || tempo <= 0.0 {
            return;
        }
        if !self.bypassed() && Self::is_unity(tempo) && self.pitch_semitones == 0.0 {
            self.drain_tail();
        }
        self.tempo = tempo;
    }

    fn set_pitch_semitones(&mut self, semitones: f64) {
        if !semitones.is_finite() {
            return;
        }
        if !self.bypassed() && semitones == 0.0 && Self::is_unity(self.tempo) {
            self.drain_tail();
        }
        self.pitch_semitones = semitones;
        self.stretcher
            .set_transpose_factor_semitones(semitones as f32, None);
    }

    fn apply_tuning(&mut self, profile: &TuningProfile) {
        if self.profile.as_ref() == Some(profile) {
            return;
        }
        self.drain_tail();
        self.rebuild(profile);
        self.profile = Some(*profile);
    }

    fn unprocessed_frames(&self) -> usize {
        self.pending.len() / self.channels + self.held.min(self.stretcher.input_latency())
    }

    fn available_frames(&self) -> usize {
        self.output.len() / self.channels
    }
}
