use tracing::info;

use crate::engine::dsp::modulator::Modulator;
use crate::engine::dsp::tuning::{clamp_tempo, TuningProfile};

/// The modulation engine handle plus the parameters last applied to it.
///
/// Lives behind the engine's modulation lock; the producer feeds and drains
/// it, the control surface retunes it, seek/open/close clear it.
pub struct ModulationStage {
    modulator: Box<dyn Modulator>,
    tempo: f64,
    pitch: f64,
    profile: TuningProfile,
    default_tempo: f64,
}

impl ModulationStage {
    pub fn new(mut modulator: Box<dyn Modulator>, default_tempo: f64, default_pitch: f64) -> Self {
        let default_tempo = clamp_tempo(default_tempo, 1.0);
        let pitch = if default_pitch.is_finite() { default_pitch } else { 0.0 };
        let profile = TuningProfile::for_tempo(default_tempo);
        modulator.apply_tuning(&profile);
        modulator.set_tempo(default_tempo);
        modulator.set_pitch_semitones(pitch);
        Self {
            modulator,
            tempo: default_tempo,
            pitch,
            profile,
            default_tempo,
        }
    }

    /// Clamps and applies a tempo request, retuning the window profile.
    /// Already-processed output stays queued.
    pub fn set_tempo(&mut self, requested: f64) -> TuningProfile {
        let tempo = clamp_tempo(requested, self.default_tempo);
        self.profile = TuningProfile::for_tempo(tempo);
        self.modulator.apply_tuning(&self.profile);
        self.modulator.set_tempo(tempo);
        self.tempo = tempo;
        info!(
            "tempo={:.3} (requested {:.3}) profile={:?} seq={}ms seek={}ms ovl={}ms quick={}",
            tempo,
            requested,
            self.profile.band,
            self.profile.sequence_ms,
            self.profile.seek_window_ms,
            self.profile.overlap_ms,
            self.profile.quick_seek
        );
        self.profile
    }

    pub fn set_pitch(&mut self, semitones: f64) {
        if !semitones.is_finite() {
            return;
        }
        self.pitch = semitones;
        self.modulator.set_pitch_semitones(semitones);
        info!("pitch={:.3} semitones", semitones);
    }

    pub fn put(&mut self, samples: &[f32]) {
        self.modulator.put_samples(samples);
    }

    pub fn receive(&mut self, out: &mut [f32], max_frames: usize) -> usize {
        self.modulator.receive_samples(out, max_frames)
    }

    pub fn flush(&mut self) {
        self.modulator.flush();
    }

    pub fn clear(&mut self) {
        self.modulator.clear();
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn profile(&self) -> TuningProfile {
        self.profile
    }

    /// Frames held inside the modulator, processed or not.
    pub fn queued_frames(&self) -> usize {
        self.modulator.available_frames() + self.modulator.unprocessed_frames()
    }
}
