//! Tempo-dependent window tuning for the stretcher.
//!
//! The tempo range is split into three bands with fixed window settings. The
//! mapping is a pure function of the clamped tempo so every request lands in
//! exactly one band.

pub const MIN_TEMPO: f64 = 0.50;
pub const MAX_TEMPO: f64 = 1.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningBand {
    /// Near original speed: longest windows, most natural tone.
    Quality,
    /// Practice speeds and faster-than-original playback.
    Balanced,
    /// Extreme slow-down: keeps rhythm tight at some smoothness cost.
    Accuracy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningProfile {
    pub band: TuningBand,
    pub sequence_ms: f32,
    pub seek_window_ms: f32,
    pub overlap_ms: f32,
    pub quick_seek: bool,
}

impl TuningProfile {
    pub const QUALITY: TuningProfile = TuningProfile {
        band: TuningBand::Quality,
        sequence_ms: 60.0,
        seek_window_ms: 26.0,
        overlap_ms: 10.0,
        quick_seek: true,
    };

    pub const BALANCED: TuningProfile = TuningProfile {
        band: TuningBand::Balanced,
        sequence_ms: 45.0,
        seek_window_ms: 20.0,
        overlap_ms: 9.0,
        quick_seek: true,
    };

    pub const ACCURACY: TuningProfile = TuningProfile {
        band: TuningBand::Accuracy,
        sequence_ms: 36.0,
        seek_window_ms: 18.0,
        overlap_ms: 9.0,
        quick_seek: false,
    };

    /// Selects the profile for an already clamped tempo.
    pub fn for_tempo(tempo: f64) -> TuningProfile {
        let t = tempo.clamp(MIN_TEMPO, MAX_TEMPO);
        if (0.90..=1.10).contains(&t) {
            Self::QUALITY
        } else if t >= 0.75 {
            Self::BALANCED
        } else {
            Self::ACCURACY
        }
    }

    /// Window lengths in frames at `sample_rate`: (sequence, seek window, overlap).
    pub fn frame_lengths(&self, sample_rate: u32) -> (usize, usize, usize) {
        let to_frames = |ms: f32| ((ms as f64 * sample_rate as f64 / 1000.0) as usize).max(1);
        let overlap = to_frames(self.overlap_ms);
        let seek = to_frames(self.seek_window_ms);
        // A sequence must hold both crossfade regions.
        let sequence = to_frames(self.sequence_ms).max(2 * overlap + 1);
        (sequence, seek, overlap)
    }

    /// Stretcher (block, interval) in frames. A block spans two sequences;
    /// the hop is the overlap, doubled under quick seek.
    pub fn stretch_lengths(&self, sample_rate: u32) -> (usize, usize) {
        let (sequence, _, overlap) = self.frame_lengths(sample_rate);
        let interval = if self.quick_seek { overlap * 2 } else { overlap };
        (sequence * 2, interval)
    }
}

/// Clamps a tempo request into the supported range. Non-positive or
/// non-finite requests fall back to `fallback`.
pub fn clamp_tempo(requested: f64, fallback: f64) -> f64 {
    let tempo = if requested.is_finite() && requested > 0.0 {
        requested
    } else {
        fallback
    };
    tempo.clamp(MIN_TEMPO, MAX_TEMPO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(TuningProfile::for_tempo(1.10).band, TuningBand::Quality);
        assert_eq!(TuningProfile::for_tempo(0.90).band, TuningBand::Quality);
        assert_eq!(TuningProfile::for_tempo(1.0).band, TuningBand::Quality);
        assert_eq!(TuningProfile::for_tempo(0.8999).band, TuningBand::Balanced);
        assert_eq!(TuningProfile::for_tempo(0.75).band, TuningBand::Balanced);
        assert_eq!(TuningProfile::for_tempo(0.7499).band, TuningBand::Accuracy);
        assert_eq!(TuningProfile::for_tempo(0.50).band, TuningBand::Accuracy);
    }

    #[test]
    fn test_fast_tempos_use_balanced_profile() {
        assert_eq!(TuningProfile::for_tempo(1.1001).band, TuningBand::Balanced);
        assert_eq!(TuningProfile::for_tempo(1.70).band, TuningBand::Balanced);
    }

    #[test]
    fn test_quick_seek_only_disabled_for_accuracy() {
        assert!(TuningProfile::for_tempo(1.0).quick_seek);
        assert!(TuningProfile::for_tempo(0.8).quick_seek);
        assert!(!TuningProfile::for_tempo(0.6).quick_seek);
    }

    #[test]
    fn test_out_of_range_tempo_is_clamped() {
        assert_eq!(clamp_tempo(0.2, 1.0), MIN_TEMPO);
        assert_eq!(clamp_tempo(3.0, 1.0), MAX_TEMPO);
        assert_eq!(clamp_tempo(1.25, 1.0), 1.25);
        assert_eq!(clamp_tempo(0.0, 1.0), 1.0);
        assert_eq!(clamp_tempo(-2.0, 1.0), 1.0);
        assert_eq!(clamp_tempo(f64::NAN, 1.0), 1.0);
        assert_eq!(TuningProfile::for_tempo(0.1).band, TuningBand::Accuracy);
    }

    #[test]
    fn test_frame_lengths_at_44100() {
        let (sequence, seek, overlap) = TuningProfile::QUALITY.frame_lengths(44100);
        assert_eq!(sequence, 2646);
        assert_eq!(seek, 1146);
        assert_eq!(overlap, 441);
    }

    #[test]
    fn test_stretch_lengths_follow_profile() {
        assert_eq!(TuningProfile::QUALITY.stretch_lengths(44100), (5292, 882));
        assert_eq!(TuningProfile::ACCURACY.stretch_lengths(44100), (3174, 396));
    }
}
