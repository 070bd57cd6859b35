use std::sync::atomic::{AtomicU64, Ordering};

/// The PlaybackClock is the timing authority of the engine: a count of frames
/// that have actually been handed to the output device.
///
/// Only the output callback advances it, and only by the number of real frames
/// it delivered. Open, seek and close reset it directly.
pub struct PlaybackClock {
    /// Frames delivered to the device since the last reset.
    frames: AtomicU64,
    sample_rate: u32,
}

impl PlaybackClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: sample_rate.max(1),
        }
    }

    /// Returns the current playback position in frames.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Advances the position by frames that were just delivered.
    pub fn advance(&self, delivered: u64) {
        if delivered > 0 {
            self.frames.fetch_add(delivered, Ordering::AcqRel);
        }
    }

    /// Overwrites the position (open, seek and close only).
    pub fn reset_to(&self, frames: u64) {
        self.frames.store(frames, Ordering::Release);
    }

    /// Returns the current playback position in seconds.
    pub fn secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn millis(&self) -> f64 {
        self.secs() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_accumulates_delivered_frames() {
        let clock = PlaybackClock::new(44100);
        clock.advance(512);
        clock.advance(0);
        clock.advance(300);
        assert_eq!(clock.frames(), 812);
    }

    #[test]
    fn test_reset_and_conversions() {
        let clock = PlaybackClock::new(44100);
        clock.advance(1000);
        clock.reset_to(44100 * 2);
        assert_eq!(clock.frames(), 88200);
        assert_eq!(clock.secs(), 2.0);
        assert_eq!(clock.millis(), 2000.0);
    }
}
