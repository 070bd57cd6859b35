use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::engine::buffer::FrameRingBuffer;
use crate::engine::clock::PlaybackClock;
use crate::engine::dsp::modulator::Modulator;
use crate::engine::meter::LevelMeter;
use crate::engine::modulation::ModulationStage;
use crate::engine::state::{EngineState, WarmupGate};

/// Everything the producer thread, the output callback and the control
/// surface share. Owned by one `PlaybackEngine` and handed out as an `Arc`.
pub struct EngineCore {
    pub config: EngineConfig,
    pub ring: FrameRingBuffer,
    pub clock: PlaybackClock,
    pub state: EngineState,
    pub warmup: WarmupGate,
    pub modulation: Mutex<ModulationStage>,
    pub meter: Mutex<LevelMeter>,
    /// f32 bit pattern; read by the callback without locking.
    volume: AtomicU32,
}

impl EngineCore {
    pub fn new(config: EngineConfig, modulator: Box<dyn Modulator>) -> Self {
        let modulation = ModulationStage::new(modulator, config.default_tempo, config.default_pitch);
        Self {
            ring: FrameRingBuffer::new(config.ring_capacity_frames, config.channels),
            clock: PlaybackClock::new(config.sample_rate),
            state: EngineState::new(),
            warmup: WarmupGate::new(config.warmup_frames),
            modulation: Mutex::new(modulation),
            meter: Mutex::new(LevelMeter::new(config.meter_frames, config.channels)),
            volume: AtomicU32::new(config.default_volume.to_bits()),
            config,
        }
    }

    pub fn channels(&self) -> usize {
        self.config.channels
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Stored as given: gains above 1.0 are allowed and may clip.
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn modulation(&self) -> MutexGuard<'_, ModulationStage> {
        lock(&self.modulation)
    }

    pub fn meter(&self) -> MutexGuard<'_, LevelMeter> {
        lock(&self.meter)
    }

    /// Drops every frame buffered anywhere between the source and the device:
    /// modulator queues, the ring buffer and the metering window.
    pub fn flush_pipeline(&self) {
        self.modulation().clear();
        self.ring.clear();
        self.meter().silence();
    }
}

/// Locks a mutex, recovering the guard if a panicking thread poisoned it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
