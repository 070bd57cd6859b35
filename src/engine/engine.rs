use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::dsp::modulator::{Modulator, StretchModulator};
use crate::engine::meter::{analyze_bands, BandAnalysis, BandSpectrum};
use crate::engine::output::{self, RenderOutcome};
use crate::engine::producer::ProducerLoop;
use crate::engine::shared::{lock, EngineCore};
use crate::engine::source::{DecodedSource, PcmSource};
use crate::error::Result;

const SPECTRUM_FFT_SIZE: usize = 1024;
const SPECTRUM_HOP_SIZE: usize = 512;

/// Transition state owned by open/seek/close. Holding this lock serializes
/// them against each other.
struct Control {
    producer: Option<ProducerLoop>,
    duration_secs: Option<f64>,
}

/// One playback engine: ring buffer, clock, flags, modulation stage and the
/// producer thread, plus the seek/open/close coordinator.
///
/// Share it as `Arc<PlaybackEngine>` between the control surface and the
/// output device callback, which calls [`PlaybackEngine::render`].
pub struct PlaybackEngine {
    core: Arc<EngineCore>,
    control: Mutex<Control>,
}

impl PlaybackEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let modulator = StretchModulator::new(config.sample_rate, config.channels);
        Self::with_modulator(config, Box::new(modulator))
    }

    pub fn with_modulator(config: EngineConfig, modulator: Box<dyn Modulator>) -> Result<Self> {
        config.validate()?;
        info!(
            "Engine created: {}Hz, {}ch, ring {} frames, warmup {} frames",
            config.sample_rate, config.channels, config.ring_capacity_frames, config.warmup_frames
        );
        Ok(Self {
            core: Arc::new(EngineCore::new(config, modulator)),
            control: Mutex::new(Control {
                producer: None,
                duration_secs: None,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Opens a media file through the symphonia decode path. Returns false
    /// (and closes whatever was open) if the file cannot be decoded.
    pub fn open_path<P: AsRef<Path>>(&self, path: P) -> bool {
        if !self.core.state.is_created() {
            return false;
        }
        let path = path.as_ref();

        let config = &self.core.config;
        match DecodedSource::open(path, config.sample_rate, config.channels) {
            Ok(source) => {
                let opened = self.open_source(Box::new(source));
                if opened {
                    info!("Opened {}", path.display());
                }
                opened
            }
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                self.close();
                false
            }
        }
    }

    /// Replaces whatever is open with `source`, positioned at zero and paused.
    pub fn open_source(&self, source: Box<dyn PcmSource>) -> bool {
        if !self.core.state.is_created() {
            return false;
        }
        let mut control = self.control();
        self.close_locked(&mut control);

        let core = &self.core;
        core.state.set_paused(true);
        core.flush_pipeline();
        core.clock.reset_to(0);
        core.warmup.engage();

        let duration_secs = source.duration_secs();
        match ProducerLoop::spawn(core.clone(), source) {
            Ok(producer) => {
                control.producer = Some(producer);
                control.duration_secs = duration_secs;
                core.state.set_file_open(true);
                debug!("Source opened, duration {:?}s", duration_secs);
                true
            }
            Err(e) => {
                warn!("Failed to start producer: {}", e);
                core.warmup.disengage();
                false
            }
        }
    }

    pub fn close(&self) {
        if !self.core.state.is_created() {
            return;
        }
        let mut control = self.control();
        self.close_locked(&mut control);
    }

    fn close_locked(&self, control: &mut Control) {
        let core = &self.core;
        let had_file = core.state.is_file_open();

        core.state.set_paused(true);
        if let Some(producer) = control.producer.take() {
            producer.stop(core.config.join_warn());
        }
        core.state.set_file_open(false);
        core.flush_pipeline();
        core.clock.reset_to(0);
        core.warmup.disengage();
        control.duration_secs = None;

        if had_file {
            info!("Closed");
        }
    }

    /// Moves playback to `position_ms`. The clock reads the new position as
    /// soon as this returns; output stays silent until the warmup cushion is
    /// rebuilt. The paused state is preserved.
    pub fn seek(&self, position_ms: f64) {
        if !self.core.state.is_created() {
            return;
        }
        let mut control = self.control();
        let core = &self.core;
        if !core.state.is_file_open() {
            debug!("Seek ignored, no file open");
            return;
        }

        let position_ms = if position_ms.is_finite() { position_ms.max(0.0) } else { 0.0 };
        info!("Seek to {:.0}ms", position_ms);

        let was_paused = core.state.is_paused();
        core.state.set_paused(true);

        let Some(mut source) = control.producer.take().and_then(|p| p.stop(core.config.join_warn())) else {
            warn!("Producer lost its source; closing");
            self.close_locked(&mut control);
            return;
        };

        if !source.relocate(position_ms / 1000.0) {
            warn!("Source refused relocation to {:.0}ms", position_ms);
        }
        core.flush_pipeline();
        core.clock.reset_to(core.config.ms_to_frames(position_ms));
        core.warmup.engage();

        match ProducerLoop::spawn(core.clone(), source) {
            Ok(producer) => control.producer = Some(producer),
            Err(e) => {
                warn!("Failed to restart producer after seek: {}", e);
                self.close_locked(&mut control);
                return;
            }
        }

        core.state.set_paused(was_paused);
    }

    pub fn play(&self) {
        if !self.core.state.is_created() {
            return;
        }
        if !self.core.state.is_file_open() {
            debug!("Play with no file open");
        }
        self.core.state.set_paused(false);
        debug!("Play");
    }

    pub fn pause(&self) {
        if !self.core.state.is_created() {
            return;
        }
        self.core.state.set_paused(true);
        debug!("Pause");
    }

    /// Clamped to [0.5, 1.7]; non-finite or non-positive requests fall back
    /// to the configured default tempo.
    pub fn set_tempo(&self, tempo: f64) {
        if !self.core.state.is_created() {
            return;
        }
        self.core.modulation().set_tempo(tempo);
    }

    pub fn set_pitch(&self, semitones: f64) {
        if !self.core.state.is_created() {
            return;
        }
        self.core.modulation().set_pitch(semitones);
    }

    /// Linear gain applied by the output callback. Not clamped.
    pub fn set_volume(&self, volume: f32) {
        if !self.core.state.is_created() || !volume.is_finite() {
            return;
        }
        self.core.set_volume(volume);
        info!("volume={:.3}", volume);
    }

    pub fn tempo(&self) -> f64 {
        self.core.modulation().tempo()
    }

    pub fn pitch(&self) -> f64 {
        self.core.modulation().pitch()
    }

    pub fn volume(&self) -> f32 {
        self.core.volume()
    }

    /// Frames delivered to the device since the last open or seek target.
    pub fn position_frames(&self) -> u64 {
        self.core.clock.frames()
    }

    pub fn position_ms(&self) -> f64 {
        self.core.clock.millis()
    }

    pub fn position_secs(&self) -> f64 {
        self.core.clock.secs()
    }

    /// Length of the open source, or 0 when closed or unknown.
    pub fn duration_ms(&self) -> f64 {
        self.control().duration_secs.map_or(0.0, |secs| secs * 1000.0)
    }

    pub fn buffered_frames(&self) -> usize {
        self.core.ring.size()
    }

    pub fn is_playing(&self) -> bool {
        self.core.state.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.core.state.is_paused()
    }

    pub fn is_file_open(&self) -> bool {
        self.core.state.is_file_open()
    }

    pub fn is_created(&self) -> bool {
        self.core.state.is_created()
    }

    /// Copies up to `max_frames` frames of the most recent output into `dst`.
    pub fn copy_last_buffer(&self, dst: &mut [f32], max_frames: usize) -> usize {
        self.core.meter().copy_last(dst, max_frames)
    }

    pub fn rms_level(&self) -> f64 {
        self.core.meter().rms()
    }

    /// A-weighted log-band spectrum of the metering window.
    pub fn spectrum(&self, bands: usize) -> Result<BandSpectrum> {
        let (left, right) = self.core.meter().split_stereo();
        let params = BandAnalysis {
            sample_rate: self.core.config.sample_rate,
            fft_size: SPECTRUM_FFT_SIZE,
            hop_size: SPECTRUM_HOP_SIZE,
            bands,
            a_weighting: true,
        };
        analyze_bands(&left, Some(right.as_slice()), &params)
    }

    /// Output device callback: fills `out` with interleaved frames.
    pub fn render(&self, out: &mut [f32]) -> RenderOutcome {
        output::render(&self.core, out)
    }

    /// Closes any open file and retires the engine. Every later call is a no-op.
    pub fn dispose(&self) {
        if !self.core.state.is_created() {
            return;
        }
        let mut control = self.control();
        self.close_locked(&mut control);
        self.core.state.mark_disposed();
        info!("Engine disposed");
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        lock(&self.control)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
