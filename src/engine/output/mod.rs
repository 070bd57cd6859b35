pub mod cpal_backend;

use std::sync::TryLockError;

use tracing::trace;

use crate::engine::shared::EngineCore;
use crate::error::Result;

pub trait AudioOutput {
    /// Starts the audio output stream.
    fn start(&mut self) -> Result<()>;

    /// Pauses the audio output stream.
    fn pause(&mut self) -> Result<()>;

    /// Stops the audio output stream.
    fn stop(&mut self) -> Result<()>;
}

/// Why a render call produced only silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceReason {
    Paused,
    NoFile,
    Warmup,
    Underflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Silence(SilenceReason),
    /// `frames` real frames were written; the rest of the block is padding.
    Delivered { frames: usize },
}

/// Fills one device block of interleaved f32 frames.
///
/// Never blocks: the ring pop takes only the ring's own lock and the metering
/// snapshot is skipped if a reader holds the meter.
pub fn render(core: &EngineCore, out: &mut [f32]) -> RenderOutcome {
    let ch = core.channels();
    let requested = out.len() / ch;

    if core.state.is_paused() {
        return silence(core, out, SilenceReason::Paused);
    }
    if !core.state.is_file_open() {
        return silence(core, out, SilenceReason::NoFile);
    }

    if core.warmup.is_engaged() {
        let buffered = core.ring.size();
        if !core.warmup.try_release(buffered) {
            return silence(core, out, SilenceReason::Warmup);
        }
        trace!("Warmup released with {} frames buffered", buffered);
    }

    let received = core.ring.pop(&mut out[..requested * ch]);
    if received == 0 {
        return silence(core, out, SilenceReason::Underflow);
    }

    let volume = core.volume();
    let delivered = received * ch;
    if volume != 1.0 {
        out[..delivered].iter_mut().for_each(|s| *s *= volume);
    }
    out[delivered..].fill(0.0);

    core.clock.advance(received as u64);

    match core.meter.try_lock() {
        Ok(mut meter) => meter.capture(&out[..delivered]),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().capture(&out[..delivered]),
        Err(TryLockError::WouldBlock) => {}
    }

    RenderOutcome::Delivered { frames: received }
}

fn silence(core: &EngineCore, out: &mut [f32], reason: SilenceReason) -> RenderOutcome {
    out.fill(0.0);
    match core.meter.try_lock() {
        Ok(mut meter) => meter.silence(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().silence(),
        Err(TryLockError::WouldBlock) => {}
    }
    RenderOutcome::Silence(reason)
}
