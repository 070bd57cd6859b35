//! Engine lifecycle flags and the post-discontinuity warmup gate.
//!
//! These are plain atomics: the producer and the output callback read them
//! without locking. Transitions that must be observed together (seek, open,
//! close) are serialized by the engine's control lock, not here.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct EngineState {
    paused: AtomicBool,
    file_open: AtomicBool,
    created: AtomicBool,
}

impl EngineState {
    /// A freshly created engine: alive, paused, no file.
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(true),
            file_open: AtomicBool::new(false),
            created: AtomicBool::new(true),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_file_open(&self) -> bool {
        self.file_open.load(Ordering::Acquire)
    }

    pub fn set_file_open(&self, open: bool) {
        self.file_open.store(open, Ordering::Release);
    }

    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::Acquire)
    }

    pub fn mark_disposed(&self) {
        self.created.store(false, Ordering::Release);
    }

    /// True when the callback should be delivering audio.
    pub fn is_playing(&self) -> bool {
        !self.is_paused() && self.is_file_open()
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Forces silence after open/seek until `threshold` frames are buffered.
#[derive(Debug)]
pub struct WarmupGate {
    needs_warmup: AtomicBool,
    threshold: usize,
}

impl WarmupGate {
    pub fn new(threshold: usize) -> Self {
        Self {
            needs_warmup: AtomicBool::new(false),
            threshold,
        }
    }

    pub fn engage(&self) {
        self.needs_warmup.store(true, Ordering::Release);
    }

    pub fn disengage(&self) {
        self.needs_warmup.store(false, Ordering::Release);
    }

    pub fn is_engaged(&self) -> bool {
        self.needs_warmup.load(Ordering::Acquire)
    }

    /// Called by the output callback with the current buffered frame count.
    /// Returns true when output may proceed; the gate clears itself the first
    /// time the cushion is reached.
    pub fn try_release(&self, buffered: usize) -> bool {
        if !self.is_engaged() {
            return true;
        }
        if buffered < self.threshold {
            return false;
        }
        self.needs_warmup.store(false, Ordering::Release);
        true
    }
}
