use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::shared::EngineCore;
use crate::engine::source::PcmSource;
use crate::error::Result;

/// Background thread that keeps the ring buffer fed.
///
/// Pulls converted PCM from the source, runs it through the modulation stage
/// and pushes the modulated frames into the ring. Owns the source while it
/// runs and hands it back when stopped, so the coordinator can relocate it
/// and start a fresh loop.
pub struct ProducerLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Box<dyn PcmSource>>>,
}

impl ProducerLoop {
    pub fn spawn(core: Arc<EngineCore>, source: Box<dyn PcmSource>) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("tempo-sync-producer".to_string())
            .spawn(move || run(core, source, flag))?;

        debug!("Producer thread started");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Signals the loop to stop and joins it, returning the source.
    ///
    /// The join is unconditional. If the thread is still alive after
    /// `warn_after` a warning is logged and the wait continues.
    pub fn stop(mut self, warn_after: Duration) -> Option<Box<dyn PcmSource>> {
        self.shutdown(warn_after)
    }

    fn shutdown(&mut self, warn_after: Duration) -> Option<Box<dyn PcmSource>> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;

        let started = Instant::now();
        let mut warned = false;
        while !handle.is_finished() {
            if !warned && started.elapsed() >= warn_after {
                warn!("Producer thread still running after {:?}, waiting", warn_after);
                warned = true;
            }
            thread::sleep(Duration::from_millis(1));
        }

        match handle.join() {
            Ok(source) => {
                debug!("Producer thread stopped after {:?}", started.elapsed());
                Some(source)
            }
            Err(_) => {
                warn!("Producer thread panicked; source dropped");
                None
            }
        }
    }
}

impl Drop for ProducerLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown(Duration::from_millis(250));
        }
    }
}

fn run(core: Arc<EngineCore>, mut source: Box<dyn PcmSource>, running: Arc<AtomicBool>) -> Box<dyn PcmSource> {
    let idle = core.config.idle_sleep();
    let backoff = core.config.backpressure_sleep();
    let mut scratch = vec![0.0f32; core.config.drain_chunk_frames * core.channels()];
    let mut at_end = false;

    while running.load(Ordering::Acquire) {
        if !core.state.is_playing() {
            thread::sleep(idle);
            continue;
        }

        if core.ring.size() > core.config.high_watermark_frames {
            thread::sleep(backoff);
            continue;
        }

        match source.next_chunk() {
            Some(chunk) => {
                at_end = false;
                core.modulation().put(&chunk);
                drain(&core, &running, &mut scratch);
            }
            None => {
                if !at_end {
                    at_end = true;
                    core.modulation().flush();
                    info!("End of stream");
                }
                if drain(&core, &running, &mut scratch) == 0 {
                    thread::sleep(idle);
                }
            }
        }
    }

    source
}

/// Moves everything the modulator has ready into the ring buffer, one
/// `drain_chunk_frames` block at a time. Returns frames pushed.
///
/// A block that does not fit is retried after a short sleep. It is abandoned
/// only if the loop is stopped, paused or the file closed.
fn drain(core: &EngineCore, running: &AtomicBool, scratch: &mut [f32]) -> usize {
    let ch = core.channels();
    let chunk_frames = scratch.len() / ch;
    let backoff = core.config.backpressure_sleep();
    let mut total = 0;

    loop {
        let received = core.modulation().receive(scratch, chunk_frames);
        if received == 0 {
            return total;
        }

        let block = &scratch[..received * ch];
        let mut offset = 0;
        while offset < received {
            let written = core.ring.push(&block[offset * ch..]);
            offset += written;
            total += written;
            if offset < received {
                if !running.load(Ordering::Acquire) || !core.state.is_playing() {
                    debug!("Dropping {} modulated frames on transition", received - offset);
                    return total;
                }
                thread::sleep(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::dsp::modulator::StretchModulator;
    use crate::engine::source::MemorySource;

    fn config(capacity: usize) -> EngineConfig {
        EngineConfig {
            ring_capacity_frames: capacity,
            high_watermark_frames: capacity * 3 / 4,
            warmup_frames: 0,
            drain_chunk_frames: 256,
            idle_sleep_ms: 1,
            backpressure_sleep_ms: 1,
            ..EngineConfig::default()
        }
    }

    fn core_with(config: EngineConfig) -> Arc<EngineCore> {
        let modulator = StretchModulator::new(config.sample_rate, config.channels);
        Arc::new(EngineCore::new(config, Box::new(modulator)))
    }

    fn core(capacity: usize) -> Arc<EngineCore> {
        core_with(config(capacity))
    }

    fn wait_until(what: &str, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames * 2).map(|i| (i / 2) as f32).collect()
    }

    #[test]
    fn test_every_frame_reaches_the_consumer() {
        let core = core(1024);
        core.state.set_file_open(true);
        core.state.set_paused(false);

        let total = 20_000;
        let source = MemorySource::new(ramp(total), 44100, 2, 700);
        let producer = ProducerLoop::spawn(core.clone(), Box::new(source)).unwrap();

        let mut received = Vec::with_capacity(total);
        let mut block = vec![0.0; 300 * 2];
        let deadline = Instant::now() + Duration::from_secs(10);
        while received.len() < total && Instant::now() < deadline {
            let n = core.ring.pop(&mut block);
            received.extend(block[..n * 2].chunks(2).map(|f| f[0]));
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        producer.stop(Duration::from_secs(1)).unwrap();

        assert_eq!(received.len(), total);
        assert!(received.iter().enumerate().all(|(i, v)| *v == i as f32));
    }

    #[test]
    fn test_paused_loop_does_not_decode() {
        let core = core(1024);
        core.state.set_file_open(true);

        let source = MemorySource::new(ramp(4096), 44100, 2, 512);
        let producer = ProducerLoop::spawn(core.clone(), Box::new(source)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(core.ring.size(), 0);

        let mut source = producer.stop(Duration::from_secs(1)).unwrap();
        // Nothing was consumed from the source while paused
        assert_eq!(source.next_chunk().map(|c| c.len()), Some(512 * 2));
    }

    #[test]
    fn test_backpressure_bounds_buffered_frames() {
        let core = core(1024);
        core.state.set_file_open(true);
        core.state.set_paused(false);

        let source = MemorySource::new(ramp(44100), 44100, 2, 128);
        let producer = ProducerLoop::spawn(core.clone(), Box::new(source)).unwrap();
        thread::sleep(Duration::from_millis(50));

        // The producer stops pulling at the watermark; the ring never overfills
        assert!(core.ring.size() > 768);
        assert!(core.ring.size() <= 1024);
        producer.stop(Duration::from_secs(1));
    }

    #[test]
    fn test_pause_abandons_block_stuck_on_full_ring() {
        let core = core(256);
        core.state.set_file_open(true);
        core.state.set_paused(false);

        // One chunk four times the ring: the second 256-frame block cannot fit
        let source = MemorySource::new(ramp(1024), 44100, 2, 1024);
        let producer = ProducerLoop::spawn(core.clone(), Box::new(source)).unwrap();
        wait_until("a full ring", || core.ring.size() == 256);
        thread::sleep(Duration::from_millis(10));

        core.state.set_paused(true);
        thread::sleep(Duration::from_millis(20));

        let mut block = vec![0.0; 1024 * 2];
        assert_eq!(core.ring.pop(&mut block), 256);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(core.ring.size(), 0);
        // The stuck block was dropped; the rest stays in the modulator
        assert_eq!(core.modulation().queued_frames(), 512);

        let started = Instant::now();
        assert!(producer.stop(Duration::from_secs(1)).is_some());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_stop_waits_out_a_slow_loop() {
        let core = core_with(EngineConfig {
            idle_sleep_ms: 100,
            ..config(1024)
        });
        core.state.set_file_open(true);

        let source = MemorySource::new(ramp(2048), 44100, 2, 512);
        let producer = ProducerLoop::spawn(core.clone(), Box::new(source)).unwrap();
        thread::sleep(Duration::from_millis(20));

        // Zero grace: the warning fires and the join still completes
        let started = Instant::now();
        let mut source = producer.stop(Duration::ZERO).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(source.next_chunk().map(|c| c.len()), Some(512 * 2));
    }
}
