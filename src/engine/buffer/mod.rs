use std::sync::{Mutex, MutexGuard};
use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

/// The Buffer subsystem handles the transport of audio frames between the
/// producer thread and the output callback.
///
/// Storage is a ringbuf `HeapRb` of interleaved samples. Every index-touching
/// operation takes the single lock for its whole duration, so a push or pop is
/// never partially visible and callers never hold the lock across their own
/// retry loops. All operations work on whole frames.
pub struct FrameRingBuffer {
    inner: Mutex<HeapRb<f32>>,
    channels: usize,
}

impl FrameRingBuffer {
    /// Creates an empty buffer holding `capacity_frames` frames of `channels` samples.
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        let capacity_frames = capacity_frames.max(1);
        Self {
            inner: Mutex::new(HeapRb::<f32>::new(capacity_frames * channels)),
            channels,
        }
    }

    /// Writes as many whole frames from `frames` as fit and returns how many were written.
    /// Never overwrites unread data; returns 0 when full or when `frames` holds no whole frame.
    pub fn push(&self, frames: &[f32]) -> usize {
        let offered = frames.len() / self.channels;
        if offered == 0 {
            return 0;
        }

        let mut rb = self.lock();
        let free = rb.vacant_len() / self.channels;
        let to_write = offered.min(free);
        if to_write == 0 {
            return 0;
        }
        let written = rb.push_slice(&frames[..to_write * self.channels]);
        written / self.channels
    }

    /// Reads up to `dst.len() / channels` frames into `dst` and returns how many were read.
    pub fn pop(&self, dst: &mut [f32]) -> usize {
        let wanted = dst.len() / self.channels;
        if wanted == 0 {
            return 0;
        }

        let mut rb = self.lock();
        let available = rb.occupied_len() / self.channels;
        let to_read = wanted.min(available);
        if to_read == 0 {
            return 0;
        }
        let read = rb.pop_slice(&mut dst[..to_read * self.channels]);
        read / self.channels
    }

    /// Discards all buffered frames.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of frames currently buffered.
    pub fn size(&self) -> usize {
        self.lock().occupied_len() / self.channels
    }

    fn lock(&self) -> MutexGuard<'_, HeapRb<f32>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: usize, channels: usize, start: f32) -> Vec<f32> {
        (0..count * channels).map(|i| start + (i / channels) as f32).collect()
    }

    #[test]
    fn test_push_pop_scenario() {
        let buffer = FrameRingBuffer::new(16384, 2);

        let written = buffer.push(&frames(5000, 2, 0.0));
        assert_eq!(written, 5000);
        assert_eq!(buffer.size(), 5000);

        let mut out = vec![0.0; 6000 * 2];
        assert_eq!(buffer.pop(&mut out), 5000);
        assert_eq!(buffer.size(), 0);

        assert_eq!(buffer.pop(&mut out), 0);
    }

    #[test]
    fn test_push_never_overwrites() {
        let buffer = FrameRingBuffer::new(100, 2);
        assert_eq!(buffer.push(&frames(80, 2, 0.0)), 80);
        assert_eq!(buffer.push(&frames(50, 2, 80.0)), 20);
        assert_eq!(buffer.push(&frames(1, 2, 0.0)), 0);
        assert_eq!(buffer.size(), 100);

        let mut out = vec![0.0; 2];
        buffer.pop(&mut out);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_fifo_order_across_wrap() {
        let buffer = FrameRingBuffer::new(8, 2);
        let mut out = vec![0.0; 6 * 2];

        buffer.push(&frames(6, 2, 0.0));
        buffer.pop(&mut out);
        // Head wraps past the end of storage here
        assert_eq!(buffer.push(&frames(6, 2, 100.0)), 6);

        let mut out = vec![0.0; 6 * 2];
        assert_eq!(buffer.pop(&mut out), 6);
        let firsts: Vec<f32> = out.chunks(2).map(|f| f[0]).collect();
        assert_eq!(firsts, vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
    }

    #[test]
    fn test_partial_frames_are_ignored() {
        let buffer = FrameRingBuffer::new(16, 2);
        assert_eq!(buffer.push(&[1.0]), 0);
        assert_eq!(buffer.push(&[1.0, 2.0, 3.0]), 1);
        assert_eq!(buffer.size(), 1);

        let mut dst = [0.0; 1];
        assert_eq!(buffer.pop(&mut dst), 0);
        assert_eq!(buffer.size(), 1);
    }

    #[test]
    fn test_empty_inputs_are_noops() {
        let buffer = FrameRingBuffer::new(16, 2);
        assert_eq!(buffer.push(&[]), 0);
        let mut dst: [f32; 0] = [];
        assert_eq!(buffer.pop(&mut dst), 0);
    }

    #[test]
    fn test_clear_resets_count() {
        let buffer = FrameRingBuffer::new(32, 2);
        buffer.push(&frames(20, 2, 0.0));
        buffer.clear();
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.push(&frames(32, 2, 0.0)), 32);
    }

    #[test]
    fn test_concurrent_producer_consumer_preserves_every_frame() {
        use std::sync::Arc;
        use std::thread;

        let buffer = Arc::new(FrameRingBuffer::new(64, 2));
        let total = 10_000usize;

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let data = frames(total, 2, 0.0);
                let mut offset = 0;
                while offset < total {
                    let n = buffer.push(&data[offset * 2..]);
                    offset += n;
                    if n == 0 {
                        thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(total);
        let mut chunk = vec![0.0; 17 * 2];
        while received.len() < total {
            let n = buffer.pop(&mut chunk);
            received.extend(chunk[..n * 2].chunks(2).map(|f| f[0]));
            if n == 0 {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert!(received.iter().enumerate().all(|(i, v)| *v == i as f32));
    }
}
