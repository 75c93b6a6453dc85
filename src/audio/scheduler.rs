//! Gapless scheduling of synthesized audio chunks.
//!
//! Chunks arrive from the service with network jitter. Playback keeps a
//! single non-decreasing cursor: each chunk starts at `max(cursor, now)`
//! and the cursor then advances by the chunk's duration, so chunks play
//! back-to-back in arrival order, and the cursor snaps forward to the
//! output clock if arrivals fall behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::audio::buffer::AudioRingBuffer;
use crate::audio::codec::duration_secs;

/// Monotonic output clock, advanced by the output stream callback for
/// every rendered frame (silence included), like an audio-context time.
#[derive(Clone)]
pub struct PlaybackClock {
    rendered_frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl PlaybackClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            rendered_frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Called from the output callback with the number of frames rendered
    pub fn advance(&self, frames: u64) {
        self.rendered_frames.fetch_add(frames, Ordering::Relaxed);
    }

    /// Current output time in seconds
    pub fn now_secs(&self) -> f64 {
        self.rendered_frames.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Where the next chunk will begin, given the cursor and the output clock
fn next_start(cursor: f64, now: f64) -> f64 {
    cursor.max(now)
}

/// Schedules decoded chunks into the playback queue, maintaining the
/// next-start cursor.
pub struct PlaybackScheduler {
    clock: PlaybackClock,
    queue: AudioRingBuffer,
    cursor: Mutex<f64>,
}

impl PlaybackScheduler {
    pub fn new(clock: PlaybackClock, queue: AudioRingBuffer) -> Self {
        Self {
            clock,
            queue,
            cursor: Mutex::new(0.0),
        }
    }

    /// Queue a decoded chunk for playback, returning its start time.
    ///
    /// The queue is FIFO and the output callback renders silence when it
    /// runs dry, so appending here is exactly back-to-back scheduling.
    pub fn schedule(&self, samples: &[f32]) -> f64 {
        let start = self.schedule_at(self.clock.now_secs(), samples.len());

        let written = self.queue.write(samples);
        if written < samples.len() {
            warn!(
                "Playback queue full, dropped {} of {} samples",
                samples.len() - written,
                samples.len()
            );
        }

        start
    }

    /// Advance the cursor for a chunk of `sample_count` frames arriving at
    /// output time `now`. Split out from `schedule` so the cursor policy is
    /// testable without an audio device.
    pub fn schedule_at(&self, now: f64, sample_count: usize) -> f64 {
        let mut cursor = self.cursor.lock();
        let start = next_start(*cursor, now);
        *cursor = start + duration_secs(sample_count, self.clock.sample_rate());
        start
    }

    /// Next scheduled start time in seconds
    pub fn cursor_secs(&self) -> f64 {
        *self.cursor.lock()
    }

    /// Drop queued audio and rewind the cursor to the output clock
    pub fn reset(&self) {
        self.queue.clear();
        *self.cursor.lock() = self.clock.now_secs();
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PLAYBACK_SAMPLE_RATE;

    fn scheduler() -> PlaybackScheduler {
        let clock = PlaybackClock::new(PLAYBACK_SAMPLE_RATE);
        let queue = AudioRingBuffer::new(PLAYBACK_SAMPLE_RATE as usize * 10);
        PlaybackScheduler::new(clock, queue)
    }

    #[test]
    fn test_chunks_schedule_back_to_back() {
        let sched = scheduler();

        // Durations: 0.5s, 0.25s, 1.0s, all arriving before the previous
        // chunk's scheduled end (now stays at 0)
        let d1 = 12_000;
        let d2 = 6_000;
        let d3 = 24_000;

        assert_eq!(sched.schedule_at(0.0, d1), 0.0);
        assert!((sched.schedule_at(0.0, d2) - 0.5).abs() < 1e-9);
        assert!((sched.schedule_at(0.0, d3) - 0.75).abs() < 1e-9);
        assert!((sched.cursor_secs() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn test_late_chunk_snaps_to_clock() {
        let sched = scheduler();

        sched.schedule_at(0.0, 12_000); // cursor = 0.5

        // Arrival after the queue drained: clock is ahead of the cursor
        let start = sched.schedule_at(2.0, 12_000);
        assert!((start - 2.0).abs() < 1e-9);
        assert!((sched.cursor_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let sched = scheduler();

        let mut last = 0.0;
        for (now, count) in [(0.0, 6_000), (0.1, 6_000), (0.05, 6_000), (3.0, 6_000)] {
            let start = sched.schedule_at(now, count);
            assert!(start >= last);
            last = start;
        }
    }

    #[test]
    fn test_schedule_writes_queue() {
        let sched = scheduler();
        sched.schedule(&[0.1f32; 480]);
        assert_eq!(sched.queue.len(), 480);

        sched.reset();
        assert!(sched.queue.is_empty());
    }

    #[test]
    fn test_reset_rewinds_cursor_to_clock() {
        let sched = scheduler();
        sched.schedule_at(0.0, 48_000);
        assert!(sched.cursor_secs() > 1.9);

        sched.reset();
        assert!(sched.cursor_secs() < 1e-9);
    }
}
