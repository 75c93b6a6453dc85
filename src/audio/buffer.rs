use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;
use parking_lot::Mutex;

/// Thread-safe ring buffer carrying scheduled playback samples to the
/// output stream callback.
///
/// Unlike a capture buffer, scheduled audio must never be overwritten:
/// on overflow the excess is rejected and reported to the caller.
pub struct AudioRingBuffer {
    buffer: Arc<Mutex<HeapRb<f32>>>,
}

impl AudioRingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(capacity))),
        }
    }

    /// Write samples to the buffer
    /// Returns the number of samples actually written
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let mut written = 0;

        for &sample in samples {
            if buffer.try_push(sample).is_ok() {
                written += 1;
            } else {
                break;
            }
        }

        written
    }

    /// Read up to `count` samples from the buffer
    pub fn read(&self, count: usize) -> Vec<f32> {
        let mut buffer = self.buffer.lock();
        let mut samples = Vec::with_capacity(count);

        for _ in 0..count {
            if let Some(sample) = buffer.try_pop() {
                samples.push(sample);
            } else {
                break;
            }
        }

        samples
    }

    /// Read samples directly into an output slice, zero-filling any
    /// shortfall. Returns how many real samples were written.
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let mut filled = 0;

        for slot in out.iter_mut() {
            match buffer.try_pop() {
                Some(sample) => {
                    *slot = sample;
                    filled += 1;
                }
                None => *slot = 0.0,
            }
        }

        filled
    }

    /// Get the number of samples available to read
    pub fn len(&self) -> usize {
        self.buffer.lock().occupied_len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Clear the buffer
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    /// Get the capacity of the buffer
    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity().get()
    }
}

impl Clone for AudioRingBuffer {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read() {
        let buffer = AudioRingBuffer::new(1024);
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();

        let written = buffer.write(&data);
        assert_eq!(written, 100);

        let read_data = buffer.read(100);
        assert_eq!(read_data.len(), 100);
        assert_eq!(read_data, data);
    }

    #[test]
    fn test_overflow_rejects_excess() {
        let buffer = AudioRingBuffer::new(10);
        let data: Vec<f32> = (0..20).map(|i| i as f32).collect();

        let written = buffer.write(&data);
        assert_eq!(written, 10);

        // The first 10 samples survive untouched
        let read_data = buffer.read(20);
        assert_eq!(read_data, data[..10].to_vec());
    }

    #[test]
    fn test_read_into_zero_fills() {
        let buffer = AudioRingBuffer::new(16);
        buffer.write(&[1.0, 2.0]);

        let mut out = [9.0f32; 4];
        let filled = buffer.read_into(&mut out);
        assert_eq!(filled, 2);
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0]);
    }
}
