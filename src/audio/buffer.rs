//! Lock-free ring buffer for PCM chunks
//!
//! A single-producer single-consumer queue of PCM chunks that hands audio
//! from a capture or generator thread to the streaming tick. The reader
//! side presents the queue as a byte-oriented [`PcmSource`].

use bytes::{Buf, Bytes};
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::source::PcmSource;

/// Lock-free ring buffer of PCM chunks
pub struct PcmRingBuffer {
    queue: ArrayQueue<Bytes>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl PcmRingBuffer {
    /// Create a new ring buffer holding up to `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a chunk into the buffer
    /// Returns false if buffer is full (overflow)
    pub fn push(&self, chunk: Bytes) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a chunk without counting underrun
    pub fn try_pop(&self) -> Option<Bytes> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Chunks currently queued
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn reset_stats(&self) {
        self.overflow_count.store(0, Ordering::Relaxed);
        self.underrun_count.store(0, Ordering::Relaxed);
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedPcmBuffer = Arc<PcmRingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedPcmBuffer {
    Arc::new(PcmRingBuffer::new(capacity))
}

/// Byte reader over a shared ring buffer.
///
/// Keeps the unread tail of the last popped chunk so reads may split
/// chunks at any byte boundary.
pub struct PcmReader {
    buffer: SharedPcmBuffer,
    pending: Bytes,
}

impl PcmReader {
    pub fn new(buffer: SharedPcmBuffer) -> Self {
        Self {
            buffer,
            pending: Bytes::new(),
        }
    }

    /// Bytes held from a partially consumed chunk
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl PcmSource for PcmReader {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            if self.pending.is_empty() {
                match self.buffer.try_pop() {
                    Some(chunk) => self.pending = chunk,
                    None => {
                        self.buffer.underrun_count.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
            let n = self.pending.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
            filled += n;
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = PcmRingBuffer::new(2);

        assert!(buffer.push(Bytes::from_static(&[1, 2, 3])));
        assert!(buffer.push(Bytes::from_static(&[4])));
        assert!(!buffer.push(Bytes::from_static(&[5])));
        assert_eq!(buffer.len(), 2);
        assert!(buffer.is_full());
        assert_eq!(buffer.overflow_count(), 1);

        assert_eq!(buffer.try_pop().unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(buffer.fill_level(), 0.5);
    }

    #[test]
    fn test_reader_splits_chunks() {
        let buffer = create_shared_buffer(8);
        buffer.push(Bytes::from_static(&[1, 2, 3, 4, 5]));
        buffer.push(Bytes::from_static(&[6, 7, 8]));

        let mut reader = PcmReader::new(buffer.clone());
        let mut out = [0u8; 3];
        assert_eq!(reader.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(reader.pending(), 2);

        let mut out = [0u8; 4];
        assert_eq!(reader.read(&mut out), 4);
        assert_eq!(out, [4, 5, 6, 7]);
        assert_eq!(buffer.underrun_count(), 0);
    }

    #[test]
    fn test_reader_short_read_counts_underrun() {
        let buffer = create_shared_buffer(4);
        buffer.push(Bytes::from_static(&[9, 9]));

        let mut reader = PcmReader::new(buffer.clone());
        let mut out = [0u8; 4];
        assert_eq!(reader.read(&mut out), 2);
        assert_eq!(reader.read(&mut out), 0);
        assert_eq!(buffer.underrun_count(), 2);

        buffer.reset_stats();
        assert_eq!(buffer.underrun_count(), 0);
    }
}
