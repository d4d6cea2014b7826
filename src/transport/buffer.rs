//! Transport buffers and the pool they come from

use bytes::{Bytes, BytesMut};

/// One outgoing media packet.
///
/// The first `offset` bytes of the backing storage are reserved for
/// headers written later, outermost last. Payload is appended after the
/// reserved region.
#[derive(Debug)]
pub struct TransportBuffer {
    data: BytesMut,
    offset: usize,
    len: usize,
    /// Sequence number in the high byte, payload header byte 0 in the low byte
    pub metadata: u16,
    /// Presentation timestamp in samples
    pub timestamp: u32,
}

impl TransportBuffer {
    /// Wrap pool storage, reserving `offset` bytes of headroom
    pub fn new(mut data: BytesMut, offset: usize) -> Self {
        data.clear();
        data.resize(offset, 0);
        Self {
            data,
            offset,
            len: 0,
            metadata: 0,
            timestamp: 0,
        }
    }

    /// Append payload bytes
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Write `header` directly in front of the current contents.
    ///
    /// Returns false, leaving the buffer untouched, if the reserved region
    /// is too small.
    pub fn prepend(&mut self, header: &[u8]) -> bool {
        let Some(start) = self.offset.checked_sub(header.len()) else {
            return false;
        };
        self.data[start..self.offset].copy_from_slice(header);
        self.offset = start;
        self.len += header.len();
        true
    }

    /// Bytes in use, headers written so far included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining headroom
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Packet contents without the headroom
    pub fn freeze(mut self) -> Bytes {
        self.data.split_off(self.offset).freeze()
    }
}

/// Source of transport buffer storage
pub trait BufferPool {
    /// `None` when the pool is exhausted
    fn allocate(&mut self, size: usize) -> Option<BytesMut>;
}

/// Heap-backed pool with an optional allocation budget
#[derive(Debug, Default)]
pub struct HeapBufferPool {
    budget: Option<usize>,
    allocated: usize,
}

impl HeapBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool that fails after `budget` allocations until replenished
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            allocated: 0,
        }
    }

    /// Add `count` allocations to the budget
    pub fn replenish(&mut self, count: usize) {
        if let Some(budget) = self.budget.as_mut() {
            *budget += count;
        }
    }

    /// Total successful allocations
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

impl BufferPool for HeapBufferPool {
    fn allocate(&mut self, size: usize) -> Option<BytesMut> {
        if let Some(budget) = self.budget.as_mut() {
            if *budget == 0 {
                return None;
            }
            *budget -= 1;
        }
        self.allocated += 1;
        Some(BytesMut::with_capacity(size))
    }
}
