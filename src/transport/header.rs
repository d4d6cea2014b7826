//! LHDC media payload header
//!
//! ```text
//!   byte 0                              byte 1 (fragmented only)
//! ┌────┬────┬────┬─────────┬───────────┐ ┌──────────┐
//! │ F  │ S  │ L  │ latency │ frames    │ │ sequence │
//! │ b7 │ b6 │ b5 │ b4..b3  │ b2..b0    │ │          │
//! └────┴────┴────┴─────────┴───────────┘ └──────────┘
//! ```
//!
//! F marks a fragmented frame group, S its first packet and L its last.
//! The frame count is only meaningful on unfragmented and first packets.

/// More fragments: this packet is part of a fragmented group
pub const FLAG_FRAGMENTED: u8 = 0x80;
/// First packet of a fragmented group
pub const FLAG_START: u8 = 0x40;
/// Last packet of a fragmented group
pub const FLAG_LAST: u8 = 0x20;

pub const LATENCY_MASK: u8 = 0x18;
pub const LATENCY_SHIFT: u8 = 3;
pub const FRAME_COUNT_MASK: u8 = 0x07;

/// Most encoder frames one packet group can announce
pub const MAX_FRAMES_PER_PACKET: u8 = FRAME_COUNT_MASK;

/// Largest header, reserved in front of every payload
pub const MAX_HEADER_LEN: usize = 2;

/// Decoded payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayloadHeader {
    pub fragmented: bool,
    pub start: bool,
    pub last: bool,
    pub latency: u8,
    pub frame_count: u8,
    pub sequence: u8,
}

impl PayloadHeader {
    /// Header for a frame group carried in one packet
    pub fn single(sequence: u8, frame_count: u8, latency: u8) -> Self {
        Self {
            sequence,
            frame_count,
            latency,
            ..Self::default()
        }
    }

    /// Header for packet `index` of a group split over `total` packets
    pub fn fragment(sequence: u8, index: usize, total: usize, frame_count: u8, latency: u8) -> Self {
        let start = index == 0;
        Self {
            fragmented: true,
            start,
            last: index + 1 == total,
            latency,
            frame_count: if start { frame_count } else { 0 },
            sequence,
        }
    }

    pub fn first_byte(&self) -> u8 {
        let mut b = (self.latency << LATENCY_SHIFT) & LATENCY_MASK;
        b |= self.frame_count & FRAME_COUNT_MASK;
        if self.fragmented {
            b |= FLAG_FRAGMENTED;
        }
        if self.start {
            b |= FLAG_START;
        }
        if self.last {
            b |= FLAG_LAST;
        }
        b
    }

    /// Wire length: one byte, two when fragmented
    pub fn wire_len(&self) -> usize {
        if self.fragmented {
            2
        } else {
            1
        }
    }

    /// Serialize; only the first `wire_len()` bytes are meaningful
    pub fn serialize(&self) -> [u8; MAX_HEADER_LEN] {
        [self.first_byte(), self.sequence]
    }

    /// Metadata word stored alongside the transport buffer
    pub fn metadata(&self) -> u16 {
        u16::from(self.sequence) << 8 | u16::from(self.first_byte())
    }

    /// Parse a header from the start of a packet
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let b = *bytes.first()?;
        let fragmented = b & FLAG_FRAGMENTED != 0;
        let sequence = if fragmented { *bytes.get(1)? } else { 0 };
        Some(Self {
            fragmented,
            start: b & FLAG_START != 0,
            last: b & FLAG_LAST != 0,
            latency: (b & LATENCY_MASK) >> LATENCY_SHIFT,
            frame_count: b & FRAME_COUNT_MASK,
            sequence,
        })
    }

    /// Recover a header from a metadata word
    pub fn from_metadata(metadata: u16) -> Self {
        let b = metadata as u8;
        Self {
            fragmented: b & FLAG_FRAGMENTED != 0,
            start: b & FLAG_START != 0,
            last: b & FLAG_LAST != 0,
            latency: (b & LATENCY_MASK) >> LATENCY_SHIFT,
            frame_count: b & FRAME_COUNT_MASK,
            sequence: (metadata >> 8) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_header_layout() {
        let header = PayloadHeader::single(9, 3, 1);
        assert_eq!(header.first_byte(), 0x08 | 0x03);
        assert_eq!(header.wire_len(), 1);
        assert_eq!(header.metadata(), 0x090B);
    }

    #[test]
    fn test_fragment_flags() {
        let first = PayloadHeader::fragment(4, 0, 3, 2, 0);
        let middle = PayloadHeader::fragment(5, 1, 3, 2, 0);
        let last = PayloadHeader::fragment(6, 2, 3, 2, 0);

        assert_eq!(first.first_byte(), FLAG_FRAGMENTED | FLAG_START | 2);
        assert_eq!(middle.first_byte(), FLAG_FRAGMENTED);
        assert_eq!(last.first_byte(), FLAG_FRAGMENTED | FLAG_LAST);
        assert_eq!(last.serialize(), [0xA0, 6]);
        assert_eq!(PayloadHeader::parse(&last.serialize()), Some(last));
        assert_eq!(PayloadHeader::from_metadata(first.metadata()), first);
    }

    #[test]
    fn test_parse_truncated_fragment() {
        assert_eq!(PayloadHeader::parse(&[FLAG_FRAGMENTED]), None);
        assert_eq!(PayloadHeader::parse(&[]), None);
    }
}
