//! LHDC packetizer
//!
//! Turns one group of encoder frames into transport packets. Encoded
//! bytes are appended into buffers capped at the payload capacity; when
//! the group spans more than one buffer every buffer carries the
//! fragmented flag, the first the start flag and frame count, the last
//! the last flag. All buffers of a group share one timestamp.

use tracing::{error, trace, warn};

use crate::audio::source::PcmSource;
use crate::codec::encoder::{Latency, LhdcEncoder};
use crate::constants::{CP_HEADER_LEN, ENCODER_BLOCK_SAMPLES, MEDIA_HEADER_LEN, TRANSPORT_BUFFER_SIZE};
use crate::error::TransportError;
use crate::transport::buffer::{BufferPool, TransportBuffer};
use crate::transport::header::{PayloadHeader, MAX_FRAMES_PER_PACKET, MAX_HEADER_LEN};
use crate::transport::sink::TransportSink;

/// How an emission pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitStatus {
    /// Every frame was read and encoded
    #[default]
    Complete,
    /// The PCM source ran dry; `frames_unconsumed` frames were not produced
    Underflow,
    /// The engine failed; the pass was dropped
    EncodeFailed,
    /// The buffer pool was exhausted; the pass was dropped
    AllocationFailed,
    /// No MTU configured or empty block size
    NotConfigured,
}

/// Result of one emission pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitOutcome {
    pub status: EmitStatus,
    pub frames_processed: u8,
    pub frames_unconsumed: u8,
    pub reads: u32,
    pub bytes_read: u64,
    pub buffers_enqueued: u32,
    /// Buffers built but refused by the sink
    pub buffers_dropped: u32,
}

/// Collaborators for one emission pass
pub struct EmitIo<'a> {
    pub source: &'a mut dyn PcmSource,
    pub pool: &'a mut dyn BufferPool,
    pub sink: &'a mut dyn TransportSink,
}

/// Sequencing and fragmentation state of the outgoing stream
#[derive(Debug, Default)]
pub struct Packetizer {
    sequence: u8,
    timestamp: u32,
    tx_mtu: usize,
    reserved_offset: usize,
    latency: u8,
    pcm: Vec<u8>,
}

impl Packetizer {
    pub fn new() -> Self {
        Self {
            latency: Latency::Mid.index(),
            ..Self::default()
        }
    }

    /// Derive the transmit MTU from the peer MTU.
    ///
    /// The media header and, with content protection, its header byte come
    /// off the peer MTU; the result is further bounded by what fits in a
    /// transport buffer after the reserved headroom.
    pub fn mtu_for(peer_mtu: u16, content_protection: bool) -> Result<usize, TransportError> {
        let overhead = Self::overhead(content_protection);
        let reserved = overhead + MAX_HEADER_LEN;
        let peer = usize::from(peer_mtu);
        if peer <= reserved {
            return Err(TransportError::InvalidMtu(peer_mtu));
        }
        Ok((peer - overhead).min(TRANSPORT_BUFFER_SIZE - reserved))
    }

    fn overhead(content_protection: bool) -> usize {
        MEDIA_HEADER_LEN + if content_protection { CP_HEADER_LEN } else { 0 }
    }

    /// Commit the transmit MTU derived by [`Packetizer::mtu_for`]
    pub fn configure(&mut self, peer_mtu: u16, content_protection: bool) -> Result<usize, TransportError> {
        self.tx_mtu = Self::mtu_for(peer_mtu, content_protection)?;
        self.reserved_offset = Self::overhead(content_protection) + MAX_HEADER_LEN;
        trace!(peer_mtu, tx_mtu = self.tx_mtu, "packetizer configured");
        Ok(self.tx_mtu)
    }

    pub fn set_latency(&mut self, latency: Latency) {
        self.latency = latency.index();
    }

    /// Zero sequence number and timestamp
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.timestamp = 0;
    }

    /// Largest packet, payload header included
    pub fn tx_mtu(&self) -> usize {
        self.tx_mtu
    }

    /// Encoded bytes one packet can carry
    pub fn payload_capacity(&self) -> usize {
        self.tx_mtu.saturating_sub(MAX_HEADER_LEN)
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Read, encode and send up to [`MAX_FRAMES_PER_PACKET`] frames of
    /// `block_bytes` PCM bytes each.
    ///
    /// Short reads are padded with silence; an empty read stops the pass.
    /// Encode or allocation failure drops the whole pass without touching
    /// the sequence number or timestamp.
    pub fn emit(
        &mut self,
        frames: u8,
        block_bytes: usize,
        encoder: &mut LhdcEncoder,
        io: EmitIo<'_>,
    ) -> EmitOutcome {
        let frames = frames.min(MAX_FRAMES_PER_PACKET);
        let mut outcome = EmitOutcome::default();
        let capacity = self.payload_capacity();
        if capacity == 0 || block_bytes == 0 {
            warn!("packetizer not configured, skipping {} frames", frames);
            outcome.status = EmitStatus::NotConfigured;
            outcome.frames_unconsumed = frames;
            return outcome;
        }

        self.pcm.resize(block_bytes, 0);
        let mut buffers: Vec<TransportBuffer> = Vec::new();

        for i in 0..frames {
            let block = &mut self.pcm[..block_bytes];
            let read = io.source.read(block);
            outcome.reads += 1;
            outcome.bytes_read += read as u64;
            if read == 0 {
                warn!("PCM underflow with {} of {} frames pending", frames - i, frames);
                outcome.status = EmitStatus::Underflow;
                outcome.frames_unconsumed = frames - i;
                break;
            }
            if read < block_bytes {
                block[read..].fill(0);
            }

            let encoded = match encoder.encode(&self.pcm[..block_bytes]) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("dropping {} frames: {}", frames, e);
                    outcome.status = EmitStatus::EncodeFailed;
                    return outcome;
                }
            };
            outcome.frames_processed += 1;

            let mut rest = encoded;
            while !rest.is_empty() {
                if buffers.last().map_or(true, |b| b.len() >= capacity) {
                    let Some(data) = io.pool.allocate(TRANSPORT_BUFFER_SIZE) else {
                        error!("{}, dropping {} frames", TransportError::BufferAllocationFailure, frames);
                        outcome.status = EmitStatus::AllocationFailed;
                        return outcome;
                    };
                    buffers.push(TransportBuffer::new(data, self.reserved_offset));
                }
                let Some(buf) = buffers.last_mut() else {
                    break;
                };
                let n = (capacity - buf.len()).min(rest.len());
                buf.append(&rest[..n]);
                rest = &rest[n..];
            }
        }

        let processed = outcome.frames_processed;
        if processed == 0 {
            return outcome;
        }

        let total = buffers.len();
        let mut sequence = self.sequence;
        for (index, buf) in buffers.iter_mut().enumerate() {
            let header = if total == 1 {
                PayloadHeader::single(sequence, processed, self.latency)
            } else {
                PayloadHeader::fragment(sequence, index, total, processed, self.latency)
            };
            if !buf.prepend(&header.serialize()[..header.wire_len()]) {
                error!("no headroom for payload header, dropping {} frames", processed);
                outcome.status = EmitStatus::AllocationFailed;
                return outcome;
            }
            buf.metadata = header.metadata();
            buf.timestamp = self.timestamp;
            sequence = sequence.wrapping_add(1);
        }
        self.sequence = sequence;
        self.timestamp = self
            .timestamp
            .wrapping_add(u32::from(processed) * ENCODER_BLOCK_SAMPLES as u32);

        for (index, buf) in buffers.into_iter().enumerate() {
            let frames = if index == 0 { processed } else { 0 };
            if !io.sink.enqueue(buf, frames) {
                outcome.buffers_dropped = (total - index) as u32;
                warn!("transport refused packet, {} buffers dropped", outcome.buffers_dropped);
                break;
            }
            outcome.buffers_enqueued += 1;
        }

        trace!(processed, buffers = total, timestamp = self.timestamp, "emitted frame group");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::engine::{CompressionEngine, EncodeOutput, EngineHandle, EngineInit};
    use crate::codec::types::{BitDepth, ChannelMode, CodecConfig, SampleRate};
    use crate::transport::buffer::HeapBufferPool;
    use crate::transport::header::{FLAG_FRAGMENTED, FLAG_LAST, FLAG_START};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    const BLOCK: usize = ENCODER_BLOCK_SAMPLES * 4;

    /// Engine emitting scripted output sizes
    #[derive(Default)]
    struct ScriptedEngine {
        sizes: VecDeque<usize>,
        fail: bool,
        seen: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl CompressionEngine for ScriptedEngine {
        fn open_context(&mut self) -> Option<EngineHandle> {
            Some(EngineHandle::new(1))
        }
        fn initialize(&mut self, _: &EngineHandle, _: &EngineInit) -> Result<(), i32> {
            Ok(())
        }
        fn encode(&mut self, _: &EngineHandle, pcm: &[u8], out: &mut Vec<u8>) -> Result<EncodeOutput, i32> {
            if self.fail {
                return Err(-7);
            }
            self.seen.borrow_mut().push(pcm.to_vec());
            let n = self.sizes.pop_front().unwrap_or(0);
            out.extend(std::iter::repeat(0xC5).take(n));
            Ok(EncodeOutput { written: n, frames: 1 })
        }
        fn set_bitrate(&mut self, _: &EngineHandle, _: u8) {}
        fn adjust_bitrate(&mut self, _: &EngineHandle, _: usize) {}
        fn bitrate_kbps(&self, _: &EngineHandle) -> u32 {
            0
        }
        fn last_error(&self, _: &EngineHandle) -> i32 {
            if self.fail {
                -7
            } else {
                0
            }
        }
        fn release_context(&mut self, _: EngineHandle) {}
    }

    fn encoder(engine: ScriptedEngine) -> LhdcEncoder {
        let mut encoder = LhdcEncoder::new(Box::new(engine));
        let config = CodecConfig::new(
            SampleRate::Hz48000.into(),
            BitDepth::Bits16.into(),
            ChannelMode::Stereo.into(),
        );
        encoder.update(&config, 883).unwrap();
        encoder
    }

    fn scripted(sizes: &[usize]) -> ScriptedEngine {
        ScriptedEngine {
            sizes: sizes.iter().copied().collect(),
            ..ScriptedEngine::default()
        }
    }

    fn packetizer(peer_mtu: u16) -> Packetizer {
        let mut p = Packetizer::new();
        p.configure(peer_mtu, false).unwrap();
        p
    }

    fn full_source(buf: &mut [u8]) -> usize {
        buf.fill(1);
        buf.len()
    }

    #[test]
    fn test_configure_mtu() {
        let mut p = Packetizer::new();
        assert_eq!(p.configure(895, false).unwrap(), 883);
        assert_eq!(p.payload_capacity(), 881);
        assert_eq!(p.configure(895, true).unwrap(), 882);
        assert_eq!(p.configure(u16::MAX, false).unwrap(), TRANSPORT_BUFFER_SIZE - 14);

        assert_eq!(p.configure(0, false), Err(TransportError::InvalidMtu(0)));
        assert_eq!(p.configure(14, false), Err(TransportError::InvalidMtu(14)));
        assert_eq!(p.configure(15, true), Err(TransportError::InvalidMtu(15)));
    }

    #[test]
    fn test_mtu_for_does_not_commit() {
        let mut p = Packetizer::new();
        p.configure(895, false).unwrap();
        assert_eq!(Packetizer::mtu_for(300, false).unwrap(), 288);
        assert_eq!(p.tx_mtu(), 883);
    }

    #[test]
    fn test_single_buffer_group() {
        let mut p = packetizer(895);
        p.set_latency(Latency::High);
        let mut enc = encoder(scripted(&[100, 60]));
        let mut pool = HeapBufferPool::new();
        let mut sent = Vec::new();
        let mut sink = |buf: TransportBuffer, frames: u8| {
            sent.push((buf, frames));
            true
        };
        let mut source = full_source;

        let outcome = p.emit(
            2,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.status, EmitStatus::Complete);
        assert_eq!(outcome.frames_processed, 2);
        assert_eq!(outcome.buffers_enqueued, 1);
        assert_eq!(outcome.bytes_read, 2 * BLOCK as u64);

        assert_eq!(sent.len(), 1);
        let (buf, frames) = &sent[0];
        assert_eq!(*frames, 2);
        assert_eq!(buf.len(), 161);
        let header = PayloadHeader::parse(buf.as_bytes()).unwrap();
        assert_eq!(header, PayloadHeader::single(0, 2, 2));
        assert_eq!(buf.as_bytes()[0], 0x12);
        assert_eq!(buf.metadata, 0x0012);
        assert_eq!(buf.timestamp, 0);

        assert_eq!(p.sequence(), 1);
        assert_eq!(p.timestamp(), 1024);
    }

    #[test]
    fn test_fragmented_group() {
        // 100 byte packets, 98 bytes of payload each
        let mut p = packetizer(112);
        let mut enc = encoder(scripted(&[150, 100]));
        let mut pool = HeapBufferPool::new();
        let mut sent = Vec::new();
        let mut sink = |buf: TransportBuffer, frames: u8| {
            sent.push((buf, frames));
            true
        };
        let mut source = full_source;

        let outcome = p.emit(
            2,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.buffers_enqueued, 3);

        let sizes: Vec<usize> = sent.iter().map(|(b, _)| b.len()).collect();
        assert_eq!(sizes, vec![100, 100, 56]);
        let frames: Vec<u8> = sent.iter().map(|(_, f)| *f).collect();
        assert_eq!(frames, vec![2, 0, 0]);

        let headers: Vec<PayloadHeader> = sent
            .iter()
            .map(|(b, _)| PayloadHeader::parse(b.as_bytes()).unwrap())
            .collect();
        assert_eq!(sent[0].0.as_bytes()[0], FLAG_FRAGMENTED | FLAG_START | 0x08 | 2);
        assert_eq!(sent[1].0.as_bytes()[0], FLAG_FRAGMENTED | 0x08);
        assert_eq!(sent[2].0.as_bytes()[0], FLAG_FRAGMENTED | FLAG_LAST | 0x08);
        assert_eq!(
            headers.iter().map(|h| h.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(sent.iter().all(|(b, _)| b.timestamp == 0));
        assert_eq!(p.sequence(), 3);
        assert_eq!(p.timestamp(), 1024);
    }

    #[test]
    fn test_underflow_stops_pass() {
        let mut p = packetizer(895);
        let mut enc = encoder(scripted(&[80, 80, 80, 80, 80]));
        let mut pool = HeapBufferPool::new();
        let mut sent = Vec::new();
        let mut sink = |buf: TransportBuffer, frames: u8| {
            sent.push((buf, frames));
            true
        };
        let mut remaining = 2;
        let mut source = |buf: &mut [u8]| {
            if remaining == 0 {
                return 0;
            }
            remaining -= 1;
            buf.fill(3);
            buf.len()
        };

        let outcome = p.emit(
            5,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.status, EmitStatus::Underflow);
        assert_eq!(outcome.frames_processed, 2);
        assert_eq!(outcome.frames_unconsumed, 3);
        assert_eq!(outcome.reads, 3);

        assert_eq!(sent.len(), 1);
        assert_eq!(PayloadHeader::parse(sent[0].0.as_bytes()).unwrap().frame_count, 2);
        assert_eq!(p.timestamp(), 1024);
    }

    #[test]
    fn test_short_read_is_padded() {
        let engine = scripted(&[10]);
        let seen = engine.seen.clone();
        let mut enc = encoder(engine);
        let mut p = packetizer(895);
        let mut pool = HeapBufferPool::new();
        let mut sink = |_: TransportBuffer, _: u8| true;
        let mut source = |buf: &mut [u8]| {
            buf[..100].fill(0xFF);
            100
        };

        let outcome = p.emit(
            1,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.status, EmitStatus::Complete);

        let seen = seen.borrow();
        assert_eq!(seen[0].len(), BLOCK);
        assert!(seen[0][..100].iter().all(|&b| b == 0xFF));
        assert!(seen[0][100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocation_failure_drops_pass() {
        let mut p = packetizer(112);
        let mut enc = encoder(scripted(&[150]));
        let mut pool = HeapBufferPool::with_budget(1);
        let mut count = 0;
        let mut sink = |_: TransportBuffer, _: u8| {
            count += 1;
            true
        };
        let mut source = full_source;

        let outcome = p.emit(
            1,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.status, EmitStatus::AllocationFailed);
        assert_eq!(outcome.buffers_enqueued, 0);
        assert_eq!(p.timestamp(), 0);
        assert_eq!(p.sequence(), 0);
        drop(sink);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_encode_failure_drops_pass() {
        let mut p = packetizer(895);
        let mut enc = encoder(ScriptedEngine {
            fail: true,
            ..ScriptedEngine::default()
        });
        let mut pool = HeapBufferPool::new();
        let mut sink = |_: TransportBuffer, _: u8| true;
        let mut source = full_source;

        let outcome = p.emit(
            3,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.status, EmitStatus::EncodeFailed);
        assert_eq!(outcome.frames_processed, 0);
        assert_eq!(p.timestamp(), 0);
    }

    #[test]
    fn test_refused_enqueue_counts_remaining() {
        let mut p = packetizer(112);
        let mut enc = encoder(scripted(&[250]));
        let mut pool = HeapBufferPool::new();
        let mut accepted = 0;
        let mut sink = |_: TransportBuffer, _: u8| {
            if accepted == 1 {
                return false;
            }
            accepted += 1;
            true
        };
        let mut source = full_source;

        let outcome = p.emit(
            1,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.buffers_enqueued, 1);
        assert_eq!(outcome.buffers_dropped, 2);
        assert_eq!(p.sequence(), 3);
    }

    #[test]
    fn test_buffered_engine_advances_timestamp() {
        let mut p = packetizer(895);
        let mut enc = encoder(scripted(&[0, 0]));
        let mut pool = HeapBufferPool::new();
        let mut sink = |_: TransportBuffer, _: u8| true;
        let mut source = full_source;

        let outcome = p.emit(
            2,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.buffers_enqueued, 0);
        assert_eq!(pool.allocated(), 0);
        assert_eq!(p.timestamp(), 1024);
        assert_eq!(p.sequence(), 0);
    }

    #[test]
    fn test_unconfigured_packetizer() {
        let mut p = Packetizer::new();
        let mut enc = encoder(scripted(&[10]));
        let mut pool = HeapBufferPool::new();
        let mut sink = |_: TransportBuffer, _: u8| true;
        let mut source = full_source;

        let outcome = p.emit(
            2,
            BLOCK,
            &mut enc,
            EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink },
        );
        assert_eq!(outcome.status, EmitStatus::NotConfigured);
        assert_eq!(outcome.frames_unconsumed, 2);
    }

    proptest! {
        #[test]
        fn test_packets_fit_mtu(
            peer_mtu in 20u16..1200,
            sizes in prop::collection::vec(0usize..3000, 1..=7),
            content_protection in any::<bool>(),
        ) {
            let mut p = Packetizer::new();
            let tx_mtu = p.configure(peer_mtu, content_protection).unwrap();
            let mut enc = encoder(scripted(&sizes));
            let mut pool = HeapBufferPool::new();
            let mut sent = Vec::new();
            let mut sink = |buf: TransportBuffer, _: u8| {
                sent.push(buf);
                true
            };
            let mut source = full_source;

            let frames = sizes.len() as u8;
            p.emit(frames, BLOCK, &mut enc, EmitIo { source: &mut source, pool: &mut pool, sink: &mut sink });

            let total: usize = sizes.iter().sum();
            let headers: Vec<PayloadHeader> = sent
                .iter()
                .map(|b| PayloadHeader::parse(b.as_bytes()).unwrap())
                .collect();
            prop_assert!(sent.iter().all(|b| b.len() <= tx_mtu));
            prop_assert_eq!(
                sent.iter().zip(&headers).map(|(b, h)| b.len() - h.wire_len()).sum::<usize>(),
                total
            );
            match headers.len() {
                0 => prop_assert_eq!(total, 0),
                1 => {
                    prop_assert!(!headers[0].fragmented);
                    prop_assert_eq!(headers[0].frame_count, frames);
                }
                n => {
                    prop_assert!(headers.iter().all(|h| h.fragmented));
                    prop_assert!(headers[0].start && headers[0].frame_count == frames);
                    prop_assert!(headers[n - 1].last);
                    prop_assert!(headers[1..n - 1].iter().all(|h| !h.start && !h.last));
                }
            }
        }
    }
}
