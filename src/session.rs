//! LHDC source streaming session
//!
//! Owns everything that changes while streaming: the encoder, the feeding
//! clock, the packetizer, the collaborators and the statistics. The
//! negotiator is shared so a control path can renegotiate while the
//! session holds it.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, trace, warn};

use crate::audio::feeding::{FeedingClock, FeedingParams};
use crate::audio::source::PcmSource;
use crate::codec::encoder::{quality_mode_name, LhdcEncoder};
use crate::codec::engine::CompressionEngine;
use crate::codec::negotiator::LhdcCodec;
use crate::constants::{DEFAULT_PEER_MTU, ENCODER_INTERVAL_MS};
use crate::error::{CodecError, Result};
use crate::transport::buffer::BufferPool;
use crate::transport::header::MAX_FRAMES_PER_PACKET;
use crate::transport::packetizer::{EmitIo, EmitStatus, Packetizer};
use crate::transport::sink::TransportSink;

/// Link parameters of the connected peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerParams {
    pub peer_mtu: u16,
    pub is_peer_edr: bool,
    pub peer_supports_3mbps: bool,
}

impl Default for PeerParams {
    fn default() -> Self {
        Self {
            peer_mtu: DEFAULT_PEER_MTU,
            is_peer_edr: true,
            peer_supports_3mbps: true,
        }
    }
}

/// Collaborators the session streams through
pub struct StreamIo {
    pub source: Box<dyn PcmSource>,
    pub sink: Box<dyn TransportSink>,
    pub pool: Box<dyn BufferPool>,
}

/// What an encoder update changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateFlags {
    /// PCM parameters changed and the feeding clock was reset
    pub restart_input: bool,
    /// The transmit MTU changed
    pub restart_output: bool,
    /// Quality or latency mode changed
    pub config_updated: bool,
}

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub session_start_us: u64,
    pub expected_packets: u64,
    pub dropped_packets: u64,
    pub expected_reads: u64,
    pub actual_reads: u64,
    pub expected_read_bytes: u64,
    pub actual_read_bytes: u64,
    pub underflows: u64,
    pub enqueued_buffers: u64,
    pub abr_adjustments: u64,
}

/// Session summary for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub stats: Stats,
    pub quality_mode: &'static str,
    pub bitrate_kbps: u32,
    pub tx_queue_length: usize,
    pub frames_encoded: u64,
    pub bytes_encoded: u64,
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "A2DP LHDC source session")?;
        writeln!(
            f,
            "  Packets expected/dropped                        : {} / {}",
            s.expected_packets, s.dropped_packets
        )?;
        writeln!(
            f,
            "  PCM reads count expected/actual                 : {} / {}",
            s.expected_reads, s.actual_reads
        )?;
        writeln!(
            f,
            "  PCM read bytes expected/actual                  : {} / {}",
            s.expected_read_bytes, s.actual_read_bytes
        )?;
        writeln!(f, "  Underflows                                      : {}", s.underflows)?;
        writeln!(f, "  LHDC quality mode                               : {}", self.quality_mode)?;
        writeln!(f, "  LHDC transmission bitrate (kbps)                : {}", self.bitrate_kbps)?;
        writeln!(f, "  LHDC saved transmit queue length                : {}", self.tx_queue_length)?;
        write!(f, "  LHDC adaptive bitrate adjustments               : {}", s.abr_adjustments)
    }
}

/// Source-side streaming session
pub struct SourceSession {
    codec: Arc<LhdcCodec>,
    encoder: LhdcEncoder,
    clock: FeedingClock,
    packetizer: Packetizer,
    io: Option<StreamIo>,
    peer: PeerParams,
    stats: Stats,
    tx_queue_length: usize,
}

impl SourceSession {
    pub fn new(engine: Box<dyn CompressionEngine>, codec: Arc<LhdcCodec>) -> Self {
        Self {
            codec,
            encoder: LhdcEncoder::new(engine),
            clock: FeedingClock::default(),
            packetizer: Packetizer::new(),
            io: None,
            peer: PeerParams::default(),
            stats: Stats::default(),
            tx_queue_length: 0,
        }
    }

    /// Start a session against the committed configuration.
    ///
    /// Fails if the engine cannot provide a context, rejects the
    /// configuration, or the peer MTU is unusable; the caller should then
    /// stop offering the codec.
    pub fn init(&mut self, peer: PeerParams, io: StreamIo) -> Result<UpdateFlags> {
        self.cleanup();
        self.stats.session_start_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let flags = self.update_encoder(peer)?;
        self.io = Some(io);
        info!(
            "LHDC session started: {:?} quality {}",
            self.clock.params(),
            self.encoder.params().quality.name()
        );
        Ok(flags)
    }

    /// Reconfigure the encoder and pacing from the committed configuration.
    ///
    /// A failure stops the session: the engine context is released and
    /// further ticks produce nothing until the next [`SourceSession::init`].
    pub fn update_encoder(&mut self, peer: PeerParams) -> Result<UpdateFlags> {
        let result = self.reconfigure(peer);
        if let Err(e) = &result {
            if self.is_active() {
                error!("encoder update failed, stopping session: {}", e);
            }
            self.cleanup();
        }
        result
    }

    fn reconfigure(&mut self, peer: PeerParams) -> Result<UpdateFlags> {
        let config = self.codec.config();
        let (Some(rate), Some(depth), Some(mode)) = (config.sample_rate(), config.bit_depth(), config.channel_mode())
        else {
            return Err(CodecError::EncoderUnavailable("no negotiated configuration".into()).into());
        };

        let content_protection = self.codec.content_protection();
        let tx_mtu = Packetizer::mtu_for(peer.peer_mtu, content_protection)?;
        let config_updated = self.encoder.update(&config, tx_mtu)?;

        let previous_mtu = self.packetizer.tx_mtu();
        self.packetizer.configure(peer.peer_mtu, content_protection)?;
        self.packetizer.set_latency(self.encoder.params().latency);
        self.peer = peer;

        let params = FeedingParams::new(rate.hz(), depth.bits(), mode.channel_count());
        let restart_input = *self.clock.params() != params;
        if restart_input {
            self.clock.reset(params);
        }

        let flags = UpdateFlags {
            restart_input,
            restart_output: previous_mtu != 0 && previous_mtu != tx_mtu,
            config_updated,
        };
        debug!("encoder updated: tx_mtu {} {:?}", tx_mtu, flags);
        Ok(flags)
    }

    /// Release the engine context and zero all state
    pub fn cleanup(&mut self) {
        self.encoder.release();
        self.clock = FeedingClock::default();
        self.packetizer = Packetizer::new();
        self.io = None;
        self.stats = Stats::default();
        self.tx_queue_length = 0;
    }

    pub fn encoder_interval_ms(&self) -> u64 {
        ENCODER_INTERVAL_MS
    }

    pub fn feeding_reset(&mut self) {
        let params = *self.clock.params();
        self.clock.reset(params);
    }

    pub fn feeding_flush(&mut self) {
        self.clock.flush();
    }

    /// Last transmit queue length, consumed by adaptive bitrate
    pub fn set_transmit_queue_length(&mut self, length: usize) {
        self.tx_queue_length = length;
    }

    /// Streaming tick: emit every frame due at `now_us`
    pub fn send_frames(&mut self, now_us: u64) {
        let Some(io) = self.io.as_mut() else {
            warn!("send_frames called without an active session");
            return;
        };

        self.encoder.adjust_bitrate(self.tx_queue_length);
        self.stats.abr_adjustments = self.encoder.stats().abr_adjustments;

        let due = self.clock.frames_due(now_us);
        if due == 0 {
            trace!("no frames due");
            return;
        }

        let block_bytes = self.clock.bytes_per_frame();
        let mut remaining = due;
        while remaining > 0 {
            let chunk = remaining.min(u32::from(MAX_FRAMES_PER_PACKET)) as u8;
            remaining -= u32::from(chunk);

            self.stats.expected_packets += 1;
            self.stats.expected_reads += u64::from(chunk);
            self.stats.expected_read_bytes += u64::from(chunk) * block_bytes as u64;

            let outcome = self.packetizer.emit(
                chunk,
                block_bytes,
                &mut self.encoder,
                EmitIo {
                    source: io.source.as_mut(),
                    pool: io.pool.as_mut(),
                    sink: io.sink.as_mut(),
                },
            );
            self.stats.actual_reads += u64::from(outcome.reads);
            self.stats.actual_read_bytes += outcome.bytes_read;
            self.stats.enqueued_buffers += u64::from(outcome.buffers_enqueued);
            self.stats.dropped_packets += u64::from(outcome.buffers_dropped);

            match outcome.status {
                EmitStatus::Complete => {}
                EmitStatus::Underflow => {
                    self.clock.credit(u32::from(outcome.frames_unconsumed) + remaining);
                    self.stats.underflows += 1;
                    break;
                }
                EmitStatus::NotConfigured => {
                    warn!("packetizer not configured, deferring {} frames", u32::from(chunk) + remaining);
                    self.clock.credit(u32::from(outcome.frames_unconsumed) + remaining);
                    break;
                }
                EmitStatus::EncodeFailed | EmitStatus::AllocationFailed => {
                    // The failed chunk's PCM is consumed; later chunks stay in the source
                    self.stats.dropped_packets += 1;
                    self.clock.credit(remaining);
                    break;
                }
            }
        }
    }

    pub fn report(&self) -> SessionReport {
        let encoder = self.encoder.stats();
        SessionReport {
            stats: self.stats.clone(),
            quality_mode: quality_mode_name(i64::from(self.encoder.params().quality.index())),
            bitrate_kbps: self.encoder.bitrate_kbps(),
            tx_queue_length: self.tx_queue_length,
            frames_encoded: encoder.frames_encoded,
            bytes_encoded: encoder.bytes_produced,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn codec(&self) -> &Arc<LhdcCodec> {
        &self.codec
    }

    pub fn peer(&self) -> &PeerParams {
        &self.peer
    }

    pub fn clock(&self) -> &FeedingClock {
        &self.clock
    }

    pub fn packetizer(&self) -> &Packetizer {
        &self.packetizer
    }

    pub fn is_active(&self) -> bool {
        self.io.is_some()
    }
}
