//! Fixed-rate stand-in compression engine
//!
//! Produces deterministic output whose size per block follows the selected
//! quality's bitrate. Used by the demo binary and by tests that need a
//! real engine behind the session.

use tracing::trace;

use crate::codec::engine::{CompressionEngine, EncodeOutput, EngineHandle, EngineInit};
use crate::constants::ENCODER_BLOCK_SAMPLES;

/// Bitrate ladder in kbps, highest first
const BITRATE_LADDER_KBPS: [u32; 5] = [990, 660, 492, 396, 330];

/// Queue depth above which the adaptive mode steps down
const ABR_QUEUE_HIGH_WATERMARK: usize = 5;

fn bitrate_for_quality(index: u8) -> u32 {
    match index {
        0 => 990,
        1 => 660,
        2 => 330,
        // Adaptive mode starts at the top of the ladder
        _ => BITRATE_LADDER_KBPS[0],
    }
}

#[derive(Debug, Default)]
struct Context {
    init: Option<EngineInit>,
    bitrate_kbps: u32,
    last_error: i32,
}

/// Deterministic engine emitting `bitrate * block duration` bytes per block
#[derive(Debug, Default)]
pub struct FixedRateEngine {
    next_id: u64,
    contexts: Vec<(u64, Context)>,
}

impl FixedRateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts currently open
    pub fn open_contexts(&self) -> usize {
        self.contexts.len()
    }

    fn context(&self, handle: &EngineHandle) -> Option<&Context> {
        self.contexts.iter().find(|(id, _)| *id == handle.id()).map(|(_, c)| c)
    }

    fn context_mut(&mut self, handle: &EngineHandle) -> Option<&mut Context> {
        self.contexts
            .iter_mut()
            .find(|(id, _)| *id == handle.id())
            .map(|(_, c)| c)
    }

    /// Encoded bytes per block at the given rate
    pub fn block_bytes(bitrate_kbps: u32, sample_rate: u32) -> usize {
        if sample_rate == 0 {
            return 0;
        }
        let bytes_per_sec = u64::from(bitrate_kbps) * 1000 / 8;
        (bytes_per_sec * ENCODER_BLOCK_SAMPLES as u64 / u64::from(sample_rate)) as usize
    }
}

impl CompressionEngine for FixedRateEngine {
    fn open_context(&mut self) -> Option<EngineHandle> {
        self.next_id += 1;
        self.contexts.push((self.next_id, Context::default()));
        Some(EngineHandle::new(self.next_id))
    }

    fn initialize(&mut self, handle: &EngineHandle, init: &EngineInit) -> Result<(), i32> {
        let ctx = self.context_mut(handle).ok_or(-1)?;
        if init.sample_rate == 0 || init.mtu == 0 {
            ctx.last_error = -2;
            return Err(ctx.last_error);
        }
        ctx.init = Some(*init);
        ctx.bitrate_kbps = bitrate_for_quality(init.quality_index);
        ctx.last_error = 0;
        Ok(())
    }

    fn encode(&mut self, handle: &EngineHandle, pcm: &[u8], out: &mut Vec<u8>) -> Result<EncodeOutput, i32> {
        let ctx = self.context_mut(handle).ok_or(-1)?;
        let Some(init) = ctx.init else {
            ctx.last_error = -3;
            return Err(ctx.last_error);
        };
        if pcm.is_empty() {
            ctx.last_error = -4;
            return Err(ctx.last_error);
        }

        let size = Self::block_bytes(ctx.bitrate_kbps, init.sample_rate);
        out.extend((0..size).map(|i| pcm[i % pcm.len()] ^ (i as u8)));
        trace!(size, "encoded block");
        Ok(EncodeOutput {
            written: size,
            frames: 1,
        })
    }

    fn set_bitrate(&mut self, handle: &EngineHandle, index: u8) {
        if let Some(ctx) = self.context_mut(handle) {
            ctx.bitrate_kbps = bitrate_for_quality(index);
        }
    }

    fn adjust_bitrate(&mut self, handle: &EngineHandle, queue_depth: usize) {
        let Some(ctx) = self.context_mut(handle) else {
            return;
        };
        let pos = BITRATE_LADDER_KBPS
            .iter()
            .position(|&kbps| kbps == ctx.bitrate_kbps)
            .unwrap_or(0);
        let next = if queue_depth > ABR_QUEUE_HIGH_WATERMARK {
            (pos + 1).min(BITRATE_LADDER_KBPS.len() - 1)
        } else if queue_depth == 0 {
            pos.saturating_sub(1)
        } else {
            pos
        };
        ctx.bitrate_kbps = BITRATE_LADDER_KBPS[next];
    }

    fn bitrate_kbps(&self, handle: &EngineHandle) -> u32 {
        self.context(handle).map_or(0, |c| c.bitrate_kbps)
    }

    fn last_error(&self, handle: &EngineHandle) -> i32 {
        self.context(handle).map_or(-1, |c| c.last_error)
    }

    fn release_context(&mut self, handle: EngineHandle) {
        self.contexts.retain(|(id, _)| *id != handle.id());
    }
}
