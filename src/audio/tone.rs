//! Sine tone PCM generator

use bytes::{BufMut, Bytes, BytesMut};
use std::f64::consts::TAU;

use crate::audio::feeding::FeedingParams;
use crate::audio::source::PcmSource;

/// Generates an interleaved little-endian sine tone in 16 or 24 bit
#[derive(Debug, Clone)]
pub struct ToneSource {
    params: FeedingParams,
    frequency: f64,
    amplitude: f64,
    phase: f64,
}

impl ToneSource {
    pub fn new(params: FeedingParams, frequency: f32) -> Self {
        Self {
            params,
            frequency: f64::from(frequency),
            amplitude: 0.5,
            phase: 0.0,
        }
    }

    /// Set amplitude in the range 0.0 - 1.0
    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = f64::from(amplitude.clamp(0.0, 1.0));
        self
    }

    pub fn params(&self) -> &FeedingParams {
        &self.params
    }

    fn next_sample(&mut self) -> f64 {
        let value = self.phase.sin() * self.amplitude;
        if self.params.sample_rate > 0 {
            self.phase += TAU * self.frequency / f64::from(self.params.sample_rate);
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
        value
    }

    fn write_frame(&mut self, out: &mut impl BufMut) {
        let value = self.next_sample();
        for _ in 0..self.params.channel_count {
            match self.params.bits_per_sample {
                24 => {
                    let s = (value * 8_388_607.0) as i32;
                    out.put_slice(&s.to_le_bytes()[..3]);
                }
                _ => out.put_i16_le((value * 32_767.0) as i16),
            }
        }
    }

    /// Produce `frames` sample frames as one chunk
    pub fn next_chunk(&mut self, frames: usize) -> Bytes {
        let mut chunk = BytesMut::with_capacity(frames * self.params.bytes_per_sample_frame());
        for _ in 0..frames {
            self.write_frame(&mut chunk);
        }
        chunk.freeze()
    }
}

impl PcmSource for ToneSource {
    /// Fills whole sample frames only
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let frame_bytes = self.params.bytes_per_sample_frame();
        if frame_bytes == 0 {
            return 0;
        }
        let frames = buf.len() / frame_bytes;
        let mut out = &mut buf[..frames * frame_bytes];
        for _ in 0..frames {
            self.write_frame(&mut out);
        }
        frames * frame_bytes
    }
}
