//! LHDC encoder wrapper
//!
//! Owns the compression engine and its coding context, derives the encoder
//! parameters from the negotiated configuration and tracks encode
//! statistics.

use tracing::{debug, error, warn};

use crate::codec::engine::{CompressionEngine, EngineHandle, EngineInit, SampleFormat};
use crate::codec::types::{BitDepth, CodecConfig, Flag};
use crate::error::CodecError;

/// Encoder quality mode, selected by vendor-extension field 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// 990 kbps
    High,
    /// 660 kbps
    Mid,
    /// 330 kbps
    Low,
    /// Adaptive bitrate driven by the transmit queue
    Abr,
}

impl Quality {
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::High),
            1 => Some(Self::Mid),
            2 => Some(Self::Low),
            3 => Some(Self::Abr),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Mid => 1,
            Self::Low => 2,
            Self::Abr => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Mid => "MID",
            Self::Low => "LOW",
            Self::Abr => "ABR",
        }
    }
}

/// Name of a raw quality mode index
pub fn quality_mode_name(index: i64) -> &'static str {
    Quality::from_index(index).map_or("Unknown", Quality::name)
}

/// Latency mode, selected by vendor-extension field 2 and carried in the payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    Low,
    Mid,
    High,
}

impl Latency {
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Low),
            1 => Some(Self::Mid),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Mid => 1,
            Self::High => 2,
        }
    }
}

/// Encoder parameters derived from the negotiated configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderParams {
    pub sample_rate: u32,
    pub channel_mode: u8,
    pub bits_per_sample: u8,
    pub quality: Quality,
    pub latency: Latency,
    /// PCM word length in bytes
    pub pcm_wlength: u8,
    pub pcm_format: SampleFormat,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            sample_rate: 0,
            channel_mode: 0,
            bits_per_sample: 0,
            quality: Quality::Mid,
            latency: Latency::Mid,
            pcm_wlength: 0,
            pcm_format: SampleFormat::S16,
        }
    }
}

/// LHDC encoder backed by an injected compression engine
pub struct LhdcEncoder {
    engine: Box<dyn CompressionEngine>,
    handle: Option<EngineHandle>,
    params: EncoderParams,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
    /// ABR bitrate changes
    abr_adjustments: u64,
}

impl LhdcEncoder {
    pub fn new(engine: Box<dyn CompressionEngine>) -> Self {
        Self {
            engine,
            handle: None,
            params: EncoderParams::default(),
            encode_buffer: Vec::with_capacity(4096),
            frames_encoded: 0,
            bytes_produced: 0,
            abr_adjustments: 0,
        }
    }

    /// Whether a coding context is held
    pub fn has_context(&self) -> bool {
        self.handle.is_some()
    }

    /// Reconfigure from the committed codec configuration.
    ///
    /// `mtu` is the largest outgoing packet. Returns whether the quality
    /// or latency mode changed.
    pub fn update(&mut self, config: &CodecConfig, mtu: usize) -> Result<bool, CodecError> {
        if self.handle.is_none() {
            let handle = self.engine.open_context().ok_or_else(|| {
                error!("cannot get LHDC encoder handle");
                CodecError::EncoderUnavailable("no coding context".into())
            })?;
            self.handle = Some(handle);
        }

        let sample_rate = config
            .sample_rate()
            .ok_or_else(|| CodecError::EncoderUnavailable("configuration has no sample rate".into()))?;
        let depth = config.bit_depth().unwrap_or(BitDepth::Bits16);
        let channel_mode = config.channel_mode().map_or(0, |m| m.bit());

        let old = self.params;
        let mut params = EncoderParams {
            sample_rate: sample_rate.hz(),
            channel_mode,
            bits_per_sample: depth.bits(),
            ..old
        };

        let quality_field = config.codec_specific[0];
        if quality_field != 0 {
            params.quality = Quality::from_index(quality_field % 10).unwrap_or_else(|| {
                warn!("unknown quality mode {}, using MID", quality_field);
                Quality::Mid
            });
            debug!("setting quality mode to {}", params.quality.name());
        }

        let latency_field = config.codec_specific[1];
        if latency_field != 0 {
            params.latency = Latency::from_index(latency_field % 10).unwrap_or(Latency::Mid);
        }

        params.pcm_wlength = params.bits_per_sample >> 3;
        params.pcm_format = SampleFormat::from_word_length(params.pcm_wlength);

        debug!(
            "sample_rate: {} channel_mode: {} quality_mode: {} pcm_wlength: {} pcm_fmt: {:?}",
            params.sample_rate,
            params.channel_mode,
            params.quality.name(),
            params.pcm_wlength,
            params.pcm_format
        );

        let Some(handle) = self.handle.as_ref() else {
            return Err(CodecError::EncoderUnavailable("no coding context".into()));
        };
        let init = EngineInit {
            sample_rate: params.sample_rate,
            sample_format: params.pcm_format,
            quality_index: params.quality.index(),
            channel_mode: params.channel_mode,
            mtu,
        };
        self.engine.initialize(handle, &init).map_err(|code| {
            error!("error initializing the LHDC encoder: {}", code);
            CodecError::EncoderInit(code)
        })?;
        if params.quality != Quality::Abr {
            self.engine.set_bitrate(handle, params.quality.index());
        }

        self.params = params;
        Ok(old.quality != params.quality || old.latency != params.latency)
    }

    /// Encode one PCM block, returning the encoded bytes (possibly empty)
    pub fn encode(&mut self, pcm: &[u8]) -> Result<&[u8], CodecError> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(CodecError::EncoderUnavailable("invalid LHDC handle".into()));
        };

        self.encode_buffer.clear();
        let output = self
            .engine
            .encode(handle, pcm, &mut self.encode_buffer)
            .map_err(|code| {
                let detail = self.engine.last_error(handle);
                error!("LHDC encoding error: {} (engine error {})", code, detail);
                CodecError::EncodingFailed(code)
            })?;

        let written = output.written.min(self.encode_buffer.len());
        self.frames_encoded += 1;
        self.bytes_produced += written as u64;
        Ok(&self.encode_buffer[..written])
    }

    /// Adaptive bitrate step; no-op outside ABR mode
    pub fn adjust_bitrate(&mut self, queue_depth: usize) {
        if self.params.quality != Quality::Abr {
            return;
        }
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        let before = self.engine.bitrate_kbps(handle);
        self.engine.adjust_bitrate(handle, queue_depth);
        if self.engine.bitrate_kbps(handle) != before {
            self.abr_adjustments += 1;
        }
    }

    /// Current transmission bitrate in kbps, zero without a context
    pub fn bitrate_kbps(&self) -> u32 {
        self.handle.as_ref().map_or(0, |h| self.engine.bitrate_kbps(h))
    }

    /// Get current parameters
    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    /// Release the coding context and reset parameters and statistics
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.release_context(handle);
        }
        self.params = EncoderParams::default();
        self.reset_stats();
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
            abr_adjustments: self.abr_adjustments,
        }
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.frames_encoded = 0;
        self.bytes_produced = 0;
        self.abr_adjustments = 0;
    }
}

impl Drop for LhdcEncoder {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.engine.release_context(handle);
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
    pub abr_adjustments: u64,
}
