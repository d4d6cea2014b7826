//! Compression engine interface
//!
//! The LHDC compression algorithm is an opaque engine reached through a
//! fixed set of entry points. Implementations are injected into the
//! session at construction; nothing here knows how the engine is located
//! or loaded.

/// Opaque handle to an engine coding context
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle(u64);

impl EngineHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// PCM sample format fed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S16,
    S24,
}

impl SampleFormat {
    /// Format for a PCM word length in bytes; unknown lengths fall back to S16
    pub fn from_word_length(bytes: u8) -> Self {
        match bytes {
            3 => Self::S24,
            _ => Self::S16,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16 => 2,
            Self::S24 => 3,
        }
    }
}

/// Parameters the engine is initialised with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineInit {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub quality_index: u8,
    pub channel_mode: u8,
    /// Largest outgoing packet, payload header included
    pub mtu: usize,
}

/// Result of encoding one PCM block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeOutput {
    /// Bytes written to the output buffer (may be zero while the engine buffers)
    pub written: usize,
    /// Encoded frames completed by this call
    pub frames: u32,
}

/// Entry points of an LHDC compression engine.
///
/// Status codes are engine-defined; zero is success.
pub trait CompressionEngine {
    /// Obtain a coding context, `None` if the engine cannot provide one
    fn open_context(&mut self) -> Option<EngineHandle>;

    fn initialize(&mut self, handle: &EngineHandle, init: &EngineInit) -> Result<(), i32>;

    /// Encode one PCM block, appending the encoded bytes to `out`
    fn encode(&mut self, handle: &EngineHandle, pcm: &[u8], out: &mut Vec<u8>) -> Result<EncodeOutput, i32>;

    /// Select a fixed bitrate by quality index
    fn set_bitrate(&mut self, handle: &EngineHandle, index: u8);

    /// Adaptive bitrate step driven by the transmit queue depth
    fn adjust_bitrate(&mut self, handle: &EngineHandle, queue_depth: usize);

    /// Current transmission bitrate in kbps
    fn bitrate_kbps(&self, handle: &EngineHandle) -> u32;

    fn last_error(&self, handle: &EngineHandle) -> i32;

    fn release_context(&mut self, handle: EngineHandle);
}
