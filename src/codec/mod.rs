//! LHDC codec support
//!
//! Codec information element layout, capability negotiation and the
//! encoder wrapper around an injected compression engine.

pub mod cie;
pub mod encoder;
pub mod engine;
pub mod fixed_rate;
pub mod negotiator;
pub mod types;

pub use encoder::{EncoderParams, EncoderStats, Latency, LhdcEncoder, Quality};
pub use engine::{CompressionEngine, EncodeOutput, EngineHandle, EngineInit, SampleFormat};
pub use fixed_rate::FixedRateEngine;
pub use negotiator::{LhdcCodec, NegotiationSnapshot};
pub use types::{BitDepth, ChannelMode, Cie, CodecConfig, SampleRate};
