//! Error types for the LHDC source

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec information error: {0}")]
    Cie(#[from] CieError),

    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Codec Information Element errors
///
/// `WrongCodec` means the bytes describe some other codec; the `Bad*`
/// variants mean the bytes are ours but the configuration is malformed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CieError {
    #[error("Invalid parameters")]
    InvalidParams,

    #[error("Wrong codec")]
    WrongCodec,

    #[error("Bad sample rate: exactly one rate must be selected")]
    BadSampleRate,

    #[error("Bad channel mode: exactly one mode must be selected")]
    BadChannelMode,

    #[error("Sample rate not supported")]
    NotSupportedSampleRate,

    #[error("Bit depth not supported")]
    NotSupportedBitDepth,
}

/// Capability negotiation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Cannot parse peer codec information: {0}")]
    Cie(#[from] CieError),

    #[error("No common sample rate")]
    NoSampleRate,

    #[error("No common bit depth")]
    NoBitDepth,

    #[error("No common channel mode")]
    NoChannelMode,
}

/// Compression engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Encoder initialization failed with code {0}")]
    EncoderInit(i32),

    #[error("Encoding failed with code {0}")]
    EncodingFailed(i32),
}

/// Transport errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport buffer allocation failed")]
    BufferAllocationFailure,

    #[error("Invalid peer MTU: {0}")]
    InvalidMtu(u16),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
