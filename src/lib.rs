//! # LHDC Source
//!
//! Source-side LHDC codec support for A2DP streaming: capability
//! negotiation, frame pacing and transport packetization.
//!
//! ## Architecture Overview
//!
//! ```text
//!                     CONFIGURATION
//!
//!   peer CIE bytes ──► ┌──────────────┐     user / audio / default
//!                      │ CIE codec    │     preferences
//!                      │ (codec::cie) │          │
//!                      └──────┬───────┘          ▼
//!                             │        ┌──────────────────────┐
//!                             └──────► │ Negotiator           │
//!                                      │ (codec::negotiator)  │
//!                                      │ all-or-nothing commit│
//!                                      └──────────┬───────────┘
//!                                                 │ CodecConfig
//!                         ┌───────────────────────┴───────┐
//!                         ▼                               ▼
//!               ┌──────────────────┐            ┌────────────────────┐
//!               │ Feeding clock    │            │ LHDC encoder       │
//!               │ (audio::feeding) │            │ (codec::encoder)   │
//!               └────────┬─────────┘            └─────────┬──────────┘
//!                        │ every 20 ms tick               │
//!                        ▼         STREAMING              ▼
//!   ┌─────────────┐  frames due  ┌──────────────────────────────────┐
//!   │ PCM source  │ ───────────► │ Packetizer (transport)           │ ──► sink
//!   │ read()      │   PCM block  │ encode, fragment to MTU,         │  enqueue()
//!   └─────────────┘              │ stamp header + timestamp         │
//!                                └──────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{PeerParams, SessionReport, SourceSession, StreamIo};

/// Codec-wide constants
pub mod constants {
    /// Streaming tick interval in milliseconds
    pub const ENCODER_INTERVAL_MS: u64 = 20;

    /// Streaming tick interval in microseconds
    pub const ENCODER_INTERVAL_US: u64 = ENCODER_INTERVAL_MS * 1000;

    /// PCM samples per channel consumed by one encoder block
    pub const ENCODER_BLOCK_SAMPLES: usize = 512;

    /// AVDTP media packet header size
    pub const MEDIA_HEADER_LEN: usize = 12;

    /// Content protection (SCMS-T) header size
    pub const CP_HEADER_LEN: usize = 1;

    /// Transport buffer size handed out by the buffer pool
    pub const TRANSPORT_BUFFER_SIZE: usize = 4096;

    /// Default peer MTU when none was negotiated
    pub const DEFAULT_PEER_MTU: u16 = 895;
}
