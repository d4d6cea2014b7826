//! Audio side of the source: PCM supply and pacing

pub mod buffer;
pub mod feeding;
pub mod source;
pub mod tone;

pub use buffer::{create_shared_buffer, PcmReader, PcmRingBuffer, SharedPcmBuffer};
pub use feeding::{FeedingClock, FeedingParams, FeedingState};
pub use source::PcmSource;
pub use tone::ToneSource;
