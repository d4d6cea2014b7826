//! Transport side: packet buffers, payload header and packetization

pub mod buffer;
pub mod header;
pub mod packetizer;
pub mod sink;

pub use buffer::{BufferPool, HeapBufferPool, TransportBuffer};
pub use header::{PayloadHeader, MAX_FRAMES_PER_PACKET};
pub use packetizer::{EmitIo, EmitOutcome, EmitStatus, Packetizer};
pub use sink::TransportSink;
