//! Transport sink interface

use crate::transport::buffer::TransportBuffer;

/// Takes finished packets off the packetizer's hands.
///
/// `frames` is the number of encoder frames the packet starts; it is zero
/// for continuation fragments. Returning false refuses the packet.
pub trait TransportSink {
    fn enqueue(&mut self, buffer: TransportBuffer, frames: u8) -> bool;
}

impl<F> TransportSink for F
where
    F: FnMut(TransportBuffer, u8) -> bool,
{
    fn enqueue(&mut self, buffer: TransportBuffer, frames: u8) -> bool {
        self(buffer, frames)
    }
}
