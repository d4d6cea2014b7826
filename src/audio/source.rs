//! PCM source interface

/// Supplies interleaved little-endian PCM to the streaming tick.
///
/// `read` fills as much of `buf` as is available and returns the number
/// of bytes written. Zero means the source has nothing right now.
pub trait PcmSource {
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<F> PcmSource for F
where
    F: FnMut(&mut [u8]) -> usize,
{
    fn read(&mut self, buf: &mut [u8]) -> usize {
        self(buf)
    }
}
