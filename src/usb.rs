//! Contract to the USB bulk transport.
//!
//! The USB stack itself lives outside this crate; the command adapter only
//! needs a blocking byte pipe.

/// Fixed size of a host command packet.
pub const COMMAND_PACKET_SIZE: usize = 16;

/// Size of the response scratch buffer (large enough for the 84-byte
/// register dump).
pub const TX_BUFFER_SIZE: usize = 128;

/// Size of the buffer used to stream memory transfers, one bulk transfer at
/// a time.
pub const DATA_BUFFER_SIZE: usize = 512;

/// Blocking bulk endpoint pair.
pub trait Transport {
    /// Send `data` to the host. Returns the number of bytes sent; zero
    /// signals failure.
    fn transmit(&mut self, data: &[u8]) -> usize;

    /// Receive up to `buf.len()` bytes from the host. Returns the number of
    /// bytes received.
    fn receive(&mut self, buf: &mut [u8]) -> usize;
}
