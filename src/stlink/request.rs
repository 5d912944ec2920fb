//! Incoming command-packet parsing.

use super::CommandGroup;
use crate::usb::COMMAND_PACKET_SIZE;

/// Cursor over one fixed-size command packet.
///
/// The packet length is validated up front, so field reads at the fixed
/// offsets of the wire layout cannot run out of bounds.
pub struct Request<'a> {
    /// Command group selected by byte 0.
    pub group: CommandGroup,
    data: &'a [u8],
}

impl<'a> Request<'a> {
    /// Returns `None` for short packets or an unknown command group.
    pub fn from_packet(packet: &'a [u8]) -> Option<Self> {
        if packet.len() < COMMAND_PACKET_SIZE {
            return None;
        }
        let (group, data) = packet.split_first()?;
        let group = CommandGroup::try_from(*group).ok()?;
        Some(Request { group, data })
    }

    /// Consume the next byte.
    pub fn next_u8(&mut self) -> u8 {
        let value = self.data[0];
        self.data = &self.data[1..];
        value
    }

    /// Consume the next little-endian u16.
    pub fn next_u16(&mut self) -> u16 {
        let value = u16::from_le_bytes(self.data[0..2].try_into().unwrap_or([0; 2]));
        self.data = &self.data[2..];
        value
    }

    /// Consume the next little-endian u32.
    pub fn next_u32(&mut self) -> u32 {
        let value = u32::from_le_bytes(self.data[0..4].try_into().unwrap_or([0; 4]));
        self.data = &self.data[4..];
        value
    }
}
