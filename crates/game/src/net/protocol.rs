use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use super::error::WireError;

pub const APP_MAGIC: u32 = 0x5356_4C41;
pub const PROTOCOL_VERSION: u16 = 3;
pub const HEADER_SIZE: usize = 12;
pub const MAX_PACKET_SIZE: usize = 1200;
pub const DEFAULT_PORT: u16 = 27016;

pub const MAX_NAME_LEN: usize = 16;
pub const MAX_CHAT_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub app_magic: u32,
    /// Highest reliable sequence number the sender has received in order.
    pub ack: u32,
    pub timestamp: u32,
}

impl PacketHeader {
    pub fn new(ack: u32, timestamp: u32) -> Self {
        Self {
            app_magic: APP_MAGIC,
            ack,
            timestamp,
        }
    }

    pub fn encode<W: Write>(writer: &mut W, ack: u32, timestamp: u32) -> Result<(), WireError> {
        writer.write_u32::<LittleEndian>(APP_MAGIC)?;
        writer.write_u32::<LittleEndian>(ack)?;
        writer.write_u32::<LittleEndian>(timestamp)?;
        Ok(())
    }

    /// `None` means the whole datagram must be discarded.
    pub fn decode<R: Read>(reader: &mut R) -> Option<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        if reader.read_exact(&mut raw).is_err() {
            warn!("Discarding datagram shorter than packet header");
            return None;
        }

        let mut fields = &raw[..];
        let app_magic = fields.read_u32::<LittleEndian>().ok()?;
        if app_magic != APP_MAGIC {
            warn!("Discarding datagram with foreign magic {:#010x}", app_magic);
            return None;
        }

        Some(Self {
            app_magic,
            ack: fields.read_u32::<LittleEndian>().ok()?,
            timestamp: fields.read_u32::<LittleEndian>().ok()?,
        })
    }
}
