//! MPEG transport stream packets
//!
//! The switch never looks inside packets beyond the header fields needed
//! for logging. Packets travel between workers in shared batches so that
//! handing a window to the output never copies payload bytes.

use std::fmt;

/// Size of a transport stream packet in bytes
pub const PKT_SIZE: usize = 188;

/// First byte of every packet
pub const SYNC_BYTE: u8 = 0x47;

/// PID reserved for null (stuffing) packets
pub const PID_NULL: u16 = 0x1FFF;

/// A single 188-byte transport stream packet
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TsPacket {
    bytes: [u8; PKT_SIZE],
}

impl TsPacket {
    /// A null packet: PID 0x1FFF, payload only, filled with 0xFF
    pub const NULL: TsPacket = {
        let mut bytes = [0xFFu8; PKT_SIZE];
        bytes[0] = SYNC_BYTE;
        bytes[1] = 0x1F;
        bytes[2] = 0xFF;
        bytes[3] = 0x10;
        TsPacket { bytes }
    };

    /// Wrap raw bytes, rejecting buffers without the sync byte
    pub fn from_bytes(bytes: [u8; PKT_SIZE]) -> Option<Self> {
        (bytes[0] == SYNC_BYTE).then_some(Self { bytes })
    }

    /// Parse a packet from the front of a slice
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; PKT_SIZE] = data.get(..PKT_SIZE)?.try_into().ok()?;
        Self::from_bytes(bytes)
    }

    /// Build a payload-only packet on `pid` with the given continuity counter
    pub fn with_payload(pid: u16, continuity: u8, payload: &[u8]) -> Self {
        let mut bytes = [0xFFu8; PKT_SIZE];
        bytes[0] = SYNC_BYTE;
        bytes[1] = ((pid >> 8) & 0x1F) as u8;
        bytes[2] = (pid & 0xFF) as u8;
        bytes[3] = 0x10 | (continuity & 0x0F);
        let len = payload.len().min(PKT_SIZE - 4);
        bytes[4..4 + len].copy_from_slice(&payload[..len]);
        Self { bytes }
    }

    /// Packet identifier
    pub fn pid(&self) -> u16 {
        (u16::from(self.bytes[1] & 0x1F) << 8) | u16::from(self.bytes[2])
    }

    /// Continuity counter (4 bits)
    pub fn continuity_counter(&self) -> u8 {
        self.bytes[3] & 0x0F
    }

    /// Payload unit start indicator
    pub fn pusi(&self) -> bool {
        self.bytes[1] & 0x40 != 0
    }

    /// Whether this is a stuffing packet
    pub fn is_null(&self) -> bool {
        self.pid() == PID_NULL
    }

    /// Payload bytes after the 4-byte header (adaptation fields are not skipped)
    pub fn payload(&self) -> &[u8] {
        &self.bytes[4..]
    }

    /// Raw packet bytes
    pub fn as_bytes(&self) -> &[u8; PKT_SIZE] {
        &self.bytes
    }
}

impl Default for TsPacket {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for TsPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsPacket")
            .field("pid", &format_args!("0x{:04X}", self.pid()))
            .field("cc", &self.continuity_counter())
            .field("pusi", &self.pusi())
            .finish()
    }
}
