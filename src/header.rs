//! The fixed-size wire header that fronts every flattened message.
//!
//! Layout (all scalars little-endian, packed):
//!
//! ```text
//! offset  size  field
//!      0     4  format tag
//!      4     4  what
//!      8     4  flags
//!     12     4  field_count
//!     16     4  data_size
//!     20     4  current_specifier
//!     24     4  target
//!     28     4  reply_port
//!     32     4  reply_team
//!     36     4  reply_target
//!     40    20  hash_table (5 x i32 bucket heads)
//! ```

use crate::constants::{FLAG_VALID, FORMAT_NATIVE, HASH_TABLE_SIZE, HEADER_SIZE_USIZE};

/// Decoded form of the wire header. Carries everything about a message that
/// is not a field: identity, status, routing, and the bucket-head table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MessageHeader {
    pub format: u32,
    pub what: u32,
    pub flags: u32,
    pub field_count: u32,
    pub data_size: u32,
    /// Top of the specifier stack, -1 when empty.
    pub current_specifier: i32,
    pub target: i32,
    pub reply_port: i32,
    pub reply_team: i32,
    pub reply_target: i32,
    pub hash_table: [i32; HASH_TABLE_SIZE],
}

impl MessageHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE_USIZE] {
        let mut bytes = [0u8; HEADER_SIZE_USIZE];
        bytes[0..4].copy_from_slice(&self.format.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.what.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.flags.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.field_count.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.current_specifier.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.target.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.reply_port.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.reply_team.to_le_bytes());
        bytes[36..40].copy_from_slice(&self.reply_target.to_le_bytes());
        for (i, head) in self.hash_table.iter().enumerate() {
            bytes[40 + i * 4..44 + i * 4].copy_from_slice(&head.to_le_bytes());
        }
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE_USIZE]) -> Self {
        let mut hash_table = [-1i32; HASH_TABLE_SIZE];
        for (i, head) in hash_table.iter_mut().enumerate() {
            *head = i32::from_le_bytes(bytes[40 + i * 4..44 + i * 4].try_into().unwrap());
        }

        MessageHeader {
            format: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            what: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            flags: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            field_count: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            data_size: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            current_specifier: i32::from_le_bytes(bytes[20..24].try_into().unwrap()),
            target: i32::from_le_bytes(bytes[24..28].try_into().unwrap()),
            reply_port: i32::from_le_bytes(bytes[28..32].try_into().unwrap()),
            reply_team: i32::from_le_bytes(bytes[32..36].try_into().unwrap()),
            reply_target: i32::from_le_bytes(bytes[36..40].try_into().unwrap()),
            hash_table,
        }
    }

    /// Cheap sanity gate run before any field record is decoded. The full
    /// structural validation happens later against the decoded directory.
    pub fn validate_basic(&self) -> Result<(), &'static str> {
        if self.format != FORMAT_NATIVE {
            return Err("unknown format tag");
        }
        if self.flags & FLAG_VALID == 0 {
            return Err("header not marked valid");
        }
        Ok(())
    }
}
