//! Value kinds and the concrete types behind the convenience accessors.
//!
//! Type codes are four-character `u32` tags in big-endian character order, so
//! `b"LONG"` prints as `LONG` when rendered most-significant byte first. A
//! field stores an arbitrary `u32` tag; the constants here are the kinds the
//! typed accessor layer knows how to encode and decode.

use crate::error::Error;

/// Builds a four-character type tag.
#[inline]
pub const fn tag(value: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*value)
}

/// Matches any value kind in lookups; never stored in a field.
pub const ANY_TYPE: u32 = tag(b"ANYT");

pub const INT8_TYPE: u32 = tag(b"BYTE");
pub const INT16_TYPE: u32 = tag(b"SHRT");
pub const INT32_TYPE: u32 = tag(b"LONG");
pub const INT64_TYPE: u32 = tag(b"LLNG");
pub const BOOL_TYPE: u32 = tag(b"BOOL");
pub const FLOAT_TYPE: u32 = tag(b"FLOT");
pub const DOUBLE_TYPE: u32 = tag(b"DBLE");
pub const STRING_TYPE: u32 = tag(b"CSTR");
pub const POINT_TYPE: u32 = tag(b"BPNT");
pub const RECT_TYPE: u32 = tag(b"RECT");
pub const POINTER_TYPE: u32 = tag(b"PNTR");
pub const MESSENGER_TYPE: u32 = tag(b"MSNG");
pub const REF_TYPE: u32 = tag(b"RREF");
pub const MESSAGE_TYPE: u32 = tag(b"MSGG");

// =============================================================================
// Specifier kinds (the `what` code of a specifier sub-message)
// =============================================================================

pub const NO_SPECIFIER: u32 = 0;
pub const DIRECT_SPECIFIER: u32 = 1;
pub const INDEX_SPECIFIER: u32 = 2;
pub const RANGE_SPECIFIER: u32 = 4;
pub const NAME_SPECIFIER: u32 = 6;

// =============================================================================
// Concrete value types
// =============================================================================

/// 2D point, stored as two little-endian `f32` (8 bytes, fixed size).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const WIRE_SIZE: usize = 8;

    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut bytes = [0u8; Self::WIRE_SIZE];
        bytes[0..4].copy_from_slice(&self.x.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.y.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(Error::BadValue);
        }

        Ok(Point {
            x: f32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            y: f32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        })
    }
}

/// Axis-aligned rectangle, four little-endian `f32` (16 bytes, fixed size).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const WIRE_SIZE: usize = 16;

    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Rect { left, top, right, bottom }
    }

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut bytes = [0u8; Self::WIRE_SIZE];
        bytes[0..4].copy_from_slice(&self.left.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.top.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.right.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.bottom.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(Error::BadValue);
        }

        Ok(Rect {
            left: f32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            top: f32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            right: f32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            bottom: f32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        })
    }
}

/// Opaque handle naming a delivery endpoint: port, team, and handler token.
/// Carried verbatim; resolving it is the transport's business. A `target`
/// of -1 addresses the receiver's preferred handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Messenger {
    pub port: i32,
    pub team: i32,
    pub target: i32,
}

impl Messenger {
    pub const WIRE_SIZE: usize = 12;

    pub fn to_bytes(self) -> [u8; Self::WIRE_SIZE] {
        let mut bytes = [0u8; Self::WIRE_SIZE];
        bytes[0..4].copy_from_slice(&self.port.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.team.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.target.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::WIRE_SIZE {
            return Err(Error::BadValue);
        }

        Ok(Messenger {
            port: i32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            team: i32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            target: i32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

impl Default for Messenger {
    fn default() -> Self {
        Messenger { port: -1, team: -1, target: -1 }
    }
}

/// Reference to a filesystem entry: device, parent directory, leaf name.
/// Variable size on the wire: `device: i32, directory: i64, name bytes, NUL`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryRef {
    pub device: i32,
    pub directory: i64,
    pub name: String,
}

impl EntryRef {
    const FIXED_PART: usize = 4 + 8;

    pub fn flattened_size(&self) -> usize {
        Self::FIXED_PART + self.name.len() + 1
    }

    pub fn flatten_to_vec(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.flattened_size());
        bytes.extend_from_slice(&self.device.to_le_bytes());
        bytes.extend_from_slice(&self.directory.to_le_bytes());
        bytes.extend_from_slice(self.name.as_bytes());
        bytes.push(0);

        assert!(bytes.len() == self.flattened_size());
        bytes
    }

    pub fn unflatten(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < Self::FIXED_PART + 1 || bytes[bytes.len() - 1] != 0 {
            return Err(Error::BadValue);
        }

        let name_bytes = &bytes[Self::FIXED_PART..bytes.len() - 1];
        let name = core::str::from_utf8(name_bytes)
            .map_err(|_| Error::BadValue)?
            .to_owned();

        Ok(EntryRef {
            device: i32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            directory: i64::from_le_bytes(bytes[4..12].try_into().unwrap()),
            name,
        })
    }
}

/// Values that can serialize themselves into a message field.
///
/// The stored bytes are an eager copy taken at add time; mutating the source
/// object afterward does not change the message.
pub trait Flattenable {
    /// The type tag under which instances are stored and looked up.
    fn type_code(&self) -> u32;

    /// Exact byte length [`flatten`](Self::flatten) will produce.
    fn flattened_size(&self) -> usize;

    /// Whether every instance flattens to the same byte length.
    fn is_fixed_size(&self) -> bool {
        false
    }

    /// Writes the wire form into `buffer` (exactly `flattened_size()` bytes).
    fn flatten(&self, buffer: &mut [u8]) -> Result<(), Error>;

    /// Rebuilds the value from its wire form.
    fn unflatten(&mut self, type_code: u32, buffer: &[u8]) -> Result<(), Error>;
}

/// Renders a type tag the way it was written: four ASCII characters when
/// printable, hex otherwise.
pub(crate) fn format_tag(value: u32) -> String {
    let bytes = value.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        format!("{value:#010x}")
    }
}
