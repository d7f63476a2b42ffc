//! Wire-format and bookkeeping constants.
//!
//! # Design Decisions
//!
//! Size constants use `u32` instead of `usize` so the wire format reads the
//! same on every platform. All structural relationships are verified at
//! compile time via `const` assertions.

// Compile-time proof that u32 -> usize is safe on this platform.
const _: () = assert!(
    core::mem::size_of::<usize>() >= core::mem::size_of::<u32>(),
    "Platform must have at least 32-bit addressing"
);

// =============================================================================
// Wire format constants
// =============================================================================

/// Native format tag, the first four bytes of every flattened message.
/// Any other leading tag is routed to a legacy-format adapter.
pub const FORMAT_NATIVE: u32 = u32::from_be_bytes(*b"1FMH");

/// Number of hash-bucket heads in the field directory. The table is part of
/// the wire header, so this is a format constant, not a tuning knob.
pub const HASH_TABLE_SIZE: usize = 5;

/// Fixed wire header size: nine `u32`/`i32` scalars plus one `i32` reply
/// target plus the bucket-head table.
pub const HEADER_SIZE: u32 = 40 + (HASH_TABLE_SIZE as u32) * 4;

/// Size of one field record on the wire (packed, no padding).
pub const FIELD_RECORD_SIZE: u32 = 22;

/// Longest permitted field name in bytes, excluding the NUL terminator.
/// `name_length` is stored in a single byte and includes the terminator.
pub const FIELD_NAME_LENGTH_MAX: usize = 254;

// =============================================================================
// Preallocation policy
// =============================================================================

/// Upper bound on arena slack kept beyond the live bytes. Growth doubles the
/// buffer until the slack would exceed this; shrink releases down to half of
/// it once the slack crosses it.
pub const MAX_DATA_PREALLOCATION: u32 = 4096 * 10;

/// Upper bound on spare field records kept in the directory array, with the
/// same doubling/shrink discipline as the arena.
pub const MAX_FIELD_PREALLOCATION: u32 = 50;

// =============================================================================
// Message status flags
// =============================================================================

/// Set on every live message; a flattened buffer without it is rejected.
pub const FLAG_VALID: u32 = 0x0001;
pub const FLAG_REPLY_REQUIRED: u32 = 0x0002;
pub const FLAG_REPLY_DONE: u32 = 0x0004;
pub const FLAG_IS_REPLY: u32 = 0x0008;
pub const FLAG_WAS_DELIVERED: u32 = 0x0010;
pub const FLAG_HAS_SPECIFIERS: u32 = 0x0020;
pub const FLAG_WAS_DROPPED: u32 = 0x0040;
/// The payload travels out of band in a shared memory region.
pub const FLAG_PASS_BY_AREA: u32 = 0x0080;

/// Flags that describe one delivery and do not survive a deep copy.
pub const FLAGS_DELIVERY: u32 = FLAG_REPLY_REQUIRED
    | FLAG_REPLY_DONE
    | FLAG_IS_REPLY
    | FLAG_WAS_DELIVERED
    | FLAG_WAS_DROPPED
    | FLAG_PASS_BY_AREA;

// =============================================================================
// Field record flags
// =============================================================================

pub const FIELD_FLAG_VALID: u8 = 0x01;
/// Every element of the field has identical byte width.
pub const FIELD_FLAG_FIXED_SIZE: u8 = 0x02;

// =============================================================================
// Reserved field names (specifier stack)
// =============================================================================

pub const SPECIFIER_ENTRY: &str = "specifiers";
pub const PROPERTY_ENTRY: &str = "property";
pub const PROPERTY_NAME_ENTRY: &str = "name";

// =============================================================================
// Compile-time design integrity assertions
// =============================================================================

const _: () = assert!(HEADER_SIZE == 60, "header layout is part of the wire format");
const _: () = assert!(FIELD_RECORD_SIZE == 4 + 4 + 4 + 1 + 1 + 4 + 4);
const _: () = assert!(HASH_TABLE_SIZE > 0);
const _: () = assert!(FIELD_NAME_LENGTH_MAX + 1 <= u8::MAX as usize);
const _: () = assert!(MAX_DATA_PREALLOCATION > 0);
const _: () = assert!(MAX_FIELD_PREALLOCATION > 0);
const _: () = assert!(FLAGS_DELIVERY & FLAG_VALID == 0);
const _: () = assert!(FLAGS_DELIVERY & FLAG_HAS_SPECIFIERS == 0);

// =============================================================================
// Pre-converted usize constants
// =============================================================================

/// [`HEADER_SIZE`] as `usize`.
pub const HEADER_SIZE_USIZE: usize = HEADER_SIZE as usize;

/// [`FIELD_RECORD_SIZE`] as `usize`.
pub const FIELD_RECORD_SIZE_USIZE: usize = FIELD_RECORD_SIZE as usize;

const _: () = assert!(HEADER_SIZE_USIZE == HEADER_SIZE as usize);
const _: () = assert!(FIELD_RECORD_SIZE_USIZE == FIELD_RECORD_SIZE as usize);
