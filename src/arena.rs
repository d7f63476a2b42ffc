//! The single growable byte buffer backing every field of one message.
//!
//! Field names and payloads are stored concatenated in one [`Arena`]. The only
//! mutation primitive is [`resize`], which inserts or excises a byte range at
//! an arbitrary offset and shifts the tail, so the move/fixup logic exists in
//! exactly one place. Fixing up field offsets after a resize is the field
//! directory's job, never done here.
//!
//! Growth doubles the buffer up to a bounded preallocation cap
//! ([`MAX_DATA_PREALLOCATION`]); shrink releases slack only once the cap is
//! exceeded, and then only down to half of it, so alternating add/remove does
//! not thrash the allocator.
//!
//! [`resize`]: Arena::resize

use crate::constants::MAX_DATA_PREALLOCATION;
use crate::error::Error;

#[derive(Clone, Default)]
pub struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    pub fn new() -> Self {
        let arena = Arena { buf: Vec::new() };

        assert!(arena.len() == 0);
        assert!(arena.available() == 0);

        arena
    }

    /// Live byte count (the message's `data_size`).
    #[inline]
    pub fn len(&self) -> u32 {
        assert!(self.buf.len() <= u32::MAX as usize);
        self.buf.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Preallocated slack beyond the live bytes.
    #[inline]
    pub fn available(&self) -> u32 {
        let available = self.buf.capacity() - self.buf.len();
        assert!(available <= u32::MAX as usize);
        available as u32
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bounds-checked read of `[offset, offset + len)`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds. Ranges handed in here come from
    /// field records that were either built by this crate or re-validated
    /// after unflatten, so an out-of-range access is an internal bug.
    #[inline]
    pub fn get(&self, offset: u32, len: u32) -> &[u8] {
        let start = offset as usize;
        let end = start + len as usize;

        assert!(end <= self.buf.len());

        &self.buf[start..end]
    }

    /// Little-endian `u32` read, used for variable-size length prefixes.
    #[inline]
    pub fn read_u32(&self, offset: u32) -> u32 {
        let bytes: [u8; 4] = self.get(offset, 4).try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    /// Overwrites `bytes.len()` bytes starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the destination range is out of bounds.
    #[inline]
    pub fn write(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        let end = start + bytes.len();

        assert!(end <= self.buf.len());

        self.buf[start..end].copy_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buf = Vec::new();

        assert!(self.len() == 0);
        assert!(self.available() == 0);
    }

    /// Grows (`change > 0`) or shrinks (`change < 0`) the buffer at `offset`,
    /// shifting the tail bytes. On growth the opened gap
    /// `[offset, offset + change)` holds stale bytes the caller must
    /// overwrite; on shrink the excised range is `[offset, offset - change)`.
    ///
    /// Fails only with [`Error::NoMemory`], either because allocation failed
    /// or because the buffer would outgrow the `u32` address space; in both
    /// cases the buffer is untouched. Callers must fix up any field offsets
    /// at or after `offset` immediately after a successful resize.
    ///
    /// # Panics
    ///
    /// Panics if `offset` exceeds the current length, or if a shrink reaches
    /// past the end of the buffer.
    pub fn resize(&mut self, offset: u32, change: i32) -> Result<(), Error> {
        let old_len = self.len();
        assert!(offset <= old_len);

        if change == 0 {
            return Ok(());
        }

        if change > 0 {
            let grow = change as u32;
            let new_len = old_len.checked_add(grow).ok_or(Error::NoMemory)?;

            if self.available() < grow {
                // Double, but never keep more than the preallocation cap in
                // slack, and always make room for the requested growth.
                let doubled = (old_len as u64 * 2)
                    .min(old_len as u64 + MAX_DATA_PREALLOCATION as u64)
                    .max(new_len as u64);
                let additional = doubled as usize - self.buf.len();
                self.buf.try_reserve_exact(additional)?;
            }

            assert!(self.available() >= grow);
            self.buf.resize(new_len as usize, 0);
            self.buf.copy_within(
                offset as usize..old_len as usize,
                offset as usize + grow as usize,
            );
        } else {
            let shrink = change.unsigned_abs();
            assert!(shrink <= old_len - offset);
            let new_len = old_len - shrink;

            self.buf.copy_within(
                (offset + shrink) as usize..old_len as usize,
                offset as usize,
            );
            self.buf.truncate(new_len as usize);

            if self.available() > MAX_DATA_PREALLOCATION {
                let keep = self.buf.len() + (MAX_DATA_PREALLOCATION / 2) as usize;
                self.buf.shrink_to(keep);
            }
        }

        assert!(self.len() as i64 == old_len as i64 + change as i64);
        Ok(())
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len())
            .field("available", &self.available())
            .finish()
    }
}
