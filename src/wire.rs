//! Flattening to and from the stable wire layout.
//!
//! A flattened message is `[header][field records][arena bytes]`, sizes and
//! offsets little-endian. The layout is position-independent: nothing in it
//! is a pointer, so the bytes can cross process, machine, or storage
//! boundaries unchanged.
//!
//! Unflattening treats the buffer as hostile. The header is sanity-gated,
//! every size computation is checked, and the decoded directory goes through
//! the full structural validator before it replaces the message's state. Any
//! violation resets the message to empty and reports [`Error::BadValue`];
//! accessors never see a half-decoded message.

use std::io::{Read, Write};

use crate::arena::Arena;
use crate::constants::{
    FIELD_RECORD_SIZE_USIZE, FORMAT_NATIVE, HEADER_SIZE_USIZE, SPECIFIER_ENTRY,
};
use crate::error::Error;
use crate::fields::{FieldDirectory, FieldHeader};
use crate::header::MessageHeader;
use crate::message::Message;
use crate::types::MESSAGE_TYPE;

/// Decoder hook for buffers whose leading format tag is not the native one.
///
/// [`Message::unflatten_with`] hands the tag and the whole buffer to the
/// adapter; the adapter either populates the message or rejects the buffer.
pub trait ForeignFormat {
    fn unflatten(&self, format: u32, message: &mut Message, buffer: &[u8]) -> Result<(), Error>;
}

impl Message {
    /// Exact size [`flatten`](Message::flatten) will produce.
    pub fn flattened_size(&self) -> usize {
        HEADER_SIZE_USIZE
            + self.directory.len() * FIELD_RECORD_SIZE_USIZE
            + self.arena.len() as usize
    }

    /// Writes the wire form into `buffer`. Fails with
    /// [`Error::BufferOverflow`] if the buffer is smaller than
    /// [`flattened_size`](Message::flattened_size); extra trailing space is
    /// left untouched.
    pub fn flatten(&self, buffer: &mut [u8]) -> Result<(), Error> {
        let size = self.flattened_size();
        if buffer.len() < size {
            return Err(Error::BufferOverflow);
        }

        buffer[..HEADER_SIZE_USIZE].copy_from_slice(&self.wire_header().encode());

        let mut pos = HEADER_SIZE_USIZE;
        for field in self.directory.iter() {
            buffer[pos..pos + FIELD_RECORD_SIZE_USIZE].copy_from_slice(&field.encode());
            pos += FIELD_RECORD_SIZE_USIZE;
        }

        buffer[pos..size].copy_from_slice(self.arena.as_slice());
        Ok(())
    }

    /// Flattens into a freshly allocated, exactly sized buffer.
    pub fn flatten_to_vec(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.flattened_size()];
        let flattened = self.flatten(&mut buffer);
        assert!(flattened.is_ok());
        buffer
    }

    /// Flattens into any [`Write`] sink. Sink errors come back as
    /// [`Error::Io`].
    pub fn flatten_into<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writer.write_all(&self.flatten_to_vec())?;
        Ok(())
    }

    /// Replaces this message's entire state with the contents of `buffer`.
    ///
    /// Buffers carrying a non-native format tag are rejected with
    /// [`Error::BadValue`]; use [`unflatten_with`](Message::unflatten_with)
    /// to route them to an adapter. On any failure the message is reset to
    /// empty.
    pub fn unflatten(&mut self, buffer: &[u8]) -> Result<(), Error> {
        struct RejectForeign;
        impl ForeignFormat for RejectForeign {
            fn unflatten(&self, _: u32, _: &mut Message, _: &[u8]) -> Result<(), Error> {
                Err(Error::BadValue)
            }
        }
        self.unflatten_with(buffer, &RejectForeign)
    }

    /// Like [`unflatten`](Message::unflatten), but hands buffers with an
    /// unknown leading tag to `foreign` instead of rejecting them.
    pub fn unflatten_with(
        &mut self,
        buffer: &[u8],
        foreign: &dyn ForeignFormat,
    ) -> Result<(), Error> {
        if buffer.len() >= 4 {
            let format = u32::from_le_bytes(buffer[0..4].try_into().unwrap());
            if format != FORMAT_NATIVE {
                return foreign.unflatten(format, self, buffer);
            }
        }

        match self.unflatten_native(buffer) {
            Ok(()) => Ok(()),
            Err(err) => {
                *self = Message::new();
                Err(err)
            }
        }
    }

    /// Reads one flattened message from any [`Read`] source. Short reads and
    /// transport failures come back as [`Error::Io`]; corrupt content as
    /// [`Error::BadValue`]. Foreign formats are not supported on streams.
    pub fn unflatten_from<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        let mut header_bytes = [0u8; HEADER_SIZE_USIZE];
        reader.read_exact(&mut header_bytes)?;

        let header = MessageHeader::decode(&header_bytes);
        if header.validate_basic().is_err() {
            return Err(Error::BadValue);
        }
        // Gate the sizes before trusting them as a read length.
        let body_len = Self::body_len(&header)?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(HEADER_SIZE_USIZE + body_len)?;
        buffer.extend_from_slice(&header_bytes);
        buffer.resize(HEADER_SIZE_USIZE + body_len, 0);
        reader.read_exact(&mut buffer[HEADER_SIZE_USIZE..])?;

        self.unflatten(&buffer)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn wire_header(&self) -> MessageHeader {
        MessageHeader {
            format: FORMAT_NATIVE,
            what: self.what,
            flags: self.flags,
            field_count: self.directory.len() as u32,
            data_size: self.arena.len(),
            current_specifier: self.current_specifier,
            target: self.target,
            reply_port: self.reply_port,
            reply_team: self.reply_team,
            reply_target: self.reply_target,
            hash_table: *self.directory.hash_table(),
        }
    }

    /// Checked `records + arena` length from an untrusted header.
    fn body_len(header: &MessageHeader) -> Result<usize, Error> {
        if header.data_size > i32::MAX as u32 {
            return Err(Error::BadValue);
        }
        let records = (header.field_count as usize)
            .checked_mul(FIELD_RECORD_SIZE_USIZE)
            .ok_or(Error::BadValue)?;
        records
            .checked_add(header.data_size as usize)
            .ok_or(Error::BadValue)
    }

    fn unflatten_native(&mut self, buffer: &[u8]) -> Result<(), Error> {
        if buffer.len() < HEADER_SIZE_USIZE {
            return Err(Error::BadValue);
        }

        let header = MessageHeader::decode(buffer[..HEADER_SIZE_USIZE].try_into().unwrap());
        if header.validate_basic().is_err() {
            return Err(Error::BadValue);
        }

        let body_len = Self::body_len(&header)?;
        let total = HEADER_SIZE_USIZE
            .checked_add(body_len)
            .ok_or(Error::BadValue)?;
        // Trailing bytes beyond the declared size are tolerated so messages
        // can be unflattened out of larger framings.
        if buffer.len() < total {
            return Err(Error::BadValue);
        }

        let field_count = header.field_count as usize;
        let mut fields = Vec::new();
        fields.try_reserve_exact(field_count)?;
        for index in 0..field_count {
            let start = HEADER_SIZE_USIZE + index * FIELD_RECORD_SIZE_USIZE;
            let record = buffer[start..start + FIELD_RECORD_SIZE_USIZE]
                .try_into()
                .unwrap();
            fields.push(FieldHeader::decode(record));
        }

        let arena_start = HEADER_SIZE_USIZE + field_count * FIELD_RECORD_SIZE_USIZE;
        let mut arena = Arena::new();
        arena.resize(0, header.data_size as i32)?;
        arena.write(0, &buffer[arena_start..total]);

        let directory = FieldDirectory::from_wire(fields, header.hash_table);
        if directory.validate(&arena).is_err() {
            return Err(Error::BadValue);
        }

        if header.current_specifier < -1 {
            return Err(Error::BadValue);
        }
        if header.current_specifier >= 0 {
            // The cursor must point into the specifier stack.
            let depth = match directory.find(&arena, SPECIFIER_ENTRY, MESSAGE_TYPE) {
                Ok(index) => directory.get(index).count,
                Err(_) => 0,
            };
            if header.current_specifier as u32 >= depth {
                return Err(Error::BadValue);
            }
        }

        self.what = header.what;
        self.flags = header.flags;
        self.current_specifier = header.current_specifier;
        self.target = header.target;
        self.reply_port = header.reply_port;
        self.reply_team = header.reply_team;
        self.reply_target = header.reply_target;
        self.directory = directory;
        self.arena = arena;
        Ok(())
    }
}
