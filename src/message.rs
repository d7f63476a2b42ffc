//! The public message container: typed accessors over the arena and field
//! directory, plus the scripting specifier stack.
//!
//! All mutation funnels through [`Message::add_data`],
//! [`Message::replace_data`], and [`Message::remove_data`]; the typed
//! `add_*`/`find_*`/`replace_*` relays only encode and decode element bytes.
//! Fixed-size fields store elements back to back; variable-size fields
//! prefix every element with a 4-byte little-endian length.

use crate::arena::Arena;
use crate::constants::{
    FLAGS_DELIVERY, FLAG_HAS_SPECIFIERS, FLAG_IS_REPLY, FLAG_REPLY_DONE, FLAG_REPLY_REQUIRED,
    FLAG_VALID, FLAG_WAS_DELIVERED, FLAG_WAS_DROPPED, PROPERTY_ENTRY, PROPERTY_NAME_ENTRY,
    SPECIFIER_ENTRY,
};
use crate::error::Error;
use crate::fields::{FieldDirectory, FieldHeader};
use crate::types::{
    self, ANY_TYPE, BOOL_TYPE, DIRECT_SPECIFIER, DOUBLE_TYPE, EntryRef, FLOAT_TYPE,
    Flattenable, INDEX_SPECIFIER, INT16_TYPE, INT32_TYPE, INT64_TYPE, INT8_TYPE,
    MESSAGE_TYPE, MESSENGER_TYPE, Messenger, NAME_SPECIFIER, POINTER_TYPE, POINT_TYPE,
    Point, RANGE_SPECIFIER, RECT_TYPE, REF_TYPE, Rect, STRING_TYPE,
};

/// A self-describing container of typed, named, possibly-repeated values.
///
/// The `what` code identifies the message's purpose and is freely writable;
/// everything else is reached through accessors. See the crate docs for an
/// overview of the storage layout.
pub struct Message {
    /// Application-defined purpose code, conventionally a four-character tag.
    pub what: u32,
    pub(crate) flags: u32,
    pub(crate) current_specifier: i32,
    pub(crate) target: i32,
    pub(crate) reply_port: i32,
    pub(crate) reply_team: i32,
    pub(crate) reply_target: i32,
    pub(crate) directory: FieldDirectory,
    pub(crate) arena: Arena,
}

impl Default for Message {
    fn default() -> Self {
        Message::new()
    }
}

/// Accessor relays for integer-like kinds stored as little-endian bytes.
/// The `bool` arm stores one byte; any nonzero byte reads back as `true`.
macro_rules! numeric_accessors {
    (
        bool, $type_code:expr,
        $add:ident, $find:ident, $find_at:ident, $replace:ident, $replace_at:ident, $has:ident
    ) => {
        pub fn $add(&mut self, name: &str, value: bool) -> Result<(), Error> {
            self.add_data(name, $type_code, &[value as u8], true)
        }

        pub fn $find(&self, name: &str) -> Result<bool, Error> {
            self.$find_at(name, 0)
        }

        pub fn $find_at(&self, name: &str, index: u32) -> Result<bool, Error> {
            let bytes = self.find_data(name, $type_code, index)?;
            if bytes.len() != 1 {
                return Err(Error::BadValue);
            }
            Ok(bytes[0] != 0)
        }

        pub fn $replace(&mut self, name: &str, value: bool) -> Result<(), Error> {
            self.$replace_at(name, 0, value)
        }

        pub fn $replace_at(&mut self, name: &str, index: u32, value: bool) -> Result<(), Error> {
            self.replace_data(name, $type_code, index, &[value as u8])
        }

        pub fn $has(&self, name: &str) -> bool {
            self.find_data(name, $type_code, 0).is_ok()
        }
    };
    (
        $value:ty, $type_code:expr,
        $add:ident, $find:ident, $find_at:ident, $replace:ident, $replace_at:ident, $has:ident
    ) => {
        pub fn $add(&mut self, name: &str, value: $value) -> Result<(), Error> {
            self.add_data(name, $type_code, &value.to_le_bytes(), true)
        }

        pub fn $find(&self, name: &str) -> Result<$value, Error> {
            self.$find_at(name, 0)
        }

        pub fn $find_at(&self, name: &str, index: u32) -> Result<$value, Error> {
            let bytes = self.find_data(name, $type_code, index)?;
            let bytes = bytes.try_into().map_err(|_| Error::BadValue)?;
            Ok(<$value>::from_le_bytes(bytes))
        }

        pub fn $replace(&mut self, name: &str, value: $value) -> Result<(), Error> {
            self.$replace_at(name, 0, value)
        }

        pub fn $replace_at(&mut self, name: &str, index: u32, value: $value) -> Result<(), Error> {
            self.replace_data(name, $type_code, index, &value.to_le_bytes())
        }

        pub fn $has(&self, name: &str) -> bool {
            self.find_data(name, $type_code, 0).is_ok()
        }
    };
}

/// Accessor relays for struct kinds with `to_bytes`/`from_bytes`.
macro_rules! struct_accessors {
    (
        $value:ty, $type_code:expr,
        $add:ident, $find:ident, $find_at:ident, $replace:ident, $replace_at:ident, $has:ident
    ) => {
        pub fn $add(&mut self, name: &str, value: $value) -> Result<(), Error> {
            self.add_data(name, $type_code, &value.to_bytes(), true)
        }

        pub fn $find(&self, name: &str) -> Result<$value, Error> {
            self.$find_at(name, 0)
        }

        pub fn $find_at(&self, name: &str, index: u32) -> Result<$value, Error> {
            <$value>::from_bytes(self.find_data(name, $type_code, index)?)
        }

        pub fn $replace(&mut self, name: &str, value: $value) -> Result<(), Error> {
            self.$replace_at(name, 0, value)
        }

        pub fn $replace_at(&mut self, name: &str, index: u32, value: $value) -> Result<(), Error> {
            self.replace_data(name, $type_code, index, &value.to_bytes())
        }

        pub fn $has(&self, name: &str) -> bool {
            self.find_data(name, $type_code, 0).is_ok()
        }
    };
}

impl Message {
    /// Creates an empty message with a zero `what` code.
    pub fn new() -> Self {
        Message::with_what(0)
    }

    /// Creates an empty message carrying `what`.
    pub fn with_what(what: u32) -> Self {
        Message {
            what,
            flags: FLAG_VALID,
            current_specifier: -1,
            target: -1,
            reply_port: -1,
            reply_team: -1,
            reply_target: -1,
            directory: FieldDirectory::new(),
            arena: Arena::new(),
        }
    }

    // =========================================================================
    // Raw data plane
    // =========================================================================

    /// Appends one element to the field `name`, creating the field on first
    /// use. All typed `add_*` relays land here.
    ///
    /// Fails with [`Error::BadType`] if the name exists under another type,
    /// [`Error::BadValue`] for empty data, a malformed name, or an element
    /// width that contradicts an existing fixed-size field, and
    /// [`Error::NoMemory`] if allocation fails; in every case the message is
    /// unchanged, including rollback of a freshly created field.
    pub fn add_data(
        &mut self,
        name: &str,
        type_code: u32,
        data: &[u8],
        fixed_size: bool,
    ) -> Result<(), Error> {
        if type_code == ANY_TYPE || data.is_empty() {
            return Err(Error::BadValue);
        }
        if data.len() > (u32::MAX - 4) as usize {
            return Err(Error::BadValue);
        }

        let (index, created) = match self.directory.find(&self.arena, name, type_code) {
            Ok(index) => (index, false),
            Err(Error::NameNotFound) => {
                let index = self
                    .directory
                    .create(&mut self.arena, name, type_code, fixed_size)?;
                (index, true)
            }
            Err(err) => return Err(err),
        };

        let field = *self.directory.get(index);
        if field.is_fixed_size() != fixed_size {
            return Err(Error::BadValue);
        }
        if field.is_fixed_size() && field.count > 0 {
            let width = field.data_size / field.count;
            if data.len() as u32 != width {
                return Err(Error::BadValue);
            }
        }

        let stored = if fixed_size {
            data.len() as u32
        } else {
            4 + data.len() as u32
        };
        let end = field.offset + field.total_size();

        if let Err(err) = self.directory.resize_data(&mut self.arena, end, stored as i64) {
            // A field created above with nothing in it must not survive.
            if created {
                self.directory.remove(&mut self.arena, index);
            }
            return Err(err);
        }

        if fixed_size {
            self.arena.write(end, data);
        } else {
            self.arena.write(end, &(data.len() as u32).to_le_bytes());
            self.arena.write(end + 4, data);
        }

        let field = self.directory.get_mut(index);
        field.count += 1;
        field.data_size += stored;
        Ok(())
    }

    /// Borrows the bytes of element `index` of field `name`.
    ///
    /// Fixed-size elements resolve in constant time; variable-size elements
    /// walk the length prefixes. The borrow is invalidated by any mutation.
    pub fn find_data(&self, name: &str, type_code: u32, index: u32) -> Result<&[u8], Error> {
        let field = *self
            .directory
            .get(self.directory.find(&self.arena, name, type_code)?);
        if index >= field.count {
            return Err(Error::BadIndex);
        }

        let (offset, len) = self.element_payload(&field, index);
        Ok(self.arena.get(offset, len))
    }

    /// Overwrites element `index` of field `name`.
    ///
    /// On a fixed-size field the replacement must match the element width
    /// exactly; on a variable-size field the element is resized in place.
    pub fn replace_data(
        &mut self,
        name: &str,
        type_code: u32,
        index: u32,
        data: &[u8],
    ) -> Result<(), Error> {
        if data.is_empty() || data.len() > (u32::MAX - 4) as usize {
            return Err(Error::BadValue);
        }

        let field_index = self.directory.find(&self.arena, name, type_code)?;
        let field = *self.directory.get(field_index);
        if index >= field.count {
            return Err(Error::BadIndex);
        }

        if field.is_fixed_size() {
            let width = field.data_size / field.count;
            if data.len() as u32 != width {
                return Err(Error::BadValue);
            }
            let (offset, _) = self.element_payload(&field, index);
            self.arena.write(offset, data);
        } else {
            let (offset, old_raw) = self.element_region(&field, index);
            let new_raw = 4 + data.len() as u32;
            self.directory
                .resize_data(&mut self.arena, offset, new_raw as i64 - old_raw as i64)?;
            self.arena.write(offset, &(data.len() as u32).to_le_bytes());
            self.arena.write(offset + 4, data);

            let field = self.directory.get_mut(field_index);
            field.data_size = field.data_size + new_raw - old_raw;
        }
        Ok(())
    }

    /// Removes element `index` of field `name` (any type). Removing the last
    /// element removes the field itself, name included.
    pub fn remove_data(&mut self, name: &str, index: u32) -> Result<(), Error> {
        let field_index = self.directory.find(&self.arena, name, ANY_TYPE)?;
        let field = *self.directory.get(field_index);
        if index >= field.count {
            return Err(Error::BadIndex);
        }

        if field.count == 1 {
            self.directory.remove(&mut self.arena, field_index);
        } else {
            let (offset, raw) = self.element_region(&field, index);
            // Shrinking never allocates.
            let resized = self
                .directory
                .resize_data(&mut self.arena, offset, -(raw as i64));
            assert!(resized.is_ok());

            let field = self.directory.get_mut(field_index);
            field.count -= 1;
            field.data_size -= raw;
        }
        self.sync_specifier_state();
        Ok(())
    }

    /// Removes the whole field `name`, all elements and the name bytes.
    pub fn remove_name(&mut self, name: &str) -> Result<(), Error> {
        let field_index = self.directory.find(&self.arena, name, ANY_TYPE)?;
        self.directory.remove(&mut self.arena, field_index);
        self.sync_specifier_state();
        Ok(())
    }

    /// Gives the field `old_name` a new name; payload and type stay put.
    /// Fails with [`Error::BadValue`] if `new_name` is malformed or taken.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<(), Error> {
        let field_index = self.directory.find(&self.arena, old_name, ANY_TYPE)?;
        self.directory.rename(&mut self.arena, field_index, new_name)?;
        self.sync_specifier_state();
        Ok(())
    }

    /// Drops every field but keeps `what`. Status flags, the specifier
    /// cursor, and routing state reset to their pristine values.
    pub fn make_empty(&mut self) {
        self.directory.clear();
        self.arena.clear();
        self.flags = FLAG_VALID;
        self.current_specifier = -1;
        self.target = -1;
        self.reply_port = -1;
        self.reply_team = -1;
        self.reply_target = -1;
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of distinct field names.
    pub fn count_names(&self) -> u32 {
        self.directory.len() as u32
    }

    /// Number of fields holding `type_code` elements; [`ANY_TYPE`] counts
    /// every field.
    pub fn count_names_of(&self, type_code: u32) -> u32 {
        self.directory
            .iter()
            .filter(|field| type_code == ANY_TYPE || field.type_code == type_code)
            .count() as u32
    }

    /// True when the message holds no fields at all.
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Type code and element count of field `name`.
    pub fn get_info(&self, name: &str) -> Result<(u32, u32), Error> {
        let field = self
            .directory
            .get(self.directory.find(&self.arena, name, ANY_TYPE)?);
        Ok((field.type_code, field.count))
    }

    /// Name, type code, and element count of the field at directory position
    /// `index`, for iteration over all fields.
    pub fn get_info_at(&self, index: u32) -> Result<(&str, u32, u32), Error> {
        if index as usize >= self.directory.len() {
            return Err(Error::BadIndex);
        }
        let field = self.directory.get(index as usize);
        Ok((
            self.directory.name(&self.arena, index as usize),
            field.type_code,
            field.count,
        ))
    }

    /// Name, type code, and element count of the `index`-th field whose type
    /// matches `type_code` ([`ANY_TYPE`] matches all), in directory order.
    pub fn get_info_of(&self, type_code: u32, index: u32) -> Result<(&str, u32, u32), Error> {
        let mut remaining = index;
        for position in 0..self.directory.len() {
            let field = self.directory.get(position);
            if type_code != ANY_TYPE && field.type_code != type_code {
                continue;
            }
            if remaining == 0 {
                return Ok((
                    self.directory.name(&self.arena, position),
                    field.type_code,
                    field.count,
                ));
            }
            remaining -= 1;
        }
        Err(Error::BadIndex)
    }

    /// True when element `index` of `name` exists under `type_code`.
    pub fn has_data(&self, name: &str, type_code: u32, index: u32) -> bool {
        self.find_data(name, type_code, index).is_ok()
    }

    /// Structural equality of payload. With `ignore_field_order` the fields
    /// are matched by name instead of directory position; with `deep` the
    /// element bytes must match, otherwise name/type/count agreement is
    /// enough. The `what` codes must always agree.
    pub fn has_same_data(&self, other: &Message, ignore_field_order: bool, deep: bool) -> bool {
        if self.what != other.what || self.directory.len() != other.directory.len() {
            return false;
        }

        for index in 0..self.directory.len() {
            let field = *self.directory.get(index);
            let name = self.directory.name(&self.arena, index);

            let other_index = if ignore_field_order {
                match other.directory.find(&other.arena, name, field.type_code) {
                    Ok(found) => found,
                    Err(_) => return false,
                }
            } else {
                if other.directory.name(&other.arena, index) != name {
                    return false;
                }
                index
            };

            let other_field = *other.directory.get(other_index);
            if other_field.type_code != field.type_code || other_field.count != field.count {
                return false;
            }
            if deep {
                if other_field.data_size != field.data_size {
                    return false;
                }
                let mine = self.arena.get(field.data_offset(), field.data_size);
                let theirs = other.arena.get(other_field.data_offset(), other_field.data_size);
                if mine != theirs {
                    return false;
                }
            }
        }
        true
    }

    /// True for reserved system messages: a `what` code whose first
    /// character is `_` followed by three uppercase letters.
    pub fn is_system(&self) -> bool {
        let bytes = self.what.to_be_bytes();
        bytes[0] == b'_'
            && bytes[1].is_ascii_uppercase()
            && bytes[2].is_ascii_uppercase()
            && bytes[3].is_ascii_uppercase()
    }

    /// True once a transport has handed this message to a receiver.
    pub fn was_delivered(&self) -> bool {
        self.flags & FLAG_WAS_DELIVERED != 0
    }

    /// Marks the message as delivered. Called by transports on the receiving
    /// side; scripting accessors refuse to run before this.
    pub fn mark_delivered(&mut self) {
        self.flags |= FLAG_WAS_DELIVERED;
    }

    /// True when this message is itself a reply to another.
    pub fn is_reply(&self) -> bool {
        self.flags & FLAG_IS_REPLY != 0
    }

    /// True when the message was dropped on a receiver rather than posted.
    pub fn was_dropped(&self) -> bool {
        self.flags & FLAG_WAS_DROPPED != 0
    }

    /// True while the sender is blocked waiting for a reply that has not
    /// been sent yet.
    pub fn is_source_waiting(&self) -> bool {
        self.flags & FLAG_REPLY_REQUIRED != 0 && self.flags & FLAG_REPLY_DONE == 0
    }

    // =========================================================================
    // Typed accessors, fixed-size kinds
    // =========================================================================

    numeric_accessors!(i8, INT8_TYPE, add_int8, find_int8, find_int8_at, replace_int8, replace_int8_at, has_int8);
    numeric_accessors!(i16, INT16_TYPE, add_int16, find_int16, find_int16_at, replace_int16, replace_int16_at, has_int16);
    numeric_accessors!(i32, INT32_TYPE, add_int32, find_int32, find_int32_at, replace_int32, replace_int32_at, has_int32);
    numeric_accessors!(i64, INT64_TYPE, add_int64, find_int64, find_int64_at, replace_int64, replace_int64_at, has_int64);
    numeric_accessors!(f32, FLOAT_TYPE, add_float, find_float, find_float_at, replace_float, replace_float_at, has_float);
    numeric_accessors!(f64, DOUBLE_TYPE, add_double, find_double, find_double_at, replace_double, replace_double_at, has_double);
    numeric_accessors!(u64, POINTER_TYPE, add_pointer, find_pointer, find_pointer_at, replace_pointer, replace_pointer_at, has_pointer);

    struct_accessors!(Point, POINT_TYPE, add_point, find_point, find_point_at, replace_point, replace_point_at, has_point);
    struct_accessors!(Rect, RECT_TYPE, add_rect, find_rect, find_rect_at, replace_rect, replace_rect_at, has_rect);
    struct_accessors!(Messenger, MESSENGER_TYPE, add_messenger, find_messenger, find_messenger_at, replace_messenger, replace_messenger_at, has_messenger);

    numeric_accessors!(bool, BOOL_TYPE, add_bool, find_bool, find_bool_at, replace_bool, replace_bool_at, has_bool);

    // =========================================================================
    // Typed accessors, variable-size kinds
    // =========================================================================

    /// Stores a string with its NUL terminator, so the flattened form stays
    /// readable by C consumers.
    pub fn add_string(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.add_data(name, STRING_TYPE, &bytes, false)
    }

    pub fn find_string(&self, name: &str) -> Result<&str, Error> {
        self.find_string_at(name, 0)
    }

    pub fn find_string_at(&self, name: &str, index: u32) -> Result<&str, Error> {
        let bytes = self.find_data(name, STRING_TYPE, index)?;
        match bytes.split_last() {
            Some((0, body)) => core::str::from_utf8(body).map_err(|_| Error::BadValue),
            _ => Err(Error::BadValue),
        }
    }

    pub fn replace_string(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.replace_string_at(name, 0, value)
    }

    pub fn replace_string_at(&mut self, name: &str, index: u32, value: &str) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.replace_data(name, STRING_TYPE, index, &bytes)
    }

    pub fn has_string(&self, name: &str) -> bool {
        self.find_data(name, STRING_TYPE, 0).is_ok()
    }

    /// Stores a whole message as one element, by value.
    pub fn add_message(&mut self, name: &str, value: &Message) -> Result<(), Error> {
        let bytes = value.flatten_to_vec();
        self.add_data(name, MESSAGE_TYPE, &bytes, false)
    }

    pub fn find_message(&self, name: &str, index: u32) -> Result<Message, Error> {
        let bytes = self.find_data(name, MESSAGE_TYPE, index)?;
        let mut message = Message::new();
        message.unflatten(bytes)?;
        Ok(message)
    }

    pub fn replace_message(&mut self, name: &str, index: u32, value: &Message) -> Result<(), Error> {
        self.replace_data(name, MESSAGE_TYPE, index, &value.flatten_to_vec())
    }

    pub fn has_message(&self, name: &str) -> bool {
        self.find_data(name, MESSAGE_TYPE, 0).is_ok()
    }

    pub fn add_ref(&mut self, name: &str, value: &EntryRef) -> Result<(), Error> {
        self.add_data(name, REF_TYPE, &value.flatten_to_vec(), false)
    }

    pub fn find_ref(&self, name: &str, index: u32) -> Result<EntryRef, Error> {
        EntryRef::unflatten(self.find_data(name, REF_TYPE, index)?)
    }

    pub fn replace_ref(&mut self, name: &str, index: u32, value: &EntryRef) -> Result<(), Error> {
        self.replace_data(name, REF_TYPE, index, &value.flatten_to_vec())
    }

    pub fn has_ref(&self, name: &str) -> bool {
        self.find_data(name, REF_TYPE, 0).is_ok()
    }

    /// Stores any [`Flattenable`] under its own type code.
    pub fn add_flat<T: Flattenable>(&mut self, name: &str, value: &T) -> Result<(), Error> {
        let mut bytes = vec![0u8; value.flattened_size()];
        value.flatten(&mut bytes)?;
        self.add_data(name, value.type_code(), &bytes, value.is_fixed_size())
    }

    /// Rebuilds a [`Flattenable`] from element `index` of `name` in place.
    pub fn find_flat<T: Flattenable>(
        &self,
        name: &str,
        index: u32,
        value: &mut T,
    ) -> Result<(), Error> {
        let type_code = value.type_code();
        let bytes = self.find_data(name, type_code, index)?;
        value.unflatten(type_code, bytes)
    }

    /// Overwrites element `index` of `name` with `value`'s wire form.
    pub fn replace_flat<T: Flattenable>(
        &mut self,
        name: &str,
        index: u32,
        value: &T,
    ) -> Result<(), Error> {
        let mut bytes = vec![0u8; value.flattened_size()];
        value.flatten(&mut bytes)?;
        self.replace_data(name, value.type_code(), index, &bytes)
    }

    /// True when `name` holds at least one element of `value`'s type.
    pub fn has_flat<T: Flattenable>(&self, name: &str, value: &T) -> bool {
        self.find_data(name, value.type_code(), 0).is_ok()
    }

    // =========================================================================
    // Specifier stack (scripting targets)
    // =========================================================================

    /// Pushes a pre-built specifier message and makes it the current one.
    pub fn add_specifier(&mut self, specifier: &Message) -> Result<(), Error> {
        let bytes = specifier.flatten_to_vec();
        self.add_data(SPECIFIER_ENTRY, MESSAGE_TYPE, &bytes, false)?;
        self.current_specifier += 1;
        self.flags |= FLAG_HAS_SPECIFIERS;
        Ok(())
    }

    /// Pushes a direct specifier naming `property`.
    pub fn add_property_specifier(&mut self, property: &str) -> Result<(), Error> {
        let mut specifier = Message::with_what(DIRECT_SPECIFIER);
        specifier.add_string(PROPERTY_ENTRY, property)?;
        self.add_specifier(&specifier)
    }

    /// Pushes an index specifier: `property[index]`.
    pub fn add_index_specifier(&mut self, property: &str, index: i32) -> Result<(), Error> {
        let mut specifier = Message::with_what(INDEX_SPECIFIER);
        specifier.add_string(PROPERTY_ENTRY, property)?;
        specifier.add_int32("index", index)?;
        self.add_specifier(&specifier)
    }

    /// Pushes a range specifier: `property[index .. index + range)`. A
    /// negative range is rejected with [`Error::BadValue`].
    pub fn add_range_specifier(
        &mut self,
        property: &str,
        index: i32,
        range: i32,
    ) -> Result<(), Error> {
        if range < 0 {
            return Err(Error::BadValue);
        }
        let mut specifier = Message::with_what(RANGE_SPECIFIER);
        specifier.add_string(PROPERTY_ENTRY, property)?;
        specifier.add_int32("index", index)?;
        specifier.add_int32("range", range)?;
        self.add_specifier(&specifier)
    }

    /// Pushes a name specifier: the child of `property` called `name`.
    pub fn add_name_specifier(&mut self, property: &str, name: &str) -> Result<(), Error> {
        let mut specifier = Message::with_what(NAME_SPECIFIER);
        specifier.add_string(PROPERTY_ENTRY, property)?;
        specifier.add_string(PROPERTY_NAME_ENTRY, name)?;
        self.add_specifier(&specifier)
    }

    /// True when at least one specifier has been pushed.
    pub fn has_specifiers(&self) -> bool {
        self.flags & FLAG_HAS_SPECIFIERS != 0
    }

    /// Moves the specifier cursor. `-1` parks it below the stack; anything
    /// at or beyond the stack depth is [`Error::BadIndex`].
    pub fn set_current_specifier(&mut self, index: i32) -> Result<(), Error> {
        if index < -1 || index >= self.specifier_depth() {
            return Err(Error::BadIndex);
        }
        self.current_specifier = index;
        Ok(())
    }

    /// Returns the cursor position and a copy of the current specifier.
    ///
    /// Only meaningful on a delivered message with a non-empty stack;
    /// anything else is [`Error::BadValue`].
    pub fn get_current_specifier(&self) -> Result<(i32, Message), Error> {
        if !self.was_delivered() || self.current_specifier < 0 {
            return Err(Error::BadValue);
        }
        let specifier = self.find_message(SPECIFIER_ENTRY, self.current_specifier as u32)?;
        Ok((self.current_specifier, specifier))
    }

    /// Steps the cursor one specifier down, as a handler resolves one level
    /// of the scripting target. The stack itself is untouched, so the full
    /// path survives for reply routing.
    pub fn pop_specifier(&mut self) -> Result<(), Error> {
        if !self.was_delivered() || self.current_specifier < 0 {
            return Err(Error::BadValue);
        }
        self.current_specifier -= 1;
        Ok(())
    }

    /// Element count of the specifier stack field, 0 when absent or stored
    /// under a foreign type.
    fn specifier_depth(&self) -> i32 {
        match self.get_info(SPECIFIER_ENTRY) {
            Ok((type_code, count)) if type_code == MESSAGE_TYPE => count as i32,
            _ => 0,
        }
    }

    /// Re-derives the cursor and stack flag after a mutation that may have
    /// removed, renamed, or drained the specifier field. A cursor past the
    /// new depth clamps to the top; an empty stack parks the cursor and
    /// clears the flag, so the flattened form always passes its own decoder.
    fn sync_specifier_state(&mut self) {
        let depth = self.specifier_depth();
        if depth == 0 {
            self.current_specifier = -1;
            self.flags &= !FLAG_HAS_SPECIFIERS;
        } else if self.current_specifier >= depth {
            self.current_specifier = depth - 1;
        }
    }

    // =========================================================================
    // Element addressing
    // =========================================================================

    /// Arena offset and length of element `index`'s payload bytes,
    /// excluding any length prefix.
    pub(crate) fn element_payload(&self, field: &FieldHeader, index: u32) -> (u32, u32) {
        assert!(index < field.count);

        if field.is_fixed_size() {
            let width = field.data_size / field.count;
            (field.data_offset() + index * width, width)
        } else {
            let (offset, raw) = self.element_region(field, index);
            (offset + 4, raw - 4)
        }
    }

    /// Arena offset and length of element `index`'s full region, including
    /// the length prefix of variable-size elements. This is the range a
    /// resize or excise operates on.
    pub(crate) fn element_region(&self, field: &FieldHeader, index: u32) -> (u32, u32) {
        assert!(index < field.count);

        if field.is_fixed_size() {
            let width = field.data_size / field.count;
            return (field.data_offset() + index * width, width);
        }

        let mut offset = field.data_offset();
        for _ in 0..index {
            offset += 4 + self.arena.read_u32(offset);
        }
        (offset, 4 + self.arena.read_u32(offset))
    }
}

/// Deep copy. Delivery-scoped status flags do not survive: the copy has
/// never been delivered, dropped, or replied to.
impl Clone for Message {
    fn clone(&self) -> Self {
        Message {
            what: self.what,
            flags: self.flags & !FLAGS_DELIVERY,
            current_specifier: self.current_specifier,
            target: self.target,
            reply_port: self.reply_port,
            reply_team: self.reply_team,
            reply_target: self.reply_target,
            directory: self.directory.clone(),
            arena: self.arena.clone(),
        }
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "Message {{ what: {}, fields: {} }}",
            types::format_tag(self.what),
            self.directory.len()
        )?;
        for index in 0..self.directory.len() {
            let field = self.directory.get(index);
            writeln!(
                f,
                "  {:?}: type={} count={} size={}",
                self.directory.name(&self.arena, index),
                types::format_tag(field.type_code),
                field.count,
                field.data_size,
            )?;
        }
        Ok(())
    }
}
