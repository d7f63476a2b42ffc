//! Field records and the hash-indexed directory that locates them.
//!
//! Each field is a packed 22-byte record naming a contiguous `[name][data]`
//! region of the arena. Lookup goes through a fixed table of bucket heads;
//! each bucket is a singly linked chain threaded through the records by
//! index. New fields link at the tail of their bucket, so fields that hash
//! alike stay in insertion order.
//!
//! Because chains and bucket heads store indices into the record array,
//! removing a record renumbers every index above it. Because regions live in
//! one arena, resizing any region shifts the offset of every region behind
//! it. Both fixups live here and nowhere else.

use crate::arena::Arena;
use crate::constants::{
    FIELD_FLAG_FIXED_SIZE, FIELD_FLAG_VALID, FIELD_NAME_LENGTH_MAX, FIELD_RECORD_SIZE_USIZE,
    HASH_TABLE_SIZE, MAX_FIELD_PREALLOCATION,
};
use crate::error::Error;
use crate::types::ANY_TYPE;

/// One field record, exactly as it travels on the wire (22 bytes, packed,
/// little-endian scalars).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldHeader {
    /// Four-character value kind tag.
    pub type_code: u32,
    /// Number of stored elements.
    pub count: u32,
    /// Total payload bytes, excluding the name.
    pub data_size: u32,
    pub flags: u8,
    /// Name length in bytes including the NUL terminator.
    pub name_length: u8,
    /// Arena offset of the field's `[name][data]` region.
    pub offset: u32,
    /// Index of the next record in the same hash bucket, -1 for chain end.
    pub next: i32,
}

impl FieldHeader {
    pub fn encode(&self) -> [u8; FIELD_RECORD_SIZE_USIZE] {
        let mut bytes = [0u8; FIELD_RECORD_SIZE_USIZE];
        bytes[0..4].copy_from_slice(&self.type_code.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.count.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[12] = self.flags;
        bytes[13] = self.name_length;
        bytes[14..18].copy_from_slice(&self.offset.to_le_bytes());
        bytes[18..22].copy_from_slice(&self.next.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; FIELD_RECORD_SIZE_USIZE]) -> Self {
        FieldHeader {
            type_code: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            count: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            data_size: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            flags: bytes[12],
            name_length: bytes[13],
            offset: u32::from_le_bytes(bytes[14..18].try_into().unwrap()),
            next: i32::from_le_bytes(bytes[18..22].try_into().unwrap()),
        }
    }

    #[inline]
    pub fn is_fixed_size(&self) -> bool {
        self.flags & FIELD_FLAG_FIXED_SIZE != 0
    }

    /// Arena offset of the first payload byte.
    #[inline]
    pub fn data_offset(&self) -> u32 {
        self.offset + self.name_length as u32
    }

    /// Total arena bytes the field occupies (name plus payload).
    #[inline]
    pub fn total_size(&self) -> u32 {
        self.name_length as u32 + self.data_size
    }
}

/// The per-message field directory: the record array plus the bucket heads.
///
/// The directory never touches arena bytes on its own behalf except for
/// names; payload layout inside a field's data region is the accessor
/// layer's business.
#[derive(Clone, Debug, Default)]
pub struct FieldDirectory {
    fields: Vec<FieldHeader>,
    hash_table: [i32; HASH_TABLE_SIZE],
}

/// Name hash. Left-rotating shift/xor mix with a final avalanche step; the
/// exact recipe is part of the wire format because bucket heads are
/// flattened verbatim.
pub fn hash_name(name: &str) -> u32 {
    let mut result: u32 = 0;

    for ch in name.bytes() {
        result = (result << 7) ^ (result >> 24);
        result ^= ch as u32;
    }

    result ^= result << 12;
    result
}

impl FieldDirectory {
    pub fn new() -> Self {
        FieldDirectory { fields: Vec::new(), hash_table: [-1; HASH_TABLE_SIZE] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &FieldHeader {
        &self.fields[index]
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut FieldHeader {
        &mut self.fields[index]
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &FieldHeader> {
        self.fields.iter()
    }

    #[inline]
    pub fn hash_table(&self) -> &[i32; HASH_TABLE_SIZE] {
        &self.hash_table
    }

    /// Name of the field at `index`, without the NUL terminator.
    pub fn name<'a>(&self, arena: &'a Arena, index: usize) -> &'a str {
        let field = &self.fields[index];
        assert!(field.name_length >= 2);

        let bytes = arena.get(field.offset, field.name_length as u32 - 1);
        match core::str::from_utf8(bytes) {
            Ok(name) => name,
            // Names are UTF-8-checked on create and again on unflatten.
            Err(_) => unreachable!("field name must be valid UTF-8"),
        }
    }

    /// Looks up `name`, insisting on `type_code` unless it is [`ANY_TYPE`].
    ///
    /// Distinguishes "no such name" ([`Error::NameNotFound`]) from "name
    /// exists under a different type" ([`Error::BadType`]).
    pub fn find(&self, arena: &Arena, name: &str, type_code: u32) -> Result<usize, Error> {
        let bucket = hash_name(name) as usize % HASH_TABLE_SIZE;
        let mut next = self.hash_table[bucket];
        let mut name_seen = false;

        while next >= 0 {
            let index = next as usize;
            let field = &self.fields[index];

            if self.name(arena, index) == name {
                if type_code == ANY_TYPE || field.type_code == type_code {
                    return Ok(index);
                }
                name_seen = true;
            }

            next = field.next;
        }

        if name_seen {
            Err(Error::BadType)
        } else {
            Err(Error::NameNotFound)
        }
    }

    /// Creates an empty field for `name`, appending the NUL-terminated name
    /// to the arena and linking the record at the tail of its bucket.
    ///
    /// The new field has `count == 0` and no payload; the caller either
    /// appends data or rolls the creation back with [`remove`](Self::remove).
    /// On failure neither the directory nor the arena has changed.
    pub fn create(
        &mut self,
        arena: &mut Arena,
        name: &str,
        type_code: u32,
        fixed_size: bool,
    ) -> Result<usize, Error> {
        if name.is_empty() || name.len() > FIELD_NAME_LENGTH_MAX || name.as_bytes().contains(&0) {
            return Err(Error::BadValue);
        }
        assert!(self.find(arena, name, ANY_TYPE) == Err(Error::NameNotFound));

        // Reserve the record slot before touching the arena so failure in
        // either step leaves both untouched.
        self.reserve_one()?;

        let offset = arena.len();
        let name_length = name.len() as u8 + 1;
        arena.resize(offset, name_length as i32)?;
        arena.write(offset, name.as_bytes());
        arena.write(offset + name.len() as u32, &[0]);

        let mut flags = FIELD_FLAG_VALID;
        if fixed_size {
            flags |= FIELD_FLAG_FIXED_SIZE;
        }

        let index = self.fields.len();
        self.fields.push(FieldHeader {
            type_code,
            count: 0,
            data_size: 0,
            flags,
            name_length,
            offset,
            next: -1,
        });

        // Tail-of-bucket link keeps same-bucket fields in insertion order.
        let bucket = hash_name(name) as usize % HASH_TABLE_SIZE;
        let mut slot = self.hash_table[bucket];
        if slot < 0 {
            self.hash_table[bucket] = index as i32;
        } else {
            while self.fields[slot as usize].next >= 0 {
                slot = self.fields[slot as usize].next;
            }
            self.fields[slot as usize].next = index as i32;
        }

        Ok(index)
    }

    /// Removes the field at `index`: unlinks it from its bucket, excises its
    /// arena region, drops the record, and renumbers every index above it.
    pub fn remove(&mut self, arena: &mut Arena, index: usize) {
        assert!(index < self.fields.len());

        self.unlink(arena, index);

        let field = self.fields[index];
        let excised = field.total_size();
        let resize = self.resize_data(arena, field.offset, -(excised as i64));
        // Shrinking never allocates.
        assert!(resize.is_ok());

        self.fields.remove(index);

        // Every stored index above the removed slot just moved down by one.
        let removed = index as i32;
        for head in self.hash_table.iter_mut() {
            assert!(*head != removed);
            if *head > removed {
                *head -= 1;
            }
        }
        for field in self.fields.iter_mut() {
            assert!(field.next != removed);
            if field.next > removed {
                field.next -= 1;
            }
        }

        // Same slack discipline as the arena, scaled to record granularity.
        let spare = self.fields.capacity() - self.fields.len();
        if spare > MAX_FIELD_PREALLOCATION as usize {
            self.fields
                .shrink_to(self.fields.len() + MAX_FIELD_PREALLOCATION as usize / 2);
        }
    }

    /// Gives the field at `index` a new name. Fails with [`Error::BadValue`]
    /// if the new name is malformed or already taken.
    pub fn rename(&mut self, arena: &mut Arena, index: usize, new_name: &str) -> Result<(), Error> {
        assert!(index < self.fields.len());

        if new_name.is_empty()
            || new_name.len() > FIELD_NAME_LENGTH_MAX
            || new_name.as_bytes().contains(&0)
        {
            return Err(Error::BadValue);
        }
        match self.find(arena, new_name, ANY_TYPE) {
            Err(Error::NameNotFound) => {}
            _ => return Err(Error::BadValue),
        }

        let old_length = self.fields[index].name_length;
        let new_length = new_name.len() as u8 + 1;
        let offset = self.fields[index].offset;

        // Resize one byte past the region start so the field's own offset is
        // not shifted, only its tail.
        self.resize_data(arena, offset + 1, new_length as i64 - old_length as i64)?;
        arena.write(offset, new_name.as_bytes());
        arena.write(offset + new_name.len() as u32, &[0]);
        self.fields[index].name_length = new_length;

        // Move the record to the tail of the bucket the new name hashes to.
        self.unlink_renamed(index, new_name);

        Ok(())
    }

    /// Grows or shrinks the arena at `offset` and shifts the offset of every
    /// field region at or behind that point. The caller owns overwriting the
    /// opened gap.
    ///
    /// Nothing changes on failure: the fixup runs only after the arena
    /// resize has succeeded. A change too large for the arena's address
    /// space fails with [`Error::NoMemory`].
    pub fn resize_data(&mut self, arena: &mut Arena, offset: u32, change: i64) -> Result<(), Error> {
        let change = i32::try_from(change).map_err(|_| Error::NoMemory)?;
        if change == 0 {
            return Ok(());
        }

        arena.resize(offset, change)?;

        for field in self.fields.iter_mut() {
            if field.offset >= offset {
                // A record whose own region is being excised goes transiently
                // out of range here; its caller removes it next.
                field.offset = (field.offset as i64 + change as i64) as u32;
            }
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.fields = Vec::new();
        self.hash_table = [-1; HASH_TABLE_SIZE];
    }

    /// Rebuilds the directory from decoded wire records. The caller must run
    /// [`validate`](Self::validate) before trusting any of it.
    pub fn from_wire(
        fields: Vec<FieldHeader>,
        hash_table: [i32; HASH_TABLE_SIZE],
    ) -> Self {
        FieldDirectory { fields, hash_table }
    }

    // =========================================================================
    // Validation of untrusted (unflattened) directories
    // =========================================================================

    /// Full structural check over records, chains, and arena layout. Run on
    /// every unflattened buffer before any accessor may touch it.
    pub fn validate(&self, arena: &Arena) -> Result<(), &'static str> {
        let count = self.fields.len();
        let arena_len = arena.len() as u64;

        for field in &self.fields {
            if field.flags & FIELD_FLAG_VALID == 0 {
                return Err("field record not marked valid");
            }
            if field.flags & !(FIELD_FLAG_VALID | FIELD_FLAG_FIXED_SIZE) != 0 {
                return Err("field record carries unknown flags");
            }
            if field.name_length < 2 {
                return Err("field name empty");
            }
            if field.count == 0 {
                return Err("field record holds no elements");
            }
            if field.next < -1 || field.next >= count as i32 {
                return Err("field chain link out of range");
            }

            let region_end =
                field.offset as u64 + field.name_length as u64 + field.data_size as u64;
            if region_end > arena_len {
                return Err("field region exceeds arena");
            }

            let name_bytes = arena.get(field.offset, field.name_length as u32 - 1);
            if arena.get(field.offset + field.name_length as u32 - 1, 1) != [0] {
                return Err("field name not NUL-terminated");
            }
            let name = match core::str::from_utf8(name_bytes) {
                Ok(name) => name,
                Err(_) => return Err("field name not UTF-8"),
            };
            if name.as_bytes().contains(&0) {
                return Err("field name contains NUL");
            }
            if name.len() > FIELD_NAME_LENGTH_MAX {
                return Err("field name too long");
            }

            if field.is_fixed_size() {
                if field.data_size % field.count != 0 {
                    return Err("fixed-size field data not divisible by count");
                }
            } else {
                self.validate_variable_payload(arena, field)?;
            }
        }

        self.validate_chains(arena)?;
        self.validate_coverage(arena_len)?;

        // Names must be pairwise distinct; lookups return the first match.
        for i in 0..count {
            for j in i + 1..count {
                if self.name(arena, i) == self.name(arena, j) {
                    return Err("duplicate field name");
                }
            }
        }

        Ok(())
    }

    /// Walks a variable-size payload: `count` elements, each a 4-byte
    /// little-endian length prefix followed by that many bytes, consuming
    /// exactly `data_size`.
    fn validate_variable_payload(
        &self,
        arena: &Arena,
        field: &FieldHeader,
    ) -> Result<(), &'static str> {
        let mut pos = field.data_offset() as u64;
        let end = pos + field.data_size as u64;
        assert!(end <= arena.len() as u64);

        for _ in 0..field.count {
            if pos + 4 > end {
                return Err("variable-size element prefix truncated");
            }
            let element = arena.read_u32(pos as u32) as u64;
            pos += 4;
            if element > end - pos {
                return Err("variable-size element exceeds field data");
            }
            pos += element;
        }

        if pos != end {
            return Err("variable-size field data has trailing bytes");
        }
        Ok(())
    }

    /// Every record must be reachable from exactly one bucket head, through
    /// the bucket its name actually hashes to, with no cycles.
    fn validate_chains(&self, arena: &Arena) -> Result<(), &'static str> {
        let count = self.fields.len();
        let mut seen = vec![false; count];

        for (bucket, head) in self.hash_table.iter().enumerate() {
            if *head < -1 || *head >= count as i32 {
                return Err("bucket head out of range");
            }

            let mut next = *head;
            let mut steps = 0usize;
            while next >= 0 {
                let index = next as usize;
                if seen[index] {
                    return Err("field referenced twice in bucket chains");
                }
                seen[index] = true;

                if hash_name(self.name(arena, index)) as usize % HASH_TABLE_SIZE != bucket {
                    return Err("field linked into wrong bucket");
                }

                steps += 1;
                if steps > count {
                    return Err("bucket chain cycles");
                }
                next = self.fields[index].next;
            }
        }

        if seen.iter().any(|reached| !reached) {
            return Err("field unreachable from any bucket");
        }
        Ok(())
    }

    /// Field regions must tile the arena exactly: no overlap, no gaps, no
    /// tail bytes owned by nobody.
    fn validate_coverage(&self, arena_len: u64) -> Result<(), &'static str> {
        let mut regions: Vec<(u64, u64)> = self
            .fields
            .iter()
            .map(|field| (field.offset as u64, field.total_size() as u64))
            .collect();
        regions.sort_unstable();

        let mut pos = 0u64;
        for (offset, size) in regions {
            if offset != pos {
                return Err("field regions overlap or leave a gap");
            }
            pos += size;
        }
        if pos != arena_len {
            return Err("arena bytes not covered by any field");
        }
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Grows the record array by one slot with bounded preallocation.
    fn reserve_one(&mut self) -> Result<(), Error> {
        if self.fields.len() < self.fields.capacity() {
            return Ok(());
        }

        let len = self.fields.len();
        let target = (len * 2 + 1)
            .min(len + MAX_FIELD_PREALLOCATION as usize)
            .max(len + 1);
        self.fields.try_reserve_exact(target - len)?;

        assert!(self.fields.capacity() > self.fields.len());
        Ok(())
    }

    /// Unlinks `index` from the bucket its current name hashes to.
    fn unlink(&mut self, arena: &Arena, index: usize) {
        let bucket = hash_name(self.name(arena, index)) as usize % HASH_TABLE_SIZE;
        let target = index as i32;

        if self.hash_table[bucket] == target {
            self.hash_table[bucket] = self.fields[index].next;
        } else {
            let mut prev = self.hash_table[bucket];
            assert!(prev >= 0);
            while self.fields[prev as usize].next != target {
                prev = self.fields[prev as usize].next;
                assert!(prev >= 0);
            }
            self.fields[prev as usize].next = self.fields[index].next;
        }

        self.fields[index].next = -1;
    }

    /// After a rename the record may belong to a different bucket. The arena
    /// already holds the new name, so the record is unlinked by index scan
    /// rather than by hashing the (gone) old name, then tail-linked into the
    /// new name's bucket.
    fn unlink_renamed(&mut self, index: usize, new_name: &str) {
        let target = index as i32;

        // The record may sit in any chain at this point; find and unlink it
        // by index rather than by name.
        'unlink: for head in 0..HASH_TABLE_SIZE {
            if self.hash_table[head] == target {
                self.hash_table[head] = self.fields[index].next;
                break 'unlink;
            }
            let mut prev = self.hash_table[head];
            while prev >= 0 {
                if self.fields[prev as usize].next == target {
                    self.fields[prev as usize].next = self.fields[index].next;
                    break 'unlink;
                }
                prev = self.fields[prev as usize].next;
            }
        }
        self.fields[index].next = -1;

        let bucket = hash_name(new_name) as usize % HASH_TABLE_SIZE;
        let mut slot = self.hash_table[bucket];
        if slot < 0 {
            self.hash_table[bucket] = target;
        } else {
            while self.fields[slot as usize].next >= 0 {
                slot = self.fields[slot as usize].next;
            }
            self.fields[slot as usize].next = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{INT32_TYPE, STRING_TYPE};

    fn add_fixed(
        directory: &mut FieldDirectory,
        arena: &mut Arena,
        name: &str,
        values: &[i32],
    ) -> usize {
        let index = directory.create(arena, name, INT32_TYPE, true).unwrap();
        for value in values {
            let field = *directory.get(index);
            let end = field.offset + field.total_size();
            directory.resize_data(arena, end, 4).unwrap();
            arena.write(end, &value.to_le_bytes());
            let field = directory.get_mut(index);
            field.count += 1;
            field.data_size += 4;
        }
        index
    }

    #[test]
    fn record_roundtrip_is_exact() {
        let field = FieldHeader {
            type_code: INT32_TYPE,
            count: 3,
            data_size: 12,
            flags: FIELD_FLAG_VALID | FIELD_FLAG_FIXED_SIZE,
            name_length: 6,
            offset: 42,
            next: -1,
        };

        assert_eq!(FieldHeader::decode(&field.encode()), field);
    }

    #[test]
    fn hash_is_stable() {
        // Pinned values: the hash feeds bucket heads that go on the wire.
        assert_eq!(hash_name("a") ^ hash_name("a"), 0);
        assert_ne!(hash_name("a"), hash_name("b"));
        assert_ne!(hash_name("ab"), hash_name("ba"));
        assert_eq!(hash_name(""), 0);
    }

    #[test]
    fn create_then_find() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();

        let index = directory.create(&mut arena, "answer", INT32_TYPE, true).unwrap();

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.name(&arena, index), "answer");
        assert_eq!(directory.find(&arena, "answer", INT32_TYPE).unwrap(), index);
        assert_eq!(directory.find(&arena, "answer", ANY_TYPE).unwrap(), index);
        assert_eq!(arena.len(), "answer".len() as u32 + 1);
    }

    #[test]
    fn find_distinguishes_bad_type_from_missing_name() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        directory.create(&mut arena, "answer", INT32_TYPE, true).unwrap();

        assert_eq!(
            directory.find(&arena, "answer", STRING_TYPE),
            Err(Error::BadType)
        );
        assert_eq!(
            directory.find(&arena, "missing", STRING_TYPE),
            Err(Error::NameNotFound)
        );
    }

    #[test]
    fn create_rejects_malformed_names() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();

        assert_eq!(
            directory.create(&mut arena, "", INT32_TYPE, true),
            Err(Error::BadValue)
        );
        assert_eq!(
            directory.create(&mut arena, "nul\0name", INT32_TYPE, true),
            Err(Error::BadValue)
        );
        let long = "x".repeat(FIELD_NAME_LENGTH_MAX + 1);
        assert_eq!(
            directory.create(&mut arena, &long, INT32_TYPE, true),
            Err(Error::BadValue)
        );

        // Failed creates leave both structures untouched.
        assert!(directory.is_empty());
        assert!(arena.is_empty());

        let edge = "x".repeat(FIELD_NAME_LENGTH_MAX);
        assert!(directory.create(&mut arena, &edge, INT32_TYPE, true).is_ok());
    }

    #[test]
    fn colliding_names_chain_in_insertion_order() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();

        // More names than buckets forces at least one chain of length two.
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        for name in names {
            directory.create(&mut arena, name, INT32_TYPE, true).unwrap();
        }

        for (index, name) in names.iter().enumerate() {
            assert_eq!(directory.find(&arena, name, INT32_TYPE).unwrap(), index);
        }

        // Within one bucket, chain order is insertion order.
        for bucket in directory.hash_table() {
            let mut next = *bucket;
            let mut previous = -1;
            while next >= 0 {
                assert!(next > previous);
                previous = next;
                next = directory.get(next as usize).next;
            }
        }
    }

    #[test]
    fn remove_excises_region_and_renumbers() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();

        add_fixed(&mut directory, &mut arena, "first", &[1, 2]);
        let middle = add_fixed(&mut directory, &mut arena, "second", &[3]);
        add_fixed(&mut directory, &mut arena, "third", &[4, 5, 6]);
        let before = arena.len();
        let removed_size = directory.get(middle).total_size();

        directory.remove(&mut arena, middle);

        assert_eq!(directory.len(), 2);
        assert_eq!(arena.len(), before - removed_size);
        assert_eq!(
            directory.find(&arena, "second", INT32_TYPE),
            Err(Error::NameNotFound)
        );

        // Survivors still resolve and their payloads still read back.
        let first = directory.find(&arena, "first", INT32_TYPE).unwrap();
        let third = directory.find(&arena, "third", INT32_TYPE).unwrap();
        let first_field = directory.get(first);
        let third_field = directory.get(third);
        assert_eq!(arena.read_u32(first_field.data_offset()), 1);
        assert_eq!(arena.read_u32(third_field.data_offset()), 4);

        assert!(directory.validate(&arena).is_ok());
    }

    #[test]
    fn remove_last_field_empties_everything() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let index = add_fixed(&mut directory, &mut arena, "only", &[9]);

        directory.remove(&mut arena, index);

        assert!(directory.is_empty());
        assert!(arena.is_empty());
        assert_eq!(directory.hash_table(), &[-1; HASH_TABLE_SIZE]);
    }

    #[test]
    fn rename_rebuckets_and_preserves_payload() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        add_fixed(&mut directory, &mut arena, "neighbor", &[7]);
        let index = add_fixed(&mut directory, &mut arena, "old", &[42]);

        directory.rename(&mut arena, index, "a-much-longer-name").unwrap();

        assert_eq!(
            directory.find(&arena, "old", INT32_TYPE),
            Err(Error::NameNotFound)
        );
        let found = directory.find(&arena, "a-much-longer-name", INT32_TYPE).unwrap();
        assert_eq!(found, index);
        let field = directory.get(found);
        assert_eq!(arena.read_u32(field.data_offset()), 42);
        assert!(directory.validate(&arena).is_ok());
    }

    #[test]
    fn rename_to_existing_name_is_rejected() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        add_fixed(&mut directory, &mut arena, "keep", &[1]);
        let index = add_fixed(&mut directory, &mut arena, "old", &[2]);

        assert_eq!(
            directory.rename(&mut arena, index, "keep"),
            Err(Error::BadValue)
        );
        assert!(directory.find(&arena, "old", INT32_TYPE).is_ok());
    }

    #[test]
    fn resize_data_shifts_following_regions_only() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let first = add_fixed(&mut directory, &mut arena, "first", &[1]);
        let second = add_fixed(&mut directory, &mut arena, "second", &[2]);

        let first_end = {
            let field = directory.get(first);
            field.offset + field.total_size()
        };
        let second_offset_before = directory.get(second).offset;

        directory.resize_data(&mut arena, first_end, 4).unwrap();
        arena.write(first_end, &3i32.to_le_bytes());
        {
            let field = directory.get_mut(first);
            field.count += 1;
            field.data_size += 4;
        }

        assert_eq!(directory.get(first).offset, 0);
        assert_eq!(directory.get(second).offset, second_offset_before + 4);
        assert_eq!(
            arena.read_u32(directory.get(second).data_offset()),
            2
        );
        assert!(directory.validate(&arena).is_ok());
    }

    #[test]
    fn resize_data_rejects_growth_past_address_space() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        add_fixed(&mut directory, &mut arena, "x", &[1]);
        let before = arena.len();

        let result = directory.resize_data(&mut arena, before, i32::MAX as i64 + 1);

        assert_eq!(result, Err(Error::NoMemory));
        assert_eq!(arena.len(), before);
        assert!(directory.validate(&arena).is_ok());
    }

    // =========================================================================
    // Validator rejection cases
    // =========================================================================

    #[test]
    fn validate_accepts_built_directory() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        add_fixed(&mut directory, &mut arena, "a", &[1]);
        add_fixed(&mut directory, &mut arena, "b", &[2, 3]);

        assert!(directory.validate(&arena).is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_offset() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let index = add_fixed(&mut directory, &mut arena, "a", &[1]);

        directory.get_mut(index).offset = 1000;

        assert!(directory.validate(&arena).is_err());
    }

    #[test]
    fn validate_rejects_cyclic_chain() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let index = add_fixed(&mut directory, &mut arena, "a", &[1]);

        directory.get_mut(index).next = index as i32;

        assert!(directory.validate(&arena).is_err());
    }

    #[test]
    fn validate_rejects_unreachable_field() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let index = add_fixed(&mut directory, &mut arena, "a", &[1]);

        let hash_table = {
            let mut table = *directory.hash_table();
            let bucket = hash_name("a") as usize % HASH_TABLE_SIZE;
            table[bucket] = -1;
            table
        };
        let fields = vec![*directory.get(index)];
        let broken = FieldDirectory::from_wire(fields, hash_table);

        assert!(broken.validate(&arena).is_err());
    }

    #[test]
    fn validate_rejects_non_divisible_fixed_field() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let index = add_fixed(&mut directory, &mut arena, "a", &[1, 2]);

        directory.get_mut(index).count = 3;

        assert!(directory.validate(&arena).is_err());
    }

    #[test]
    fn validate_rejects_broken_variable_payload() {
        let mut arena = Arena::new();
        let mut directory = FieldDirectory::new();
        let index = directory.create(&mut arena, "s", STRING_TYPE, false).unwrap();

        // One element: 4-byte length prefix + payload.
        let payload = b"hi\0";
        let field = *directory.get(index);
        let end = field.offset + field.total_size();
        directory.resize_data(&mut arena, end, 4 + payload.len() as i64).unwrap();
        arena.write(end, &(payload.len() as u32).to_le_bytes());
        arena.write(end + 4, payload);
        {
            let field = directory.get_mut(index);
            field.count = 1;
            field.data_size = 4 + payload.len() as u32;
        }
        assert!(directory.validate(&arena).is_ok());

        // A length prefix pointing past the field's data is corruption.
        arena.write(directory.get(index).data_offset(), &100u32.to_le_bytes());
        assert!(directory.validate(&arena).is_err());
    }

    // =========================================================================
    // Property-Based Tests
    // =========================================================================

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Directory invariants survive arbitrary interleavings of create,
        /// append, and remove.
        fn check_model(ops: Vec<(u8, u8)>) -> Result<(), TestCaseError> {
            let mut arena = Arena::new();
            let mut directory = FieldDirectory::new();
            let mut live: Vec<String> = Vec::new();

            for (op, which) in ops {
                match op % 4 {
                    0 => {
                        let name = format!("field-{which}");
                        if !live.contains(&name) {
                            add_fixed(&mut directory, &mut arena, &name, &[which as i32]);
                            live.push(name);
                        }
                    }
                    1 => {
                        if !live.is_empty() {
                            let victim = live.remove(which as usize % live.len());
                            let index =
                                directory.find(&arena, &victim, INT32_TYPE).unwrap();
                            directory.remove(&mut arena, index);
                        }
                    }
                    2 => {
                        let renamed = format!("renamed-{which}");
                        if !live.is_empty() && !live.contains(&renamed) {
                            let slot = which as usize % live.len();
                            let index =
                                directory.find(&arena, &live[slot], INT32_TYPE).unwrap();
                            directory.rename(&mut arena, index, &renamed).unwrap();
                            live[slot] = renamed;
                        }
                    }
                    _ => {
                        if !live.is_empty() {
                            let name = &live[which as usize % live.len()];
                            let index = directory.find(&arena, name, INT32_TYPE).unwrap();
                            let field = *directory.get(index);
                            let end = field.offset + field.total_size();
                            directory.resize_data(&mut arena, end, 4).unwrap();
                            arena.write(end, &(which as i32).to_le_bytes());
                            let field = directory.get_mut(index);
                            field.count += 1;
                            field.data_size += 4;
                        }
                    }
                }

                prop_assert_eq!(directory.len(), live.len());
                for name in &live {
                    prop_assert!(directory.find(&arena, name, INT32_TYPE).is_ok());
                }
                if let Err(reason) = directory.validate(&arena) {
                    return Err(TestCaseError::fail(reason));
                }
            }
            Ok(())
        }

        proptest! {
            #[test]
            fn prop_invariants_hold_under_mutation(
                ops in prop::collection::vec((any::<u8>(), any::<u8>()), 1..128)
            ) {
                check_model(ops)?;
            }
        }
    }
}
