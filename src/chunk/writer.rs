//! Write-mode operations of the state chunk.
//!
//! Write operations cannot fail: under-allocation is handled by silent
//! buffer growth, so the only way to misuse this side is calling it in the
//! wrong mode, which panics.

use super::types::{ChunkMode, ChunkStruct, ChunkVersion};
use super::StateChunk;
use crate::common::types::Guid;
use crate::object::{ObjectId, SceneObject};

/// Scoped mutable view into the chunk's live buffer for bulk writes without
/// an intermediate copy. Dropping the guard advances the cursor by the
/// consumed size (defaults to the locked size).
pub struct LockedWriteBuffer<'g, 'v> {
    chunk: &'g mut StateChunk<'v>,
    locked_bytes: usize,
    consumed_bytes: usize,
}

impl<'g, 'v> LockedWriteBuffer<'g, 'v> {
    pub fn data_mut(&mut self) -> &mut [u8] {
        let start = (self.chunk.parser.cursor * 4) as usize;
        &mut self.chunk.data[start..start + self.locked_bytes]
    }

    pub fn set_consumed_size(&mut self, bytes: usize) {
        self.consumed_bytes = bytes;
    }
}

impl Drop for LockedWriteBuffer<'_, '_> {
    fn drop(&mut self) {
        self.chunk.parser.cursor += StateChunk::ceil_dwords(self.consumed_bytes);
    }
}

impl<'v> StateChunk<'v> {
    /// Enter write mode, dropping any previous buffer content. The chunk
    /// must be idle.
    pub fn start_write(&mut self) {
        assert!(
            self.parser.mode == ChunkMode::Idle,
            "start_write on a state chunk that is not idle"
        );
        self.data.clear();
        self.data_dwords = 0;
        self.object_list.clear();
        self.chunk_list.clear();
        self.manager_list.clear();

        self.parser.cursor = 0;
        self.parser.window = 0;
        self.parser.prev_identifier = None;

        // written chunks always carry the current container version
        self.chunk_version = ChunkVersion::CURRENT;
        self.parser.mode = ChunkMode::Write;
    }

    /// Leave write mode: the cursor becomes the declared data size and the
    /// allocation is trimmed to it.
    pub fn stop_write(&mut self) {
        assert!(
            self.parser.mode == ChunkMode::Write,
            "stop_write on a state chunk that is not writing"
        );
        self.data_dwords = self.parser.cursor;
        self.data.truncate((self.data_dwords * 4) as usize);
        self.data.shrink_to_fit();

        self.parser.cursor = 0;
        self.parser.window = self.data_dwords;
        self.parser.prev_identifier = None;
        self.parser.mode = ChunkMode::Idle;
    }

    /// Open a new identifier-tagged region. The previous region's delta
    /// field is patched to end here; the new region's delta stays 0 (the
    /// "last region" sentinel) until the next call patches it in turn.
    pub fn write_identifier(&mut self, identifier: impl Into<u32>) {
        self.ensure_write_space(2);
        if let Some(prev) = self.parser.prev_identifier {
            let delta = self.parser.cursor - prev;
            self.put_dword(prev + 1, delta);
        }
        self.parser.prev_identifier = Some(self.parser.cursor);
        let at = self.parser.cursor;
        self.put_dword(at, identifier.into());
        self.put_dword(at + 1, 0);
        self.parser.cursor += 2;
    }

    /// Reserve `byte_size` writable bytes at the cursor and hand out a
    /// guard over them. The reserved space is zero-filled.
    pub fn lock_write_buffer(&mut self, byte_size: usize) -> LockedWriteBuffer<'_, 'v> {
        self.ensure_write_space(Self::ceil_dwords(byte_size));
        LockedWriteBuffer {
            chunk: self,
            locked_bytes: byte_size,
            consumed_bytes: byte_size,
        }
    }

    pub(crate) fn write_byte_data(&mut self, bytes: &[u8]) {
        let mut guard = self.lock_write_buffer(bytes.len());
        guard.data_mut().copy_from_slice(bytes);
    }

    /// Write one typed value, padded up to a whole DWORD.
    pub fn write_struct<T: ChunkStruct>(&mut self, value: &T) {
        let mut raw = [0u8; 64];
        debug_assert!(T::BYTE_SIZE <= raw.len());
        value.to_bytes(&mut raw[..T::BYTE_SIZE]);
        let mut guard = self.lock_write_buffer(T::BYTE_SIZE);
        guard.data_mut().copy_from_slice(&raw[..T::BYTE_SIZE]);
    }

    /// Write a length-prefixed string, NUL terminated inside the count.
    /// `None` writes the bare 0 marker, distinguishable from `Some("")`.
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            None => self.write_struct(&0u32),
            Some(s) => {
                let byte_count = s.len() as u32 + 1;
                self.write_struct(&byte_count);
                let mut guard = self.lock_write_buffer(byte_count as usize);
                let data = guard.data_mut();
                data[..s.len()].copy_from_slice(s.as_bytes());
                data[s.len()] = 0;
            }
        }
    }

    /// Write a count-prefixed buffer. An empty buffer writes the single
    /// count 0, the "no buffer" marker.
    pub fn write_buffer(&mut self, buf: &[u8]) {
        self.write_struct(&(buf.len() as u32));
        if !buf.is_empty() {
            self.write_byte_data(buf);
        }
    }

    /// Write raw bytes with no length prefix; the reader must know the size
    /// from context (e.g. a fixed-size extension string).
    pub fn write_buffer_no_size(&mut self, buf: &[u8]) {
        if !buf.is_empty() {
            self.write_byte_data(buf);
        }
    }

    /// Write an object reference and record its offset in the chunk's
    /// object-reference list. Bound to a file, the reference is the object's
    /// file table index; unbound it is the raw 64-bit id.
    pub fn write_object_id(&mut self, id: ObjectId) {
        self.object_list.push(self.parser.cursor);
        let raw: i64 = match self.bind_file() {
            Some(visitor) => visitor
                .index_of_object(id)
                .map(|index| index as i64)
                .unwrap_or(-1),
            None => id.0 as i64,
        };
        self.write_struct(&raw);
    }

    /// Resolve a live object to its id, then write the reference.
    pub fn write_object_pointer(&mut self, obj: Option<&dyn SceneObject>) {
        self.write_object_id(obj.map(|o| o.core().id).unwrap_or(ObjectId::NULL));
    }

    /// Write a count-prefixed object id sequence, each entry tracked in the
    /// object-reference list.
    pub fn write_object_sequence(&mut self, ids: &[ObjectId]) {
        self.write_struct(&(ids.len() as u32));
        for &id in ids {
            self.write_object_id(id);
        }
    }

    /// Write an object id array. Same wire shape as a sequence in the
    /// current container version.
    pub fn write_object_array(&mut self, ids: &[ObjectId]) {
        self.write_object_sequence(ids);
    }

    /// Write one manager value and record its offset in the manager list.
    pub fn write_manager_int(&mut self, guid: Guid, value: i32) {
        self.manager_list.push(self.parser.cursor);
        self.write_struct(&guid);
        self.write_struct(&value);
    }

    /// Write a manager value sequence: count, GUID, then the integers.
    pub fn write_manager_int_sequence(&mut self, guid: Guid, values: &[i32]) {
        self.manager_list.push(self.parser.cursor);
        self.write_struct(&(values.len() as u32));
        self.write_struct(&guid);
        for value in values {
            self.write_struct(value);
        }
    }

    /// Embed another chunk at the cursor and record its offset in the
    /// embedded-chunk list. The embedded chunk must be idle (its declared
    /// data is what gets copied).
    pub fn write_sub_chunk(&mut self, sub: &StateChunk<'_>) {
        self.chunk_list.push(self.parser.cursor);

        let data_dwords = sub.data_dwords;
        let embedded_dwords = 7
            + data_dwords
            + sub.object_list.len() as u32
            + sub.chunk_list.len() as u32
            + sub.manager_list.len() as u32;

        self.write_struct(&embedded_dwords);
        self.write_struct(&(u8::from(sub.class_id) as u32));
        let version_info =
            (u8::from(sub.data_version) as u32) | ((u8::from(sub.chunk_version) as u32) << 16);
        self.write_struct(&version_info);
        self.write_struct(&data_dwords);
        self.write_struct(&(sub.bind_file.is_some() as u32));
        self.write_struct(&(sub.object_list.len() as u32));
        self.write_struct(&(sub.chunk_list.len() as u32));
        self.write_struct(&(sub.manager_list.len() as u32));

        if data_dwords != 0 {
            self.write_byte_data(&sub.data[..(data_dwords * 4) as usize]);
        }
        for list in [&sub.object_list, &sub.chunk_list, &sub.manager_list] {
            for &entry in list {
                self.write_struct(&entry);
            }
        }
    }

    /// Write a count-prefixed sequence of embedded chunks.
    pub fn write_sub_chunk_sequence(&mut self, subs: &[StateChunk<'_>]) {
        self.write_struct(&(subs.len() as u32));
        for sub in subs {
            self.write_sub_chunk(sub);
        }
    }
}
