//! Read-mode operations of the state chunk.

use log::warn;

use super::types::{ChunkMode, ChunkStruct, ChunkVersion, DataVersion};
use super::StateChunk;
use crate::common::types::Guid;
use crate::object::ObjectId;
use crate::ChunkError;

/// Scoped view into the chunk's live buffer for bulk reads without an
/// intermediate copy.
///
/// Dropping the guard advances the cursor by the consumed size, which
/// defaults to the locked size but can be lowered for "I requested more than
/// I used" probing patterns.
pub struct LockedReadBuffer<'g, 'v> {
    chunk: &'g mut StateChunk<'v>,
    locked_bytes: usize,
    consumed_bytes: usize,
}

impl<'g, 'v> LockedReadBuffer<'g, 'v> {
    pub fn data(&self) -> &[u8] {
        let start = (self.chunk.parser.cursor * 4) as usize;
        &self.chunk.data[start..start + self.locked_bytes]
    }

    /// Lower (or restate) how far the cursor moves when the guard drops.
    pub fn set_consumed_size(&mut self, bytes: usize) {
        self.consumed_bytes = bytes;
    }
}

impl Drop for LockedReadBuffer<'_, '_> {
    fn drop(&mut self) {
        let dwords = StateChunk::ceil_dwords(self.consumed_bytes);
        if self.chunk.ensure_read_space(dwords) {
            self.chunk.parser.cursor += dwords;
        } else {
            warn!(
                "unlock of read buffer at dword {} overruns the data region",
                self.chunk.parser.cursor
            );
        }
    }
}

impl<'v> StateChunk<'v> {
    /// Enter read mode. The chunk must be idle.
    pub fn start_read(&mut self) {
        assert!(
            self.parser.mode == ChunkMode::Idle,
            "start_read on a state chunk that is not idle"
        );
        self.parser.cursor = 0;
        self.parser.window = self.data_dwords;
        self.parser.prev_identifier = None;
        self.parser.mode = ChunkMode::Read;
    }

    pub fn stop_read(&mut self) {
        assert!(
            self.parser.mode == ChunkMode::Read,
            "stop_read on a state chunk that is not reading"
        );
        self.parser.cursor = 0;
        self.parser.window = self.data_dwords;
        self.parser.prev_identifier = None;
        self.parser.mode = ChunkMode::Idle;
    }

    /// Position the cursor just past the header of the region tagged
    /// `identifier`. The probe is order-independent: the table is scanned
    /// from the start on every call. On a miss the cursor is unchanged.
    pub fn seek_identifier(&mut self, identifier: impl Into<u32>) -> bool {
        self.seek_identifier_and_size(identifier).is_some()
    }

    /// Like [`Self::seek_identifier`], additionally returning the region's
    /// payload size in bytes.
    pub fn seek_identifier_and_size(&mut self, identifier: impl Into<u32>) -> Option<u32> {
        assert!(
            self.parser.mode == ChunkMode::Read,
            "seek_identifier on a state chunk that is not reading"
        );
        let identifier = identifier.into();

        let mut found = None;
        self.walk_identifiers(|tag, pos, payload_dwords| {
            if tag == identifier {
                found = Some((pos, payload_dwords));
                false
            } else {
                true
            }
        });

        let (pos, payload_dwords) = found?;
        self.parser.prev_identifier = Some(pos);
        self.parser.cursor = pos + 2;
        Some(payload_dwords * 4)
    }

    /// Make `byte_size` bytes readable at the cursor and hand out a guard
    /// over them.
    pub fn lock_read_buffer(
        &mut self,
        byte_size: usize,
    ) -> Result<LockedReadBuffer<'_, 'v>, ChunkError> {
        assert!(
            self.parser.mode == ChunkMode::Read,
            "read on a state chunk that is not in read mode"
        );
        let dwords = Self::ceil_dwords(byte_size);
        if !self.ensure_read_space(dwords) {
            warn!(
                "chunk read of {} bytes at dword {} overruns the data region",
                byte_size, self.parser.cursor
            );
            return Err(ChunkError::BufferExhausted {
                position: self.parser.cursor,
                requested: byte_size as u32,
            });
        }
        Ok(LockedReadBuffer {
            chunk: self,
            locked_bytes: byte_size,
            consumed_bytes: byte_size,
        })
    }

    /// Read one typed value.
    pub fn read_struct<T: ChunkStruct>(&mut self) -> Result<T, ChunkError> {
        let guard = self.lock_read_buffer(T::BYTE_SIZE)?;
        Ok(T::from_bytes(guard.data()))
    }

    /// Read a length-prefixed string. Count 0 is the "absent" marker.
    pub fn read_string(&mut self) -> Result<Option<String>, ChunkError> {
        let byte_count = self.read_struct::<u32>()? as usize;
        if byte_count == 0 {
            return Ok(None);
        }
        let mut raw = vec![0u8; byte_count];
        self.fill_buffer(&mut raw)?;
        // drop the NUL terminator carried in the byte count
        if raw.last() == Some(&0) {
            raw.pop();
        }
        Ok(Some(String::from_utf8(raw)?))
    }

    /// Read a length-prefixed buffer written by `write_buffer`. A recorded
    /// count of 0 yields an empty vector.
    pub fn read_buffer(&mut self) -> Result<Vec<u8>, ChunkError> {
        let byte_count = self.read_struct::<u32>()? as usize;
        let mut out = vec![0u8; byte_count];
        if byte_count != 0 {
            self.fill_buffer(&mut out)?;
        }
        Ok(out)
    }

    /// Fill `out` from a region whose size the caller already knows
    /// (the `write_buffer_no_size` counterpart).
    pub fn fill_buffer(&mut self, out: &mut [u8]) -> Result<(), ChunkError> {
        let guard = self.lock_read_buffer(out.len())?;
        out.copy_from_slice(guard.data());
        Ok(())
    }

    /// Read an object reference, remapping file table indices to created
    /// object ids when the chunk is bound to a file.
    pub fn read_object_id(&mut self) -> Result<ObjectId, ChunkError> {
        let raw = self.read_struct::<i64>()?;
        match self.bind_file() {
            Some(visitor) if self.chunk_version() >= ChunkVersion::Version1 => {
                if raw >= 0 {
                    Ok(visitor.object_by_index(raw as u32))
                } else {
                    Ok(ObjectId::NULL)
                }
            }
            _ => {
                if raw <= 0 {
                    Ok(ObjectId::NULL)
                } else {
                    Ok(ObjectId(raw as u64))
                }
            }
        }
    }

    /// Read a count-prefixed object id sequence.
    pub fn read_object_sequence(&mut self) -> Result<Vec<ObjectId>, ChunkError> {
        let count = self.read_struct::<u32>()?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(self.read_object_id()?);
        }
        Ok(ids)
    }

    /// Read an object id array. Same wire shape as a sequence in the current
    /// container version; historical containers carry a legacy size
    /// correction.
    pub fn read_object_array(&mut self) -> Result<Vec<ObjectId>, ChunkError> {
        let mut count = self.read_struct::<u32>()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        if self.chunk_version() < ChunkVersion::Version1 {
            // legacy files repeat the count after four scratch dwords
            self.skip(4);
            count = self.read_struct::<u32>()?;
        }
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            ids.push(self.read_object_id()?);
        }
        Ok(ids)
    }

    /// Read one manager value: its owning GUID and the stored integer.
    pub fn read_manager_int(&mut self) -> Result<(Guid, i32), ChunkError> {
        let guid = self.read_struct::<Guid>()?;
        let value = self.read_struct::<i32>()?;
        Ok((guid, value))
    }

    /// Read a manager value sequence: count, GUID, then the integers.
    pub fn read_manager_int_sequence(&mut self) -> Result<(Guid, Vec<i32>), ChunkError> {
        let count = self.read_struct::<u32>()?;
        let guid = self.read_struct::<Guid>()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.read_struct::<i32>()?);
        }
        Ok((guid, values))
    }

    /// Read a chunk embedded by `write_sub_chunk`.
    pub fn read_sub_chunk(&mut self) -> Result<StateChunk<'v>, ChunkError> {
        let embedded_dwords = self.read_struct::<u32>()?;
        if !self.ensure_read_space(embedded_dwords) {
            return Err(ChunkError::MalformedSubChunk {
                reason: "embedded chunk larger than the remaining data",
            });
        }

        let class_dword = self.read_struct::<u32>()?;
        let version_info = self.read_struct::<u32>()?;
        let data_dwords = self.read_struct::<u32>()?;
        let bound = self.read_struct::<u32>()?;
        let object_count = self.read_struct::<u32>()? as usize;
        let chunk_count = self.read_struct::<u32>()? as usize;
        let manager_count = self.read_struct::<u32>()? as usize;

        let mut sub = StateChunk::new(if bound == 1 { self.bind_file() } else { None });
        sub.class_id = Self::class_id_from_dword(class_dword)?;
        sub.data_version = DataVersion::try_from((version_info & 0xffff) as u8).map_err(|_| {
            ChunkError::MalformedSubChunk {
                reason: "unknown data version",
            }
        })?;
        sub.chunk_version =
            ChunkVersion::try_from(((version_info >> 16) & 0xffff) as u8).map_err(|_| {
                ChunkError::MalformedSubChunk {
                    reason: "unknown container version",
                }
            })?;

        sub.data_dwords = data_dwords;
        sub.data = vec![0u8; (data_dwords * 4) as usize];
        if data_dwords != 0 {
            let mut raw = std::mem::take(&mut sub.data);
            self.fill_buffer(&mut raw)?;
            sub.data = raw;
        }

        for (count, list) in [
            (object_count, &mut sub.object_list),
            (chunk_count, &mut sub.chunk_list),
            (manager_count, &mut sub.manager_list),
        ] {
            for _ in 0..count {
                list.push(self.read_struct::<u32>()?);
            }
        }

        Ok(sub)
    }

    /// Read a count-prefixed sequence of embedded chunks.
    pub fn read_sub_chunk_sequence(&mut self) -> Result<Vec<StateChunk<'v>>, ChunkError> {
        let count = self.read_struct::<u32>()?;
        let mut chunks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            chunks.push(self.read_sub_chunk()?);
        }
        Ok(chunks)
    }
}
