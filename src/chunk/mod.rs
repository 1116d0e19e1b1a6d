//! The state chunk buffer engine.
//!
//! A state chunk is the serialization unit for one object's persisted state:
//! a single growable DWORD-aligned buffer of identifier-tagged regions, plus
//! three offset lists recording where object references, embedded chunks and
//! manager values were written, so the file layer can resolve them in bulk.
//!
//! A chunk is in exactly one of three modes (idle, reading, writing) at a
//! time. Mode misuse is a caller defect and panics; running out of data while
//! reading is an ordinary soft error ([`crate::ChunkError`]).

mod reader;
mod writer;
pub mod types;


pub use reader::LockedReadBuffer;
pub use writer::LockedWriteBuffer;

use crate::object::registry::ClassId;
use crate::ChunkError;
use types::{ChunkMode, ChunkOptions, ChunkVersion, DataVersion, IdentifierProfile};

/// Object reference remapping offered by the file layer while a chunk is
/// bound to a file being read or written.
pub trait FileVisitor {
    /// Position of `id` in the file object table during save.
    fn index_of_object(&self, id: crate::object::ObjectId) -> Option<u32>;

    /// Id of the object created for table position `index` during load.
    fn object_by_index(&self, index: u32) -> crate::object::ObjectId;
}

pub(crate) struct ChunkParser {
    pub mode: ChunkMode,
    /// Cursor in DWORD units.
    pub cursor: u32,
    /// Readable or allocated size in DWORD units while a mode is active.
    pub window: u32,
    /// Position of the most recently written identifier header.
    pub prev_identifier: Option<u32>,
}

pub struct StateChunk<'v> {
    class_id: ClassId,
    data_version: DataVersion,
    chunk_version: ChunkVersion,

    /// The data region. Length is always a whole number of DWORDs; the
    /// declared size may be smaller than the allocation while writing.
    data: Vec<u8>,
    data_dwords: u32,

    parser: ChunkParser,

    /// DWORD offsets of object references inside the data region.
    object_list: Vec<u32>,
    /// DWORD offsets of embedded chunks.
    chunk_list: Vec<u32>,
    /// DWORD offsets of manager values.
    manager_list: Vec<u32>,

    bind_file: Option<&'v dyn FileVisitor>,
}

impl<'v> StateChunk<'v> {
    pub fn new(bind_file: Option<&'v dyn FileVisitor>) -> Self {
        StateChunk {
            class_id: ClassId::Object,
            data_version: DataVersion::CURRENT,
            chunk_version: ChunkVersion::CURRENT,
            data: Vec::new(),
            data_dwords: 0,
            parser: ChunkParser {
                mode: ChunkMode::Idle,
                cursor: 0,
                window: 0,
                prev_identifier: None,
            },
            object_list: Vec::new(),
            chunk_list: Vec::new(),
            manager_list: Vec::new(),
            bind_file,
        }
    }

    /// Reset to a freshly created chunk, dropping the buffer and all lists.
    pub fn clear(&mut self) {
        self.class_id = ClassId::Object;
        self.data_version = DataVersion::CURRENT;
        self.chunk_version = ChunkVersion::CURRENT;
        self.data.clear();
        self.data_dwords = 0;
        self.parser = ChunkParser {
            mode: ChunkMode::Idle,
            cursor: 0,
            window: 0,
            prev_identifier: None,
        };
        self.object_list.clear();
        self.chunk_list.clear();
        self.manager_list.clear();
    }

    /// Size of the data region in bytes.
    pub fn data_size(&self) -> u32 {
        self.data_dwords * 4
    }

    pub fn data_version(&self) -> DataVersion {
        self.data_version
    }

    pub fn set_data_version(&mut self, version: DataVersion) {
        self.data_version = version;
    }

    pub fn chunk_version(&self) -> ChunkVersion {
        self.chunk_version
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Record the owning class id. Every `save` override calls this at its
    /// end once it has written data.
    pub fn set_class_id(&mut self, class_id: ClassId) {
        self.class_id = class_id;
    }

    pub(crate) fn bind_file(&self) -> Option<&'v dyn FileVisitor> {
        self.bind_file
    }

    /// Move the cursor forward without touching data. Works in both active
    /// modes; false when the space is not there (reads). Writes grow instead.
    pub fn skip(&mut self, dword_count: u32) -> bool {
        match self.parser.mode {
            ChunkMode::Read => {
                if !self.ensure_read_space(dword_count) {
                    return false;
                }
            }
            ChunkMode::Write => self.ensure_write_space(dword_count),
            ChunkMode::Idle => return false,
        }
        self.parser.cursor += dword_count;
        true
    }

    // ===== internal buffer bookkeeping =====

    pub(crate) fn ceil_dwords(byte_size: usize) -> u32 {
        ((byte_size + 3) >> 2) as u32
    }

    pub(crate) fn dword_at(&self, pos: u32) -> u32 {
        let at = (pos * 4) as usize;
        u32::from_le_bytes(self.data[at..at + 4].try_into().expect("aligned buffer"))
    }

    pub(crate) fn put_dword(&mut self, pos: u32, value: u32) {
        let at = (pos * 4) as usize;
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn ensure_read_space(&self, dwords: u32) -> bool {
        self.parser.mode == ChunkMode::Read && self.parser.cursor + dwords <= self.parser.window
    }

    /// Grow the allocation so `dwords` more fit at the cursor. Growth is
    /// geometric with a 512-DWORD floor; new space is zero-filled, which is
    /// what pads byte-sized writes.
    pub(crate) fn ensure_write_space(&mut self, dwords: u32) {
        assert!(
            self.parser.mode == ChunkMode::Write,
            "state chunk is not in write mode"
        );
        let needed = self.parser.cursor + dwords;
        if needed > self.parser.window {
            let new_window = needed.max(self.parser.window * 2).max(512);
            self.data.resize((new_window * 4) as usize, 0);
            self.parser.window = new_window;
        }
    }

    // ===== identifier table =====

    /// Walk the identifier table. Each region is `(tag, delta)` where delta
    /// is the DWORD distance to the next identifier header and 0 marks the
    /// last region, whose payload runs to the end of the data.
    pub(crate) fn walk_identifiers(&self, mut visit: impl FnMut(u32, u32, u32) -> bool) {
        if self.data_dwords < 2 {
            return;
        }
        let mut pos = 0u32;
        loop {
            let tag = self.dword_at(pos);
            let delta = self.dword_at(pos + 1);
            let next = if delta == 0 { self.data_dwords } else { pos + delta };
            // payload is everything between the header and the next region
            if !visit(tag, pos, next.saturating_sub(pos + 2)) {
                return;
            }
            if delta == 0 {
                return;
            }
            pos += delta;
            if pos + 1 >= self.data_dwords {
                return;
            }
        }
    }

    /// Diagnostic listing of every identifier region in encounter order.
    pub fn identifier_profile(&self) -> Vec<IdentifierProfile> {
        let mut collection = Vec::new();
        if self.parser.mode != ChunkMode::Read {
            return collection;
        }
        self.walk_identifiers(|tag, pos, payload_dwords| {
            collection.push(IdentifierProfile {
                identifier: tag,
                byte_offset: (pos + 2) * 4,
                byte_size: payload_dwords * 4,
            });
            true
        });
        collection
    }

    // ===== serialized container form =====

    /// Serialize the chunk into its container byte form: a header DWORD
    /// packing data version, class id, chunk version and section options,
    /// the data DWORD count, the data region, then each present reference
    /// list as count + entries.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut options = ChunkOptions::empty();
        if !self.object_list.is_empty() {
            options |= ChunkOptions::IDS;
        }
        if !self.chunk_list.is_empty() {
            options |= ChunkOptions::CHN;
        }
        if !self.manager_list.is_empty() {
            options |= ChunkOptions::MAN;
        }
        if self.bind_file.is_some() {
            options |= ChunkOptions::FILE;
        }

        let mut out = Vec::with_capacity(8 + self.data.len());
        out.push(self.data_version.into());
        out.push(u8::from(self.class_id));
        out.push(self.chunk_version.into());
        out.push(options.bits());
        out.extend_from_slice(&self.data_dwords.to_le_bytes());
        out.extend_from_slice(&self.data[..(self.data_dwords * 4) as usize]);

        for (flag, list) in [
            (ChunkOptions::IDS, &self.object_list),
            (ChunkOptions::CHN, &self.chunk_list),
            (ChunkOptions::MAN, &self.manager_list),
        ] {
            if options.contains(flag) {
                out.extend_from_slice(&(list.len() as u32).to_le_bytes());
                for entry in list {
                    out.extend_from_slice(&entry.to_le_bytes());
                }
            }
        }
        out
    }

    /// Rebuild a chunk from its container byte form. Historical layouts
    /// older than the options-based one are still readable; anything newer
    /// than the current container version is refused.
    pub fn from_bytes(
        buf: &[u8],
        bind_file: Option<&'v dyn FileVisitor>,
    ) -> Result<StateChunk<'v>, ChunkError> {
        let mut chunk = StateChunk::new(bind_file);
        if buf.len() < 8 {
            return Err(ChunkError::MalformedSubChunk {
                reason: "container shorter than its header",
            });
        }

        chunk.data_version =
            DataVersion::try_from(buf[0]).map_err(|_| ChunkError::MalformedSubChunk {
                reason: "unknown data version",
            })?;
        chunk.chunk_version =
            ChunkVersion::try_from(buf[2]).map_err(|_| ChunkError::MalformedSubChunk {
                reason: "container version is newer than this implementation",
            })?;

        if chunk.chunk_version < ChunkVersion::Version2 {
            // historical layout: fixed field order, no options byte
            chunk.class_id = Self::class_id_from_dword(Self::dword_field(buf, 4)?)?;
            chunk.data_dwords = Self::dword_field(buf, 8)?;
            let object_count = Self::dword_field(buf, 16)? as usize;
            let chunk_count = Self::dword_field(buf, 20)? as usize;
            let mut at = 24usize;
            at = chunk.read_data_region(buf, at)?;
            at = Self::read_offset_list(buf, at, object_count, &mut chunk.object_list)?;
            Self::read_offset_list(buf, at, chunk_count, &mut chunk.chunk_list)?;
            chunk.bind_file = None;
        } else if chunk.chunk_version == ChunkVersion::Version2 {
            // historical layout with the manager list appended
            chunk.class_id = Self::class_id_from_dword(Self::dword_field(buf, 4)?)?;
            chunk.data_dwords = Self::dword_field(buf, 8)?;
            let object_count = Self::dword_field(buf, 16)? as usize;
            let chunk_count = Self::dword_field(buf, 20)? as usize;
            let manager_count = Self::dword_field(buf, 24)? as usize;
            let mut at = 28usize;
            at = chunk.read_data_region(buf, at)?;
            at = Self::read_offset_list(buf, at, object_count, &mut chunk.object_list)?;
            at = Self::read_offset_list(buf, at, chunk_count, &mut chunk.chunk_list)?;
            Self::read_offset_list(buf, at, manager_count, &mut chunk.manager_list)?;
            chunk.bind_file = None;
        } else {
            chunk.class_id = ClassId::try_from(buf[1]).map_err(|_| {
                ChunkError::MalformedSubChunk {
                    reason: "unknown class id",
                }
            })?;
            let options =
                ChunkOptions::from_bits(buf[3]).ok_or(ChunkError::MalformedSubChunk {
                    reason: "unknown container options",
                })?;

            chunk.data_dwords = Self::dword_field(buf, 4)?;
            let mut at = chunk.read_data_region(buf, 8)?;

            if !options.contains(ChunkOptions::FILE) {
                chunk.bind_file = None;
            }
            for (flag, list) in [
                (ChunkOptions::IDS, &mut chunk.object_list),
                (ChunkOptions::CHN, &mut chunk.chunk_list),
                (ChunkOptions::MAN, &mut chunk.manager_list),
            ] {
                if options.contains(flag) {
                    let count = Self::dword_field(buf, at)? as usize;
                    at = Self::read_offset_list(buf, at + 4, count, list)?;
                }
            }
        }

        Ok(chunk)
    }

    fn dword_field(buf: &[u8], at: usize) -> Result<u32, ChunkError> {
        let raw = buf.get(at..at + 4).ok_or(ChunkError::MalformedSubChunk {
            reason: "container truncated",
        })?;
        Ok(u32::from_le_bytes(raw.try_into().expect("exact size")))
    }

    fn class_id_from_dword(value: u32) -> Result<ClassId, ChunkError> {
        u8::try_from(value)
            .ok()
            .and_then(|v| ClassId::try_from(v).ok())
            .ok_or(ChunkError::MalformedSubChunk {
                reason: "unknown class id",
            })
    }

    fn read_data_region(&mut self, buf: &[u8], at: usize) -> Result<usize, ChunkError> {
        let len = (self.data_dwords * 4) as usize;
        let region = buf.get(at..at + len).ok_or(ChunkError::MalformedSubChunk {
            reason: "data region truncated",
        })?;
        self.data = region.to_vec();
        Ok(at + len)
    }

    fn read_offset_list(
        buf: &[u8],
        mut at: usize,
        count: usize,
        list: &mut Vec<u32>,
    ) -> Result<usize, ChunkError> {
        list.clear();
        list.reserve(count);
        for _ in 0..count {
            let raw = buf.get(at..at + 4).ok_or(ChunkError::MalformedSubChunk {
                reason: "reference list truncated",
            })?;
            list.push(u32::from_le_bytes(raw.try_into().expect("exact size")));
            at += 4;
        }
        Ok(at)
    }
}
