//! The persisted container file: header, object and manager tables, and the
//! load/save drivers.
//!
//! Layout, inherited from the legacy format: a fixed 64-byte header
//! (version numbers, packed/unpacked sizes for the two logical regions, a
//! CRC, counts and the maximum-id watermark), a "header-1" region with the
//! object table and plugin/include bookkeeping, and a data region holding
//! the manager chunks followed by every object's state chunk. Either region
//! may be zlib packed; pack size equal to unpack size means stored raw.

mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use reader::FileReader;
pub use writer::FileWriter;

use std::collections::HashMap;

use bitflags::bitflags;

use crate::chunk::FileVisitor;
use crate::common::types::Guid;
use crate::object::registry::ClassId;
use crate::object::ObjectId;

pub const FILE_MAGIC: &[u8; 8] = b"Nemo Fi\0";

/// Engine version stamped into the header.
pub const CK_VERSION: u32 = 0x1302_2002;
/// Container layout revision this implementation writes.
pub const FILE_VERSION: u32 = 8;
/// Oldest container layout this implementation reads.
pub const MIN_FILE_VERSION: u32 = 7;
pub const MAX_FILE_VERSION: u32 = 9;

pub const PRODUCT_VERSION: u32 = 0;
pub const PRODUCT_BUILD: u32 = 0x0101_0000;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FileWriteMode: u32 {
        const FOR_VIEWER = 0x04;
        const WHOLE_COMPRESSED = 0x08;
    }
}

/// Parsed header fields, plus derived sizes.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub product_version: u32,
    pub product_build: u32,
    pub file_write_mode: u32,
    pub ck_version: u32,
    pub file_version: u32,
    pub file_size: u32,
    pub manager_count: u32,
    pub object_count: u32,
    pub max_id_saved: u32,
    pub hdr1_pack_size: u32,
    pub hdr1_unpack_size: u32,
    pub data_pack_size: u32,
    pub data_unpack_size: u32,
    pub crc: u32,
}

/// One object table entry plus its serialized chunk.
#[derive(Debug)]
pub struct FileObject {
    pub save_flags: u32,
    pub options: u32,
    /// Id recorded in the file (the id the object had when saved).
    pub object_id: ObjectId,
    /// Raw class id as stored; may name a class this build does not know.
    pub class_id: u32,
    /// Position of this entry in the table, the file-local id other
    /// chunks reference.
    pub file_index: u32,
    /// Absolute byte offset of the chunk in the unpacked file image.
    pub file_offset: u32,
    /// Byte size of the serialized chunk.
    pub pack_size: u32,
    pub name: Option<String>,
    /// Serialized state chunk container bytes.
    pub data: Option<Vec<u8>>,
    /// Id of the object created for this entry during a deep load.
    pub created_id: ObjectId,
}

impl FileObject {
    pub fn known_class_id(&self) -> Option<ClassId> {
        u8::try_from(self.class_id)
            .ok()
            .and_then(|v| ClassId::try_from(v).ok())
    }
}

/// One manager table entry: its GUID and an opaque serialized chunk.
#[derive(Debug)]
pub struct ManagerData {
    pub guid: Guid,
    pub data: Vec<u8>,
}

/// The id to table-index mapping used while chunks are bound to a file.
#[derive(Debug, Default)]
pub struct FileObjectTable {
    index_by_id: HashMap<ObjectId, u32>,
    created: Vec<ObjectId>,
}

impl FileObjectTable {
    pub fn for_save(ids: &[ObjectId]) -> Self {
        FileObjectTable {
            index_by_id: ids
                .iter()
                .enumerate()
                .map(|(index, &id)| (id, index as u32))
                .collect(),
            created: Vec::new(),
        }
    }

    pub fn for_load(created: Vec<ObjectId>) -> Self {
        FileObjectTable {
            index_by_id: HashMap::new(),
            created,
        }
    }
}

impl FileVisitor for FileObjectTable {
    fn index_of_object(&self, id: ObjectId) -> Option<u32> {
        self.index_by_id.get(&id).copied()
    }

    fn object_by_index(&self, index: u32) -> ObjectId {
        self.created
            .get(index as usize)
            .copied()
            .unwrap_or(ObjectId::NULL)
    }
}
