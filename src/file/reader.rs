//! The file load driver: shallow load (header and tables) and deep load
//! (object creation and chunk consumption).

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;

use super::{
    FileInfo, FileObject, FileObjectTable, ManagerData, FILE_MAGIC, MAX_FILE_VERSION,
    MIN_FILE_VERSION,
};
use crate::chunk::StateChunk;
use crate::common::compress::{unpack, FileChecksum};
use crate::common::types::Guid;
use crate::context::{Context, IoEnv};
use crate::object::ObjectId;
use crate::FileError;

pub struct FileReader {
    file_info: FileInfo,
    objects: Vec<FileObject>,
    managers: Vec<ManagerData>,
}

impl FileReader {
    /// Parse the container image: header, checksum, tables and every
    /// object's chunk bytes. No objects are created yet.
    pub fn shallow_load(data: &[u8]) -> Result<FileReader, FileError> {
        if data.len() < 64 || &data[..8] != FILE_MAGIC {
            return Err(FileError::InvalidMagicValue);
        }

        let mut header = Cursor::new(&data[8..64]);
        let crc = header.read_u32::<LittleEndian>()?;
        let ck_version = header.read_u32::<LittleEndian>()?;
        let file_version = header.read_u32::<LittleEndian>()?;
        let zero = header.read_u32::<LittleEndian>()?;
        let file_write_mode = header.read_u32::<LittleEndian>()?;
        let hdr1_pack_size = header.read_u32::<LittleEndian>()?;
        let data_pack_size = header.read_u32::<LittleEndian>()?;
        let data_unpack_size = header.read_u32::<LittleEndian>()?;
        let manager_count = header.read_u32::<LittleEndian>()?;
        let object_count = header.read_u32::<LittleEndian>()?;
        let max_id_saved = header.read_u32::<LittleEndian>()?;
        let product_version = header.read_u32::<LittleEndian>()?;
        let product_build = header.read_u32::<LittleEndian>()?;
        let hdr1_unpack_size = header.read_u32::<LittleEndian>()?;

        if zero != 0 {
            return Err(FileError::FormatError {
                reason: "reserved zero field is set",
            });
        }
        if !(MIN_FILE_VERSION..=MAX_FILE_VERSION).contains(&file_version) {
            return Err(FileError::UnsupportedFileVersion {
                version: file_version,
            });
        }

        let file_info = FileInfo {
            product_version,
            product_build,
            file_write_mode,
            ck_version,
            file_version,
            file_size: data.len() as u32,
            manager_count,
            object_count,
            max_id_saved,
            hdr1_pack_size,
            hdr1_unpack_size,
            data_pack_size,
            data_unpack_size,
            crc,
        };

        let hdr1_end = 64usize + hdr1_pack_size as usize;
        let data_end = hdr1_end + data_pack_size as usize;
        if data.len() < data_end {
            return Err(FileError::FormatError {
                reason: "file shorter than its recorded region sizes",
            });
        }
        let hdr1_packed = &data[64..hdr1_end];
        let data_packed = &data[hdr1_end..data_end];

        // checksum covers the header (crc field zeroed) and both packed
        // regions
        let mut checksum = FileChecksum::new();
        let mut header_image = data[..64].to_vec();
        header_image[8..12].fill(0);
        checksum.update(&header_image);
        checksum.update(hdr1_packed);
        checksum.update(data_packed);
        let computed = checksum.finalize();
        if computed != crc {
            return Err(FileError::ChecksumMismatch {
                stored: crc,
                computed,
            });
        }

        let hdr1 = Self::unpack_region(hdr1_packed, hdr1_pack_size, hdr1_unpack_size)?;
        let body = Self::unpack_region(data_packed, data_pack_size, data_unpack_size)?;

        let objects = Self::parse_object_table(&hdr1, object_count)?;
        let (managers, objects) = Self::parse_data_region(&body, manager_count, objects)?;

        Ok(FileReader {
            file_info,
            objects,
            managers,
        })
    }

    pub fn load_file(path: &str) -> Result<FileReader, FileError> {
        let data = std::fs::read(path)?;
        Self::shallow_load(&data)
    }

    pub fn file_info(&self) -> &FileInfo {
        &self.file_info
    }

    pub fn objects(&self) -> &[FileObject] {
        &self.objects
    }

    pub fn managers(&self) -> &[ManagerData] {
        &self.managers
    }

    fn unpack_region(
        packed: &[u8],
        pack_size: u32,
        unpack_size: u32,
    ) -> Result<Vec<u8>, FileError> {
        if pack_size == unpack_size {
            return Ok(packed.to_vec());
        }
        unpack(packed, unpack_size as usize).ok_or(FileError::UnpackError)
    }

    fn parse_object_table(hdr1: &[u8], object_count: u32) -> Result<Vec<FileObject>, FileError> {
        let mut cursor = Cursor::new(hdr1);
        let mut objects = Vec::with_capacity(object_count as usize);

        for _ in 0..object_count {
            let save_flags = cursor.read_u32::<LittleEndian>()?;
            let options = cursor.read_u32::<LittleEndian>()?;
            let object_id = ObjectId(cursor.read_u64::<LittleEndian>()?);
            let file_index = cursor.read_u32::<LittleEndian>()?;
            let file_offset = cursor.read_u32::<LittleEndian>()?;
            let pack_size = cursor.read_u32::<LittleEndian>()?;
            let class_id = cursor.read_u32::<LittleEndian>()?;
            let name_len = cursor.read_u32::<LittleEndian>()? as usize;
            let name = if name_len != 0 {
                let mut raw = vec![0u8; name_len];
                cursor.read_exact(&mut raw)?;
                Some(String::from_utf8(raw).map_err(|_| FileError::FormatError {
                    reason: "object name is not valid UTF-8",
                })?)
            } else {
                None
            };

            objects.push(FileObject {
                save_flags,
                options,
                object_id,
                class_id,
                file_index,
                file_offset,
                pack_size,
                name,
                data: None,
                created_id: ObjectId::NULL,
            });
        }

        // plugin dependency list: category + GUID list per entry
        let dep_count = cursor.read_u32::<LittleEndian>()?;
        for _ in 0..dep_count {
            let _category = cursor.read_u32::<LittleEndian>()?;
            let guid_count = cursor.read_u32::<LittleEndian>()?;
            for _ in 0..guid_count {
                let _ = cursor.read_u64::<LittleEndian>()?;
            }
        }

        // included files: entry count and total byte size
        let _included_count = cursor.read_u32::<LittleEndian>()?;
        let _included_size = cursor.read_u32::<LittleEndian>()?;

        Ok(objects)
    }

    fn parse_data_region(
        body: &[u8],
        manager_count: u32,
        mut objects: Vec<FileObject>,
    ) -> Result<(Vec<ManagerData>, Vec<FileObject>), FileError> {
        let mut cursor = Cursor::new(body);

        let mut managers = Vec::with_capacity(manager_count as usize);
        for _ in 0..manager_count {
            let d1 = cursor.read_u32::<LittleEndian>()?;
            let d2 = cursor.read_u32::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()? as usize;
            let mut data = vec![0u8; size];
            cursor.read_exact(&mut data)?;
            managers.push(ManagerData {
                guid: Guid::new(d1, d2),
                data,
            });
        }

        for object in &mut objects {
            let size = cursor.read_u32::<LittleEndian>()? as usize;
            if size == 0 {
                continue;
            }
            let mut data = vec![0u8; size];
            cursor.read_exact(&mut data)?;
            object.data = Some(data);
        }

        Ok((managers, objects))
    }

    /// Create every object through the manager, then feed each its chunk.
    ///
    /// A per-object failure (unknown class, malformed chunk) is logged and
    /// skipped; already-loaded objects stay intact.
    pub fn deep_load(&mut self, ctx: &mut Context) -> Result<(), FileError> {
        let mut created = Vec::with_capacity(self.objects.len());
        for object in &mut self.objects {
            let id = match object.known_class_id() {
                Some(class_id) => ctx
                    .manager
                    .create_object(class_id, object.name.as_deref())
                    .unwrap_or(ObjectId::NULL),
                None => {
                    warn!(
                        "file object {:?} has unsupported class id {}, skipping",
                        object.object_id, object.class_id
                    );
                    ObjectId::NULL
                }
            };
            object.created_id = id;
            created.push(id);
        }

        let table = FileObjectTable::for_load(created);

        let manager = &mut ctx.manager;
        let codecs = &ctx.codecs;
        let paths = &ctx.paths;
        let global_texture_save_options = ctx.global_texture_save_options;
        let global_texture_save_format = ctx.global_texture_save_format;

        for object in &self.objects {
            if object.created_id.is_null() {
                continue;
            }
            let Some(bytes) = &object.data else { continue };

            let mut chunk = StateChunk::from_bytes(bytes, Some(&table))?;
            chunk.start_read();
            manager.with_taken(object.created_id, |obj, manager| {
                let env = IoEnv {
                    codecs,
                    paths,
                    global_texture_save_options,
                    global_texture_save_format,
                    manager: Some(manager),
                };
                if let Err(err) = obj.load(&mut chunk, &env) {
                    warn!(
                        "object {:?} failed to load its state chunk: {err}",
                        object.created_id
                    );
                }
            });
            chunk.stop_read();
        }

        Ok(())
    }
}
