//! The file save driver: collects objects, serializes each through its
//! chunk, lays out the two regions and emits the checksummed container.

use byteorder::{LittleEndian, WriteBytesExt};
use log::warn;

use super::{
    FileObjectTable, FileWriteMode, ManagerData, CK_VERSION, FILE_MAGIC, FILE_VERSION,
    PRODUCT_BUILD, PRODUCT_VERSION,
};
use crate::chunk::StateChunk;
use crate::common::compress::{pack, FileChecksum};
use crate::common::types::Guid;
use crate::context::Context;
use crate::object::{ObjectFlags, ObjectId};
use crate::FileError;

pub struct FileWriter {
    write_mode: FileWriteMode,
    compression_level: u32,
    objects: Vec<ObjectId>,
    managers: Vec<ManagerData>,
}

impl FileWriter {
    pub fn new() -> Self {
        FileWriter {
            write_mode: FileWriteMode::empty(),
            compression_level: 5,
            objects: Vec::new(),
            managers: Vec::new(),
        }
    }

    pub fn set_write_mode(&mut self, mode: FileWriteMode) {
        self.write_mode = mode;
    }

    pub fn set_compression_level(&mut self, level: u32) {
        self.compression_level = level;
    }

    pub fn add_object(&mut self, id: ObjectId) {
        if !id.is_null() && !self.objects.contains(&id) {
            self.objects.push(id);
        }
    }

    pub fn add_objects(&mut self, ids: &[ObjectId]) {
        for &id in ids {
            self.add_object(id);
        }
    }

    /// Queue every live object of the context.
    pub fn add_all_objects(&mut self, ctx: &Context) {
        let ids: Vec<ObjectId> = ctx.manager().live_objects().collect();
        self.add_objects(&ids);
    }

    /// Attach one manager's opaque chunk to the manager table.
    pub fn add_manager_data(&mut self, guid: Guid, chunk: &StateChunk<'_>) {
        self.managers.push(ManagerData {
            guid,
            data: chunk.to_bytes(),
        });
    }

    /// Serialize everything queued into a complete container image.
    pub fn save(&self, ctx: &Context) -> Result<Vec<u8>, FileError> {
        // objects flagged as unsaveable are dropped up front so the table
        // indices other chunks reference stay dense
        let saved: Vec<ObjectId> = self
            .objects
            .iter()
            .copied()
            .filter(|&id| {
                ctx.manager()
                    .get(id)
                    .map(|obj| !obj.core().flags.contains(ObjectFlags::NOT_TO_BE_SAVED))
                    .unwrap_or(false)
            })
            .collect();

        let table = FileObjectTable::for_save(&saved);
        let env = ctx.io_env();

        // serialize every object through its own state chunk
        let mut chunks: Vec<Option<Vec<u8>>> = Vec::with_capacity(saved.len());
        for &id in &saved {
            let obj = ctx.manager().get(id).expect("filtered to live objects");
            let mut chunk = StateChunk::new(Some(&table));
            chunk.start_write();
            let result = obj.save(&mut chunk, &env);
            chunk.stop_write();
            match result {
                Ok(()) => chunks.push(Some(chunk.to_bytes())),
                Err(err) => {
                    warn!("object {id:?} failed to save, writing an empty entry: {err}");
                    chunks.push(None);
                }
            }
        }

        // data region: manager table then the per-object chunks
        let mut data_region = Vec::new();
        for manager in &self.managers {
            data_region.write_u32::<LittleEndian>(manager.guid.d1)?;
            data_region.write_u32::<LittleEndian>(manager.guid.d2)?;
            data_region.write_u32::<LittleEndian>(manager.data.len() as u32)?;
            data_region.extend_from_slice(&manager.data);
        }
        let mut object_offsets = Vec::with_capacity(saved.len());
        for bytes in &chunks {
            object_offsets.push(data_region.len() as u32 + 4);
            match bytes {
                Some(bytes) => {
                    data_region.write_u32::<LittleEndian>(bytes.len() as u32)?;
                    data_region.extend_from_slice(bytes);
                }
                None => data_region.write_u32::<LittleEndian>(0)?,
            }
        }

        // header-1 region: object table, plugin dependencies, included files
        let mut hdr1 = Vec::new();
        for (index, &id) in saved.iter().enumerate() {
            let obj = ctx.manager().get(id).expect("filtered to live objects");
            let chunk_size = chunks[index].as_ref().map(|b| b.len() as u32).unwrap_or(0);

            hdr1.write_u32::<LittleEndian>(0)?; // save flags
            hdr1.write_u32::<LittleEndian>(0)?; // creation options
            hdr1.write_u64::<LittleEndian>(id.0)?;
            hdr1.write_u32::<LittleEndian>(index as u32)?;
            hdr1.write_u32::<LittleEndian>(object_offsets[index])?; // patched below
            hdr1.write_u32::<LittleEndian>(chunk_size)?;
            hdr1.write_u32::<LittleEndian>(u8::from(obj.class_id()) as u32)?;
            match obj.core().name.as_deref() {
                Some(name) => {
                    hdr1.write_u32::<LittleEndian>(name.len() as u32)?;
                    hdr1.extend_from_slice(name.as_bytes());
                }
                None => hdr1.write_u32::<LittleEndian>(0)?,
            }
        }
        hdr1.write_u32::<LittleEndian>(0)?; // plugin dependency count
        hdr1.write_u32::<LittleEndian>(0)?; // included file count
        hdr1.write_u32::<LittleEndian>(0)?; // included files byte size

        let hdr1_unpack_size = hdr1.len() as u32;
        let data_unpack_size = data_region.len() as u32;

        // the recorded offsets are absolute positions in the unpacked
        // image: header, header-1 region, then the data region
        let data_base = 64 + hdr1_unpack_size;
        let mut at = 0usize;
        for (index, &id) in saved.iter().enumerate() {
            // the offset field sits after save flags, options, id and index
            let field_at = at + 20;
            let absolute = data_base + object_offsets[index];
            hdr1[field_at..field_at + 4].copy_from_slice(&absolute.to_le_bytes());
            let name_len = ctx
                .manager()
                .get(id)
                .and_then(|obj| obj.core().name.as_deref().map(str::len))
                .unwrap_or(0);
            at += 36 + name_len;
        }

        // pack the regions when asked and when it actually helps
        let compress = self.write_mode.contains(FileWriteMode::WHOLE_COMPRESSED)
            && self.compression_level > 0;
        let hdr1_out = Self::maybe_pack(hdr1, compress, self.compression_level);
        let data_out = Self::maybe_pack(data_region, compress, self.compression_level);

        let max_id_saved = saved.iter().map(|id| id.0).max().unwrap_or(0) as u32;

        let mut header = Vec::with_capacity(64);
        header.extend_from_slice(FILE_MAGIC);
        header.write_u32::<LittleEndian>(0)?; // crc, patched below
        header.write_u32::<LittleEndian>(CK_VERSION)?;
        header.write_u32::<LittleEndian>(FILE_VERSION)?;
        header.write_u32::<LittleEndian>(0)?;
        header.write_u32::<LittleEndian>(self.write_mode.bits())?;
        header.write_u32::<LittleEndian>(hdr1_out.len() as u32)?;
        header.write_u32::<LittleEndian>(data_out.len() as u32)?;
        header.write_u32::<LittleEndian>(data_unpack_size)?;
        header.write_u32::<LittleEndian>(self.managers.len() as u32)?;
        header.write_u32::<LittleEndian>(saved.len() as u32)?;
        header.write_u32::<LittleEndian>(max_id_saved)?;
        header.write_u32::<LittleEndian>(PRODUCT_VERSION)?;
        header.write_u32::<LittleEndian>(PRODUCT_BUILD)?;
        header.write_u32::<LittleEndian>(hdr1_unpack_size)?;

        let mut checksum = FileChecksum::new();
        checksum.update(&header);
        checksum.update(&hdr1_out);
        checksum.update(&data_out);
        let crc = checksum.finalize();
        header[8..12].copy_from_slice(&crc.to_le_bytes());

        let mut out = header;
        out.extend_from_slice(&hdr1_out);
        out.extend_from_slice(&data_out);
        Ok(out)
    }

    pub fn save_file(&self, ctx: &Context, path: &str) -> Result<(), FileError> {
        let image = self.save(ctx)?;
        std::fs::write(path, image)?;
        Ok(())
    }

    fn maybe_pack(region: Vec<u8>, compress: bool, level: u32) -> Vec<u8> {
        if !compress {
            return region;
        }
        let packed = pack(&region, level);
        // equal sizes mean "stored raw" to the reader, so a pack that does
        // not shrink is discarded
        if packed.len() < region.len() {
            packed
        } else {
            region
        }
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}
