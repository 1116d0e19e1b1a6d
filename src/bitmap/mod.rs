//! The bitmap/texture slot codec.
//!
//! A texture-like object carries a variable number of named image slots
//! (cubemap faces, animation frames). On disk each slot is stored in one of
//! three layouts picked by a save option: raw four-channel planar buffers, a
//! codec-specific encoded form, or no pixels at all, just a file name to be
//! resolved against the search paths at load time.

pub mod handler;


use bitflags::bitflags;
use log::{debug, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::chunk::StateChunk;
use crate::common::path::PathManager;
use crate::common::types::Guid;
use crate::context::IoEnv;
use crate::ChunkError;
use handler::{BitmapProperties, FileExtension};

/// One RGBA8888 pixel rectangle, rows top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32) -> Self {
        ImageData {
            width,
            height,
            // fresh images start fully opaque black
            pixels: (0..width as usize * height as usize)
                .flat_map(|_| [0, 0, 0, 0xFF])
                .collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Extract one channel (0=R, 1=G, 2=B, 3=A) as a packed plane.
    pub fn channel_plane(&self, channel: usize) -> Vec<u8> {
        self.pixels.iter().skip(channel).step_by(4).copied().collect()
    }

    /// Rebuild from four packed planes, which must be of equal pixel count.
    pub fn from_planes(width: u32, height: u32, r: &[u8], g: &[u8], b: &[u8], a: Option<&[u8]>) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for i in 0..count {
            pixels.push(r[i]);
            pixels.push(g[i]);
            pixels.push(b[i]);
            // no alpha plane means fully opaque
            pixels.push(a.map(|p| p[i]).unwrap_or(0xFF));
        }
        ImageData {
            width,
            height,
            pixels,
        }
    }

    /// A copy with the row order reversed; the legacy raw layout stores
    /// images bottom-up.
    pub fn flipped_rows(&self) -> ImageData {
        let row_bytes = self.width as usize * 4;
        let mut pixels = Vec::with_capacity(self.pixels.len());
        for row in self.pixels.chunks_exact(row_bytes).rev() {
            pixels.extend_from_slice(row);
        }
        ImageData {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    /// Set every pixel's alpha to one value.
    pub fn fill_alpha(&mut self, alpha: u8) {
        for px in self.pixels.chunks_exact_mut(4) {
            px[3] = alpha;
        }
    }

    /// Replace the alpha channel from a packed plane.
    pub fn set_alpha_plane(&mut self, plane: &[u8]) {
        for (px, &alpha) in self.pixels.chunks_exact_mut(4).zip(plane) {
            px[3] = alpha;
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct BitmapFlags: u32 {
        const INVALID = 0x01;
        const TRANSPARENT = 0x02;
        const CUBEMAP = 0x04;
        const FORCE_RESTORE = 0x08;
    }
}

/// How a texture's pixels are persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum TextureSaveOptions {
    /// Four planar channel buffers per slot.
    RawData = 0,
    /// No embedded pixels; file names only.
    External = 1,
    /// Delegated to the matching image codec.
    ImageFormat = 2,
    /// Defer to the context-wide default.
    UseGlobal = 3,
}

/// Identifier tags the owning object assigns to the codec's regions.
#[derive(Debug, Copy, Clone)]
pub struct BitmapTags {
    pub specific_format: u32,
    pub raw_data: u32,
    pub old_raw_data: u32,
    pub file_names: u32,
}

#[derive(Debug, Default)]
pub struct BitmapSlot {
    pub image: Option<ImageData>,
    pub file_name: Option<String>,
}

/// Alpha side-channel marker: 1 means every pixel shares one alpha value;
/// anything else means a per-pixel table follows. The exact not-1 value
/// carries no meaning.
const ALPHA_UNIFORM: u32 = 1;
const ALPHA_VARIES: u32 = 2;

pub struct BitmapData {
    slots: Vec<BitmapSlot>,
    current_slot: u32,
    pick_threshold: u32,
    flags: BitmapFlags,
    transparent_color: u32,
    save_properties: BitmapProperties,
    save_options: TextureSaveOptions,
}

impl BitmapData {
    pub fn new() -> Self {
        BitmapData {
            slots: Vec::new(),
            current_slot: 0,
            pick_threshold: 0,
            flags: BitmapFlags::INVALID,
            transparent_color: 0,
            save_properties: BitmapProperties::default(),
            save_options: TextureSaveOptions::UseGlobal,
        }
    }

    pub fn set_slot_count(&mut self, count: u32) {
        self.slots.resize_with(count as usize, BitmapSlot::default);
        if count == 0 {
            self.flags.insert(BitmapFlags::INVALID);
        }
    }

    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slot(&self, index: u32) -> Option<&BitmapSlot> {
        self.slots.get(index as usize)
    }

    pub fn slot_mut(&mut self, index: u32) -> Option<&mut BitmapSlot> {
        self.slots.get_mut(index as usize)
    }

    pub fn set_current_slot(&mut self, slot: u32) {
        if (slot as usize) < self.slots.len() {
            self.current_slot = slot;
            if self.flags.contains(BitmapFlags::CUBEMAP) {
                self.flags.insert(BitmapFlags::FORCE_RESTORE);
            }
        }
    }

    pub fn current_slot(&self) -> u32 {
        self.current_slot
    }

    pub fn width(&self) -> u32 {
        self.slot(self.current_slot)
            .and_then(|s| s.image.as_ref())
            .map(|i| i.width())
            .unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.slot(self.current_slot)
            .and_then(|s| s.image.as_ref())
            .map(|i| i.height())
            .unwrap_or(0)
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        if transparent {
            self.flags.insert(BitmapFlags::TRANSPARENT);
        } else {
            self.flags.remove(BitmapFlags::TRANSPARENT);
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.flags.contains(BitmapFlags::TRANSPARENT)
    }

    pub fn set_transparent_color(&mut self, color: u32) {
        self.set_transparent(true);
        self.transparent_color = color;
    }

    pub fn transparent_color(&self) -> u32 {
        self.transparent_color
    }

    pub fn set_pick_threshold(&mut self, threshold: u32) {
        self.pick_threshold = threshold;
    }

    pub fn pick_threshold(&self) -> u32 {
        self.pick_threshold
    }

    pub fn save_options(&self) -> TextureSaveOptions {
        self.save_options
    }

    pub fn set_save_options(&mut self, options: TextureSaveOptions) {
        self.save_options = options;
    }

    pub fn save_properties(&self) -> &BitmapProperties {
        &self.save_properties
    }

    pub fn set_save_properties(&mut self, properties: BitmapProperties) {
        self.save_properties = properties;
    }

    /// Load `file_name` into `slot` via the codec matching its extension.
    pub fn load_image(&mut self, file_name: &str, slot: u32, env: &IoEnv<'_>) -> bool {
        if slot as usize >= self.slots.len() {
            return false;
        }
        let ext = PathManager::extension(file_name);
        let Some(codec) = env.codecs.find_by_extension(&ext) else {
            return false;
        };
        match codec.read_file(file_name) {
            Some(image) => {
                self.slots[slot as usize].image = Some(image);
                true
            }
            None => false,
        }
    }

    // ===== chunk read side =====

    /// Read every slot from `chunk`. Embedded layouts are probed in order
    /// (specific format, raw, legacy raw); afterwards the filenames region
    /// is always probed, recovering any slot that carries no embedded
    /// pixels from its recorded file.
    pub fn read_from_chunk(
        &mut self,
        chunk: &mut StateChunk<'_>,
        tags: &BitmapTags,
        env: &IoEnv<'_>,
    ) -> Result<(), ChunkError> {
        let mut slot_populated: Vec<bool> = Vec::new();

        if chunk.seek_identifier(tags.specific_format) {
            let slot_count = chunk.read_struct::<u32>()?;
            let width = chunk.read_struct::<u32>()?;
            let height = chunk.read_struct::<u32>()?;
            let _bpp = chunk.read_struct::<u32>()?;

            self.set_slot_count(slot_count);
            slot_populated.resize(slot_count as usize, false);

            if width > 0 && height > 0 {
                for index in 0..slot_count {
                    // a failed slot leaves the image empty; the filenames
                    // pass may still recover it from disk
                    if let Some(image) = Self::read_specific_format(chunk, env)? {
                        self.slots[index as usize].image = Some(image);
                        slot_populated[index as usize] = true;
                    }
                }
            }
        } else if chunk.seek_identifier(tags.raw_data) {
            let slot_count = chunk.read_struct::<u32>()?;
            self.set_slot_count(slot_count);
            slot_populated.resize(slot_count as usize, false);

            for index in 0..slot_count {
                if let Some(image) = Self::read_raw(chunk)? {
                    // raw rows are stored bottom-up
                    self.slots[index as usize].image = Some(image.flipped_rows());
                    slot_populated[index as usize] = true;
                }
            }
        } else if chunk.seek_identifier(tags.old_raw_data) {
            let slot_count = chunk.read_struct::<u32>()?;
            self.set_slot_count(slot_count);
            slot_populated.resize(slot_count as usize, false);

            for _ in 0..slot_count {
                // the legacy sub-format is a known gap: signal "not
                // implemented" instead of producing wrong pixels
                Self::read_old_raw();
            }
        }

        if chunk.seek_identifier(tags.file_names) {
            let slot_count = chunk.read_struct::<u32>()?;
            self.set_slot_count(slot_count);

            for index in 0..slot_count {
                let Some(mut file_name) = chunk.read_string()? else {
                    continue;
                };
                if file_name.is_empty() {
                    continue;
                }

                let populated = slot_populated.get(index as usize).copied().unwrap_or(false);
                if populated {
                    self.slots[index as usize].file_name = Some(file_name);
                } else if env.paths.resolve_file_name(&mut file_name) {
                    if self.load_image(&file_name, index, env) {
                        self.slots[index as usize].file_name = Some(file_name);
                    }
                }
            }
        }

        Ok(())
    }

    fn read_specific_format(
        chunk: &mut StateChunk<'_>,
        env: &IoEnv<'_>,
    ) -> Result<Option<ImageData>, ChunkError> {
        let transparency = chunk.read_struct::<u32>()?;

        let mut raw_ext = [0u8; 4];
        chunk.fill_buffer(&mut raw_ext)?;
        let guid = chunk.read_struct::<Guid>()?;
        let codec = env.codecs.find(FileExtension::from_bytes(raw_ext), guid);

        let encoded_size = chunk.read_struct::<u32>()? as usize;
        if encoded_size == 0 {
            return Ok(None);
        }

        let mut image = {
            let guard = chunk.lock_read_buffer(encoded_size)?;
            match codec.and_then(|c| c.read_memory(guard.data())) {
                Some(image) => image,
                None => return Ok(None),
            }
        };

        // an alpha side channel follows only when the codec could not
        // carry alpha itself
        if transparency == 2 {
            let alpha_count = chunk.read_struct::<u32>()?;
            if alpha_count == ALPHA_UNIFORM {
                let shared = chunk.read_struct::<u32>()?;
                image.fill_alpha(shared as u8);
            } else {
                let plane = chunk.read_buffer()?;
                image.set_alpha_plane(&plane);
            }
        }

        Ok(Some(image))
    }

    fn read_raw(chunk: &mut StateChunk<'_>) -> Result<Option<ImageData>, ChunkError> {
        let bytes_per_pixel = chunk.read_struct::<u32>()?;
        if bytes_per_pixel == 0 {
            return Ok(None);
        }

        let width = chunk.read_struct::<u32>()?;
        let height = chunk.read_struct::<u32>()?;
        let _alpha_mask = chunk.read_struct::<u32>()?;
        let _red_mask = chunk.read_struct::<u32>()?;
        let _green_mask = chunk.read_struct::<u32>()?;
        let _blue_mask = chunk.read_struct::<u32>()?;

        let buffer_options = chunk.read_struct::<u32>()? & 0xF;
        if buffer_options != 0 {
            // in-chunk recompressed channels are a legacy feature this
            // implementation does not read
            warn!("raw bitmap slot uses an unsupported channel compression");
            return Ok(None);
        }

        let blue = chunk.read_buffer()?;
        let green = chunk.read_buffer()?;
        let red = chunk.read_buffer()?;
        let alpha = chunk.read_buffer()?;

        let count = width as usize * height as usize;
        if red.len() < count || green.len() < count || blue.len() < count {
            return Ok(None);
        }
        let alpha = (alpha.len() >= count).then_some(alpha.as_slice());
        Ok(Some(ImageData::from_planes(width, height, &red, &green, &blue, alpha)))
    }

    /// The "old raw" sub-format is deliberately unimplemented.
    fn read_old_raw() -> bool {
        false
    }

    // ===== chunk write side =====

    /// Write every slot into `chunk` under the effective save option.
    pub fn dump_to_chunk(
        &self,
        chunk: &mut StateChunk<'_>,
        tags: &BitmapTags,
        env: &IoEnv<'_>,
    ) -> Result<(), ChunkError> {
        let mut save_options = self.save_options;
        let mut save_properties = self.save_properties;
        if save_options == TextureSaveOptions::UseGlobal {
            save_options = env.global_texture_save_options;
            save_properties = env.global_texture_save_format;
        }

        // external saving needs a file name on every slot; one missing name
        // downgrades the whole texture to raw mode (named slots still skip
        // their pixels, those are recoverable from their files)
        let mut externally_saved = vec![false; self.slots.len()];
        if save_options == TextureSaveOptions::External {
            for (index, slot) in self.slots.iter().enumerate() {
                if slot.file_name.is_none() {
                    debug!("texture slot {index} has no file name, downgrading save to raw data");
                    save_options = TextureSaveOptions::RawData;
                } else {
                    externally_saved[index] = true;
                }
            }
        }

        match save_options {
            TextureSaveOptions::RawData => {
                chunk.write_identifier(tags.raw_data);
                chunk.write_struct(&self.slot_count());
                for (index, slot) in self.slots.iter().enumerate() {
                    let skip_pixels = externally_saved[index];
                    match (&slot.image, skip_pixels) {
                        (Some(image), false) => Self::write_raw(chunk, Some(&image.flipped_rows())),
                        _ => Self::write_raw(chunk, None),
                    }
                }
            }
            TextureSaveOptions::ImageFormat => {
                chunk.write_identifier(tags.specific_format);
                chunk.write_struct(&self.slot_count());
                chunk.write_struct(&self.width());
                chunk.write_struct(&self.height());
                chunk.write_struct(&32u32);
                for slot in &self.slots {
                    Self::write_specific_format(chunk, slot.image.as_ref(), &save_properties, env);
                }
            }
            // external mode embeds nothing; the filenames region carries it
            TextureSaveOptions::External => {}
            TextureSaveOptions::UseGlobal => unreachable!("resolved above"),
        }

        chunk.write_identifier(tags.file_names);
        chunk.write_struct(&self.slot_count());
        for slot in &self.slots {
            let name = slot.file_name.as_deref().map(PathManager::file_name);
            chunk.write_string(name.as_deref());
        }

        Ok(())
    }

    fn write_specific_format(
        chunk: &mut StateChunk<'_>,
        image: Option<&ImageData>,
        properties: &BitmapProperties,
        env: &IoEnv<'_>,
    ) {
        let codec = env.codecs.find(properties.ext, properties.codec_guid);
        let (Some(image), Some(codec)) = (image, codec) else {
            // invalid image or no codec: a zero marks the empty slot
            chunk.write_struct(&0u32);
            return;
        };

        let can_save_alpha = codec.can_save_alpha();
        chunk.write_struct(&if can_save_alpha { 1u32 } else { 2u32 });
        chunk.write_buffer_no_size(properties.ext.as_bytes());
        chunk.write_struct(&properties.codec_guid);

        let encoded = codec.save_memory(image);
        chunk.write_struct(&(encoded.len() as u32));
        chunk.write_buffer_no_size(&encoded);

        if !can_save_alpha {
            let plane = image.channel_plane(3);
            let uniform = plane.windows(2).all(|w| w[0] == w[1]);
            if uniform {
                chunk.write_struct(&ALPHA_UNIFORM);
                chunk.write_struct(&(plane.first().copied().unwrap_or(0xFF) as u32));
            } else {
                chunk.write_struct(&ALPHA_VARIES);
                chunk.write_buffer(&plane);
            }
        }
    }

    fn write_raw(chunk: &mut StateChunk<'_>, image: Option<&ImageData>) {
        let Some(image) = image else {
            // an absent slot is a zero bytes-per-pixel marker
            chunk.write_struct(&0u32);
            return;
        };

        chunk.write_struct(&32u32);
        chunk.write_struct(&image.width());
        chunk.write_struct(&image.height());
        chunk.write_struct(&0xFF00_0000u32);
        chunk.write_struct(&0x00FF_0000u32);
        chunk.write_struct(&0x0000_FF00u32);
        chunk.write_struct(&0x0000_00FFu32);

        // 0: channels are stored plain, no in-chunk recompression
        chunk.write_struct(&0u32);

        chunk.write_buffer(&image.channel_plane(2));
        chunk.write_buffer(&image.channel_plane(1));
        chunk.write_buffer(&image.channel_plane(0));
        chunk.write_buffer(&image.channel_plane(3));
    }
}

impl Default for BitmapData {
    fn default() -> Self {
        Self::new()
    }
}
