//! Textures: a bitmap slot set plus presentation state.

use std::any::Any;

use crate::bitmap::{BitmapData, BitmapTags};
use crate::chunk::StateChunk;
use crate::context::IoEnv;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum TextureTag {
    MainData = 0x0000_8000,
    SpecificFormat = 0x0001_0000,
    RawData = 0x0002_0000,
    OldRawData = 0x0004_0000,
    FileNames = 0x0008_0000,
}

impl From<TextureTag> for u32 {
    fn from(tag: TextureTag) -> u32 {
        tag as u32
    }
}

const TEXTURE_BITMAP_TAGS: BitmapTags = BitmapTags {
    specific_format: TextureTag::SpecificFormat as u32,
    raw_data: TextureTag::RawData as u32,
    old_raw_data: TextureTag::OldRawData as u32,
    file_names: TextureTag::FileNames as u32,
};

pub struct Texture {
    core: ObjectCore,
    pub bitmap: BitmapData,
    video_format: u32,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Texture {
        core: ObjectCore::new(id, name),
        bitmap: BitmapData::new(),
        video_format: 0,
    })
}

impl Texture {
    pub fn video_format(&self) -> u32 {
        self.video_format
    }

    pub fn set_video_format(&mut self, format: u32) {
        self.video_format = format;
    }
}

impl SceneObject for Texture {
    fn class_id(&self) -> ClassId {
        ClassId::Texture
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn save(&self, chunk: &mut StateChunk<'_>, env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.save_state(chunk)?;

        self.bitmap.dump_to_chunk(chunk, &TEXTURE_BITMAP_TAGS, env)?;

        chunk.write_identifier(TextureTag::MainData);
        chunk.write_struct(&self.bitmap.current_slot());
        chunk.write_struct(&self.video_format);
        chunk.write_struct(&self.bitmap.pick_threshold());
        chunk.write_struct(&self.bitmap.transparent_color());
        chunk.write_struct(&(self.bitmap.is_transparent() as u32));
        chunk.write_struct(&u32::from(self.bitmap.save_options()));

        chunk.set_class_id(ClassId::Texture);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;

        self.bitmap
            .read_from_chunk(chunk, &TEXTURE_BITMAP_TAGS, env)?;

        if chunk.seek_identifier(TextureTag::MainData) {
            let current_slot = chunk.read_struct::<u32>()?;
            self.bitmap.set_current_slot(current_slot);
            self.video_format = chunk.read_struct::<u32>()?;
            let threshold = chunk.read_struct::<u32>()?;
            self.bitmap.set_pick_threshold(threshold);
            let color = chunk.read_struct::<u32>()?;
            let transparent = chunk.read_struct::<u32>()? != 0;
            if transparent {
                self.bitmap.set_transparent_color(color);
            } else {
                self.bitmap.set_transparent(false);
            }
            if let Ok(options) = chunk.read_struct::<u32>()?.try_into() {
                self.bitmap.set_save_options(options);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
