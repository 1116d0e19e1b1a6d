//! Materials: surface colors, modes and one weak texture reference.

use std::any::Any;

use crate::chunk::StateChunk;
use crate::common::types::VxColor;
use crate::context::IoEnv;
use crate::object::manager::ObjectManager;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum MaterialTag {
    MainData = 0x0000_1000,
}

impl From<MaterialTag> for u32 {
    fn from(tag: MaterialTag) -> u32 {
        tag as u32
    }
}

pub struct Material {
    core: ObjectCore,
    pub diffuse: VxColor,
    pub ambient: VxColor,
    pub specular: VxColor,
    pub emissive: VxColor,
    pub specular_power: f32,
    texture: ObjectId,
    pub source_blend: u32,
    pub dest_blend: u32,
    pub two_sided: bool,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Material {
        core: ObjectCore::new(id, name),
        diffuse: VxColor::new(0.7, 0.7, 0.7, 1.0),
        ambient: VxColor::new(0.3, 0.3, 0.3, 1.0),
        specular: VxColor::new(0.5, 0.5, 0.5, 1.0),
        emissive: VxColor::default(),
        specular_power: 0.0,
        texture: ObjectId::NULL,
        source_blend: 1,
        dest_blend: 0,
        two_sided: false,
    })
}

impl Material {
    pub fn texture(&self) -> ObjectId {
        self.texture
    }

    pub fn set_texture(&mut self, texture: ObjectId) {
        self.texture = texture;
    }
}

impl SceneObject for Material {
    fn class_id(&self) -> ClassId {
        ClassId::Material
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn save(&self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.save_state(chunk)?;

        chunk.write_identifier(MaterialTag::MainData);
        chunk.write_struct(&self.diffuse);
        chunk.write_struct(&self.ambient);
        chunk.write_struct(&self.specular);
        chunk.write_struct(&self.emissive);
        chunk.write_struct(&self.specular_power);
        chunk.write_object_id(self.texture);
        chunk.write_struct(&self.source_blend);
        chunk.write_struct(&self.dest_blend);
        chunk.write_struct(&(self.two_sided as u32));

        chunk.set_class_id(ClassId::Material);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;

        if chunk.seek_identifier(MaterialTag::MainData) {
            self.diffuse = chunk.read_struct::<VxColor>()?;
            self.ambient = chunk.read_struct::<VxColor>()?;
            self.specular = chunk.read_struct::<VxColor>()?;
            self.emissive = chunk.read_struct::<VxColor>()?;
            self.specular_power = chunk.read_struct::<f32>()?;
            self.texture = chunk.read_object_id()?;
            self.source_blend = chunk.read_struct::<u32>()?;
            self.dest_blend = chunk.read_struct::<u32>()?;
            self.two_sided = chunk.read_struct::<u32>()? != 0;
        }
        Ok(())
    }

    fn check_post_deletion(&mut self, manager: &ObjectManager) {
        if !self.texture.is_null() && !manager.is_object_safe(self.texture) {
            self.texture = ObjectId::NULL;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
