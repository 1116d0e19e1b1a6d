//! Concrete persisted classes.
//!
//! Every class follows one shared save/load pattern: serialize the base
//! field groups first (so base tags always precede derived tags in the
//! stream), then the class's own identifier-tagged regions; on load, probe
//! tags in any order and leave fields at their defaults when a tag is
//! absent.

pub mod camera;
pub mod entity;
pub mod group;
pub mod light;
pub mod material;
pub mod mesh;
pub mod texture;

#[cfg(test)]
mod tests;

use std::any::Any;

use crate::chunk::StateChunk;
use crate::context::IoEnv;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

/// Minimal concrete form of the non-leaf classes (basic, scene, behavioral
/// and render objects): identity state only.
pub struct BasicObject {
    class: ClassId,
    core: ObjectCore,
}

impl BasicObject {
    fn boxed(class: ClassId, id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
        Box::new(BasicObject {
            class,
            core: ObjectCore::new(id, name),
        })
    }
}

impl SceneObject for BasicObject {
    fn class_id(&self) -> ClassId {
        self.class
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn save(&self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.save_state(chunk)?;
        chunk.set_class_id(self.class);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn create_basic_object(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    BasicObject::boxed(ClassId::Object, id, name)
}

pub(crate) fn create_scene_object(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    BasicObject::boxed(ClassId::SceneObject, id, name)
}

pub(crate) fn create_be_object(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    BasicObject::boxed(ClassId::BeObject, id, name)
}

pub(crate) fn create_render_object(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    BasicObject::boxed(ClassId::RenderObject, id, name)
}
