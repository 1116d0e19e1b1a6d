//! 3D entities: placed objects carrying a current mesh and a set of
//! potential meshes, referenced by id only.

use std::any::Any;

use crate::chunk::StateChunk;
use crate::common::types::VxMatrix;
use crate::context::IoEnv;
use crate::object::manager::ObjectManager;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum EntityTag {
    MainData = 0x0000_0020,
    Meshes = 0x0000_0040,
}

impl From<EntityTag> for u32 {
    fn from(tag: EntityTag) -> u32 {
        tag as u32
    }
}

/// Field group shared by every placed 3D class (entities, cameras, lights).
#[derive(Debug, Default)]
pub struct Entity3dState {
    pub world_matrix: VxMatrix,
    pub current_mesh: ObjectId,
    pub potential_meshes: Vec<ObjectId>,
}

impl Entity3dState {
    pub fn save_state(&self, chunk: &mut StateChunk<'_>) -> Result<(), ChunkError> {
        chunk.write_identifier(EntityTag::MainData);
        chunk.write_struct(&self.world_matrix);

        chunk.write_identifier(EntityTag::Meshes);
        chunk.write_object_id(self.current_mesh);
        chunk.write_object_sequence(&self.potential_meshes);
        Ok(())
    }

    pub fn load_state(&mut self, chunk: &mut StateChunk<'_>) -> Result<(), ChunkError> {
        if chunk.seek_identifier(EntityTag::MainData) {
            self.world_matrix = chunk.read_struct::<VxMatrix>()?;
        }
        if chunk.seek_identifier(EntityTag::Meshes) {
            self.current_mesh = chunk.read_object_id()?;
            self.potential_meshes = chunk.read_object_sequence()?;
        }
        Ok(())
    }

    /// Null out mesh references that no longer resolve.
    pub fn drop_dangling(&mut self, manager: &ObjectManager) {
        if !self.current_mesh.is_null() && !manager.is_object_safe(self.current_mesh) {
            self.current_mesh = ObjectId::NULL;
        }
        self.potential_meshes
            .retain(|&id| manager.is_object_safe(id));
    }
}

/// A placed 3D entity; `Object3d` is the same state under its own class id.
pub struct Entity3d {
    class: ClassId,
    core: ObjectCore,
    pub entity: Entity3dState,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Entity3d {
        class: ClassId::Entity3d,
        core: ObjectCore::new(id, name),
        entity: Entity3dState::default(),
    })
}

pub(crate) fn create_object3d(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Entity3d {
        class: ClassId::Object3d,
        core: ObjectCore::new(id, name),
        entity: Entity3dState::default(),
    })
}

impl Entity3d {
    pub fn current_mesh(&self) -> ObjectId {
        self.entity.current_mesh
    }

    pub fn set_current_mesh(&mut self, mesh: ObjectId) {
        self.entity.current_mesh = mesh;
        if !mesh.is_null() && !self.entity.potential_meshes.contains(&mesh) {
            self.entity.potential_meshes.push(mesh);
        }
    }

    pub fn potential_meshes(&self) -> &[ObjectId] {
        &self.entity.potential_meshes
    }

    pub fn world_matrix(&self) -> &VxMatrix {
        &self.entity.world_matrix
    }

    pub fn set_world_matrix(&mut self, matrix: VxMatrix) {
        self.entity.world_matrix = matrix;
    }
}

impl SceneObject for Entity3d {
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
        self.entity.save_state(chunk)?;
        chunk.set_class_id(self.class);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;
        self.entity.load_state(chunk)
    }

    fn check_post_deletion(&mut self, manager: &ObjectManager) {
        self.entity.drop_dangling(manager);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
