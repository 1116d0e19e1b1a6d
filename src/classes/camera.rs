//! Cameras, including the targeted variant that orients toward another
//! 3D entity.

use std::any::Any;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::chunk::StateChunk;
use crate::context::IoEnv;
use crate::object::manager::ObjectManager;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

use super::entity::Entity3dState;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum CameraTag {
    MainData = 0x0000_0080,
    Target = 0x0000_0100,
}

impl From<CameraTag> for u32 {
    fn from(tag: CameraTag) -> u32 {
        tag as u32
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ProjectionType {
    Perspective = 1,
    Orthographic = 2,
}

pub struct Camera {
    class: ClassId,
    core: ObjectCore,
    pub entity: Entity3dState,
    fov: f32,
    front_plane: f32,
    back_plane: f32,
    projection: ProjectionType,
    orthographic_zoom: f32,
    target: ObjectId,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Camera::new(ClassId::Camera, id, name))
}

pub(crate) fn create_targeted(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Camera::new(ClassId::TargetCamera, id, name))
}

impl Camera {
    fn new(class: ClassId, id: ObjectId, name: Option<&str>) -> Self {
        Camera {
            class,
            core: ObjectCore::new(id, name),
            entity: Entity3dState::default(),
            fov: 0.5,
            front_plane: 1.0,
            back_plane: 4000.0,
            projection: ProjectionType::Perspective,
            orthographic_zoom: 1.0,
            target: ObjectId::NULL,
        }
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
    }

    pub fn front_plane(&self) -> f32 {
        self.front_plane
    }

    pub fn back_plane(&self) -> f32 {
        self.back_plane
    }

    pub fn set_planes(&mut self, front: f32, back: f32) {
        self.front_plane = front;
        self.back_plane = back;
    }

    pub fn projection(&self) -> ProjectionType {
        self.projection
    }

    pub fn set_projection(&mut self, projection: ProjectionType) {
        self.projection = projection;
    }

    pub fn orthographic_zoom(&self) -> f32 {
        self.orthographic_zoom
    }

    pub fn set_orthographic_zoom(&mut self, zoom: f32) {
        self.orthographic_zoom = zoom;
    }

    pub fn target(&self) -> ObjectId {
        self.target
    }

    /// Only the targeted class persists or follows a target; the target can
    /// never be the camera itself.
    pub fn set_target(&mut self, target: ObjectId) {
        if target == self.core.id {
            return;
        }
        self.target = target;
    }
}

impl SceneObject for Camera {
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

        chunk.write_identifier(CameraTag::MainData);
        chunk.write_struct(&self.fov);
        chunk.write_struct(&self.front_plane);
        chunk.write_struct(&self.back_plane);
        chunk.write_struct(&u32::from(self.projection));
        chunk.write_struct(&self.orthographic_zoom);

        if self.class == ClassId::TargetCamera {
            chunk.write_identifier(CameraTag::Target);
            chunk.write_object_id(self.target);
        }

        chunk.set_class_id(self.class);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;
        self.entity.load_state(chunk)?;

        if chunk.seek_identifier(CameraTag::MainData) {
            self.fov = chunk.read_struct::<f32>()?;
            self.front_plane = chunk.read_struct::<f32>()?;
            self.back_plane = chunk.read_struct::<f32>()?;
            // unknown projection values fall back to perspective
            self.projection = ProjectionType::try_from(chunk.read_struct::<u32>()?)
                .unwrap_or(ProjectionType::Perspective);
            self.orthographic_zoom = chunk.read_struct::<f32>()?;
        }

        if self.class == ClassId::TargetCamera && chunk.seek_identifier(CameraTag::Target) {
            self.target = chunk.read_object_id()?;
        }
        Ok(())
    }

    fn pre_delete(&mut self, _manager: &ObjectManager) {
        self.target = ObjectId::NULL;
    }

    fn check_post_deletion(&mut self, manager: &ObjectManager) {
        self.entity.drop_dangling(manager);
        if !self.target.is_null() && !manager.is_object_safe(self.target) {
            self.target = ObjectId::NULL;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
