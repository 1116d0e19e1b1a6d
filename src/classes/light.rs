//! Lights, including the targeted variant.

use std::any::Any;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::chunk::StateChunk;
use crate::common::types::VxColor;
use crate::context::IoEnv;
use crate::object::manager::ObjectManager;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

use super::entity::Entity3dState;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum LightTag {
    MainData = 0x0000_0200,
    Power = 0x0000_0400,
    Target = 0x0000_0800,
}

impl From<LightTag> for u32 {
    fn from(tag: LightTag) -> u32 {
        tag as u32
    }
}

/// Light type, stored in the lowest byte of the packed type+flags dword.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum LightType {
    Point = 1,
    Spot = 2,
    Directional = 3,
    Parallel = 4,
}

/// Photometric state shared by both light classes.
#[derive(Debug)]
pub struct LightState {
    pub light_type: LightType,
    pub color: VxColor,
    pub attenuation0: f32,
    pub attenuation1: f32,
    pub attenuation2: f32,
    pub range: f32,
    pub inner_spot_cone: f32,
    pub outer_spot_cone: f32,
    pub falloff: f32,
}

impl Default for LightState {
    fn default() -> Self {
        LightState {
            light_type: LightType::Point,
            color: VxColor::new(1.0, 1.0, 1.0, 1.0),
            attenuation0: 1.0,
            attenuation1: 0.0,
            attenuation2: 0.0,
            range: 5000.0,
            inner_spot_cone: 0.3,
            outer_spot_cone: 0.5,
            falloff: 1.0,
        }
    }
}

/// Runtime flags sharing the packed dword with the light type; the lowest
/// byte stays clear for the type itself.
const LIGHT_FLAGS_ACTIVE: u32 = 0x0000_0100;

pub struct Light {
    class: ClassId,
    core: ObjectCore,
    pub entity: Entity3dState,
    pub data: LightState,
    flags: u32,
    power: f32,
    target: ObjectId,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Light::new(ClassId::Light, id, name))
}

pub(crate) fn create_targeted(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Light::new(ClassId::TargetLight, id, name))
}

impl Light {
    fn new(class: ClassId, id: ObjectId, name: Option<&str>) -> Self {
        Light {
            class,
            core: ObjectCore::new(id, name),
            entity: Entity3dState::default(),
            data: LightState::default(),
            flags: LIGHT_FLAGS_ACTIVE,
            power: 1.0,
            target: ObjectId::NULL,
        }
    }

    pub fn light_type(&self) -> LightType {
        self.data.light_type
    }

    pub fn set_light_type(&mut self, light_type: LightType) {
        self.data.light_type = light_type;
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn set_power(&mut self, power: f32) {
        self.power = power;
    }

    pub fn target(&self) -> ObjectId {
        self.target
    }

    pub fn set_target(&mut self, target: ObjectId) {
        if target == self.core.id {
            return;
        }
        self.target = target;
    }
}

impl SceneObject for Light {
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

        chunk.write_identifier(LightTag::MainData);
        // the lowest byte of the flags dword is free, so it carries the type
        let packed = (self.flags & 0xFFFF_FF00) | (u32::from(self.data.light_type) & 0xFF);
        chunk.write_struct(&packed);
        chunk.write_struct(&self.data.color);
        chunk.write_struct(&self.data.attenuation0);
        chunk.write_struct(&self.data.attenuation1);
        chunk.write_struct(&self.data.attenuation2);
        chunk.write_struct(&self.data.range);
        if self.data.light_type == LightType::Spot {
            chunk.write_struct(&self.data.outer_spot_cone);
            chunk.write_struct(&self.data.inner_spot_cone);
            chunk.write_struct(&self.data.falloff);
        }

        // power is worth a region only when it deviates from the default
        if self.power != 1.0 {
            chunk.write_identifier(LightTag::Power);
            chunk.write_struct(&self.power);
        }

        if self.class == ClassId::TargetLight {
            chunk.write_identifier(LightTag::Target);
            chunk.write_object_id(self.target);
        }

        chunk.set_class_id(self.class);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;
        self.entity.load_state(chunk)?;

        if chunk.seek_identifier(LightTag::MainData) {
            let packed = chunk.read_struct::<u32>()?;
            self.flags = packed & 0xFFFF_FF00;
            // a persisted type outside the closed set resets to the default
            self.data.light_type =
                LightType::try_from(packed & 0xFF).unwrap_or(LightType::Point);
            self.data.color = chunk.read_struct::<VxColor>()?;
            self.data.attenuation0 = chunk.read_struct::<f32>()?;
            self.data.attenuation1 = chunk.read_struct::<f32>()?;
            self.data.attenuation2 = chunk.read_struct::<f32>()?;
            self.data.range = chunk.read_struct::<f32>()?;
            if self.data.light_type == LightType::Spot {
                self.data.outer_spot_cone = chunk.read_struct::<f32>()?;
                self.data.inner_spot_cone = chunk.read_struct::<f32>()?;
                self.data.falloff = chunk.read_struct::<f32>()?;
            }
        }

        if chunk.seek_identifier(LightTag::Power) {
            self.power = chunk.read_struct::<f32>()?;
        } else {
            self.power = 1.0;
        }

        if self.class == ClassId::TargetLight && chunk.seek_identifier(LightTag::Target) {
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
