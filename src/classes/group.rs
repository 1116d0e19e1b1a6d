//! Groups: ordered collections of member object ids.

use std::any::Any;

use crate::chunk::StateChunk;
use crate::context::IoEnv;
use crate::object::manager::ObjectManager;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum GroupTag {
    Members = 0x0000_0010,
}

impl From<GroupTag> for u32 {
    fn from(tag: GroupTag) -> u32 {
        tag as u32
    }
}

pub struct Group {
    core: ObjectCore,
    members: Vec<ObjectId>,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Group {
        core: ObjectCore::new(id, name),
        members: Vec::new(),
    })
}

impl Group {
    pub fn members(&self) -> &[ObjectId] {
        &self.members
    }

    pub fn add_object(&mut self, id: ObjectId) -> bool {
        if id.is_null() || id == self.core.id || self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    pub fn remove_object(&mut self, id: ObjectId) {
        self.members.retain(|&member| member != id);
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn object_count(&self) -> usize {
        self.members.len()
    }

    pub fn object(&self, index: usize) -> Option<ObjectId> {
        self.members.get(index).copied()
    }
}

impl SceneObject for Group {
    fn class_id(&self) -> ClassId {
        ClassId::Group
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn save(&self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.save_state(chunk)?;

        chunk.write_identifier(GroupTag::Members);
        chunk.write_object_array(&self.members);

        chunk.set_class_id(ClassId::Group);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;

        self.clear();
        if chunk.seek_identifier(GroupTag::Members) {
            for id in chunk.read_object_array()? {
                if id.is_null() || id == self.core.id {
                    continue;
                }
                // with a live manager at hand, reject non-behavioral members
                if let Some(manager) = env.manager {
                    let keep = manager.get(id).is_some_and(|obj| {
                        manager
                            .registry()
                            .is_child_class_of(obj.class_id(), ClassId::BeObject)
                    });
                    if !keep {
                        continue;
                    }
                }
                self.members.push(id);
            }
        }
        Ok(())
    }

    /// A group must stop listing a soon-to-be-deleted member before anyone
    /// asks whether that member is referenced anywhere.
    fn check_pre_deletion(&mut self, manager: &ObjectManager) {
        self.members.retain(|&id| {
            manager
                .get(id)
                .is_some_and(|obj| !obj.core().is_to_be_deleted())
        });
    }

    fn pre_delete(&mut self, _manager: &ObjectManager) {
        self.members.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
