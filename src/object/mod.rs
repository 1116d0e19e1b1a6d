//! Object identity and the persisted-object trait.

pub mod manager;
pub mod registry;

#[cfg(test)]
mod tests;

use std::any::Any;

use bitflags::bitflags;

use crate::chunk::StateChunk;
use crate::context::IoEnv;
use crate::ChunkError;
use manager::ObjectManager;
use registry::ClassId;

/// Process-unique identity of a persisted object. 0 is the reserved "no
/// object" reference; live ids map to manager slots at a fixed offset.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub const NULL: ObjectId = ObjectId(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ObjectFlags: u32 {
        const TO_BE_DELETED = 0x0000_0010;
        const NOT_TO_BE_SAVED = 0x0000_0020;
        const VISIBLE = 0x0000_0040;
        /// Hidden because an ancestor is hidden; implies not visible.
        const HIERARCHICAL_HIDE = 0x1000_0000;
    }
}

/// Identifier tags of the base object state.
#[derive(Debug, Copy, Clone)]
#[repr(u32)]
pub enum ObjectTag {
    Hidden = 0x0000_0002,
    HierarchicallyHidden = 0x0000_0004,
}

impl From<ObjectTag> for u32 {
    fn from(tag: ObjectTag) -> u32 {
        tag as u32
    }
}

/// State shared by every persisted object: identity, display name, flags.
///
/// This is the root field group of the save/load chain; every concrete
/// class serializes it before its own data, so base tags always precede
/// derived tags in the stream.
#[derive(Debug)]
pub struct ObjectCore {
    pub id: ObjectId,
    pub name: Option<String>,
    pub flags: ObjectFlags,
}

impl ObjectCore {
    pub fn new(id: ObjectId, name: Option<&str>) -> Self {
        ObjectCore {
            id,
            name: name.map(str::to_owned),
            flags: ObjectFlags::VISIBLE,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(ObjectFlags::VISIBLE)
    }

    pub fn is_to_be_deleted(&self) -> bool {
        self.flags.contains(ObjectFlags::TO_BE_DELETED)
    }

    /// Visibility is persisted as the *absence* of data: a hidden object
    /// writes one empty tagged region, a hierarchically hidden one another,
    /// and a plainly visible object writes nothing at all.
    pub fn save_state(&self, chunk: &mut StateChunk<'_>) -> Result<(), ChunkError> {
        if self.flags.contains(ObjectFlags::HIERARCHICAL_HIDE) {
            chunk.write_identifier(ObjectTag::HierarchicallyHidden);
        } else if !self.flags.contains(ObjectFlags::VISIBLE) {
            chunk.write_identifier(ObjectTag::Hidden);
        }
        Ok(())
    }

    pub fn load_state(&mut self, chunk: &mut StateChunk<'_>) -> Result<(), ChunkError> {
        if chunk.seek_identifier(ObjectTag::Hidden) {
            self.flags
                .remove(ObjectFlags::VISIBLE | ObjectFlags::HIERARCHICAL_HIDE);
        } else if chunk.seek_identifier(ObjectTag::HierarchicallyHidden) {
            self.flags.remove(ObjectFlags::VISIBLE);
            self.flags.insert(ObjectFlags::HIERARCHICAL_HIDE);
        } else {
            self.flags.insert(ObjectFlags::VISIBLE);
            self.flags.remove(ObjectFlags::HIERARCHICAL_HIDE);
        }
        Ok(())
    }
}

/// A polymorphic persisted entity.
///
/// Objects reference each other only by [`ObjectId`], never by ownership;
/// resolution of a dangling id is a normal, cheap query. The deletion hooks
/// are called by the object manager's batch destroy protocol with the hooked
/// object temporarily moved out of its slot, so implementations may query
/// any *other* object through the manager.
pub trait SceneObject: Any {
    fn class_id(&self) -> ClassId;

    fn core(&self) -> &ObjectCore;
    fn core_mut(&mut self) -> &mut ObjectCore;

    /// Serialize into `chunk`, base field groups first. Implementations
    /// record their class id on the chunk once they have written data.
    fn save(&self, chunk: &mut StateChunk<'_>, env: &IoEnv<'_>) -> Result<(), ChunkError>;

    /// Deserialize from `chunk`. Missing tags leave the corresponding
    /// fields at their defaults; truncated data propagates as an error.
    fn load(&mut self, chunk: &mut StateChunk<'_>, env: &IoEnv<'_>) -> Result<(), ChunkError>;

    /// Last chance for an object being destroyed to clear its own outgoing
    /// references.
    fn pre_delete(&mut self, manager: &ObjectManager) {
        let _ = manager;
    }

    /// A batch destroy is underway and this object's class listens for one
    /// of the deleted classes; runs before any object is freed.
    fn check_pre_deletion(&mut self, manager: &ObjectManager) {
        let _ = manager;
    }

    /// The batch destroy finished; dangling ids can now be nulled.
    fn check_post_deletion(&mut self, manager: &ObjectManager) {
        let _ = manager;
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
