//! Meshes: flat vertex attribute arrays, 16-bit indexed faces and the
//! material slot table.

use std::any::Any;

use crate::chunk::StateChunk;
use crate::common::types::{VxVector2, VxVector3};
use crate::context::IoEnv;
use crate::object::manager::ObjectManager;
use crate::object::registry::ClassId;
use crate::object::{ObjectCore, ObjectId, SceneObject};
use crate::ChunkError;

#[derive(Debug, Copy, Clone)]
#[repr(u32)]
enum MeshTag {
    Geometry = 0x0000_2000,
    MaterialSlots = 0x0000_4000,
}

impl From<MeshTag> for u32 {
    fn from(tag: MeshTag) -> u32 {
        tag as u32
    }
}

pub struct Mesh {
    core: ObjectCore,
    positions: Vec<VxVector3>,
    normals: Vec<VxVector3>,
    uvs: Vec<VxVector2>,
    /// Three entries per face.
    face_indices: Vec<u16>,
    /// One material slot index per face.
    face_material_slots: Vec<u16>,
    material_slots: Vec<ObjectId>,
}

pub(crate) fn create(id: ObjectId, name: Option<&str>) -> Box<dyn SceneObject> {
    Box::new(Mesh {
        core: ObjectCore::new(id, name),
        positions: Vec::new(),
        normals: Vec::new(),
        uvs: Vec::new(),
        face_indices: Vec::new(),
        face_material_slots: Vec::new(),
        material_slots: Vec::new(),
    })
}

impl Mesh {
    pub fn clean_mesh(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.uvs.clear();
        self.face_indices.clear();
        self.face_material_slots.clear();
        self.material_slots.clear();
    }

    pub fn set_vertex_count(&mut self, count: usize) {
        self.positions.resize(count, VxVector3::default());
        self.normals.resize(count, VxVector3::default());
        self.uvs.resize(count, VxVector2::default());
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn set_face_count(&mut self, count: usize) {
        self.face_indices.resize(count * 3, 0);
        self.face_material_slots.resize(count, 0);
    }

    pub fn face_count(&self) -> usize {
        self.face_material_slots.len()
    }

    pub fn set_material_slot_count(&mut self, count: usize) {
        self.material_slots.resize(count, ObjectId::NULL);
    }

    pub fn material_slot_count(&self) -> usize {
        self.material_slots.len()
    }

    pub fn positions(&self) -> &[VxVector3] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [VxVector3] {
        &mut self.positions
    }

    pub fn normals(&self) -> &[VxVector3] {
        &self.normals
    }

    pub fn normals_mut(&mut self) -> &mut [VxVector3] {
        &mut self.normals
    }

    pub fn uvs(&self) -> &[VxVector2] {
        &self.uvs
    }

    pub fn uvs_mut(&mut self) -> &mut [VxVector2] {
        &mut self.uvs
    }

    pub fn face_indices(&self) -> &[u16] {
        &self.face_indices
    }

    pub fn face_indices_mut(&mut self) -> &mut [u16] {
        &mut self.face_indices
    }

    pub fn face_material_slots(&self) -> &[u16] {
        &self.face_material_slots
    }

    pub fn face_material_slots_mut(&mut self) -> &mut [u16] {
        &mut self.face_material_slots
    }

    pub fn material_slots(&self) -> &[ObjectId] {
        &self.material_slots
    }

    pub fn material_slots_mut(&mut self) -> &mut [ObjectId] {
        &mut self.material_slots
    }
}

impl SceneObject for Mesh {
    fn class_id(&self) -> ClassId {
        ClassId::Mesh
    }

    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn save(&self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.save_state(chunk)?;

        chunk.write_identifier(MeshTag::Geometry);
        chunk.write_struct(&(self.vertex_count() as u32));
        chunk.write_struct(&(self.face_count() as u32));

        // attribute streams travel as packed buffers, not element by
        // element, to keep big meshes one copy each
        let mut raw = Vec::with_capacity(self.vertex_count() * 12);
        for v in &self.positions {
            raw.extend_from_slice(&v.x.to_le_bytes());
            raw.extend_from_slice(&v.y.to_le_bytes());
            raw.extend_from_slice(&v.z.to_le_bytes());
        }
        for v in &self.normals {
            raw.extend_from_slice(&v.x.to_le_bytes());
            raw.extend_from_slice(&v.y.to_le_bytes());
            raw.extend_from_slice(&v.z.to_le_bytes());
        }
        for v in &self.uvs {
            raw.extend_from_slice(&v.x.to_le_bytes());
            raw.extend_from_slice(&v.y.to_le_bytes());
        }
        for &i in &self.face_indices {
            raw.extend_from_slice(&i.to_le_bytes());
        }
        for &s in &self.face_material_slots {
            raw.extend_from_slice(&s.to_le_bytes());
        }
        chunk.write_buffer(&raw);

        chunk.write_identifier(MeshTag::MaterialSlots);
        chunk.write_object_sequence(&self.material_slots);

        chunk.set_class_id(ClassId::Mesh);
        Ok(())
    }

    fn load(&mut self, chunk: &mut StateChunk<'_>, _env: &IoEnv<'_>) -> Result<(), ChunkError> {
        self.core.load_state(chunk)?;

        if chunk.seek_identifier(MeshTag::Geometry) {
            let vertex_count = chunk.read_struct::<u32>()? as usize;
            let face_count = chunk.read_struct::<u32>()? as usize;
            let raw = chunk.read_buffer()?;

            let expected = vertex_count * (12 + 12 + 8) + face_count * (6 + 2);
            if raw.len() != expected {
                return Err(ChunkError::InvalidRegion {
                    reason: "mesh geometry buffer does not match its counts",
                });
            }

            self.set_vertex_count(vertex_count);
            self.set_face_count(face_count);

            let f = |raw: &[u8], at: usize| {
                f32::from_le_bytes(raw[at..at + 4].try_into().expect("exact size"))
            };
            let mut at = 0;
            for v in &mut self.positions {
                *v = VxVector3::new(f(&raw, at), f(&raw, at + 4), f(&raw, at + 8));
                at += 12;
            }
            for v in &mut self.normals {
                *v = VxVector3::new(f(&raw, at), f(&raw, at + 4), f(&raw, at + 8));
                at += 12;
            }
            for v in &mut self.uvs {
                *v = VxVector2::new(f(&raw, at), f(&raw, at + 4));
                at += 8;
            }
            for i in &mut self.face_indices {
                *i = u16::from_le_bytes(raw[at..at + 2].try_into().expect("exact size"));
                at += 2;
            }
            for s in &mut self.face_material_slots {
                *s = u16::from_le_bytes(raw[at..at + 2].try_into().expect("exact size"));
                at += 2;
            }
        }

        if chunk.seek_identifier(MeshTag::MaterialSlots) {
            self.material_slots = chunk.read_object_sequence()?;
        }
        Ok(())
    }

    fn check_post_deletion(&mut self, manager: &ObjectManager) {
        for slot in &mut self.material_slots {
            if !slot.is_null() && !manager.is_object_safe(*slot) {
                *slot = ObjectId::NULL;
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
