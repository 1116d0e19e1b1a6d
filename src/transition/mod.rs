//! The mesh transition engine: bulk geometry ingestion with vertex welding.
//!
//! An external producer (an interchange importer, a binding layer) fills the
//! staging arrays through the `prepare_*` calls, then `parse` welds
//! structurally identical corners into a compact indexed mesh and commits it
//! into a mesh object. This path bypasses the chunk format entirely; it
//! works on live objects.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use crate::classes::material::Material;
use crate::classes::mesh::Mesh;
use crate::common::types::{VxVector2, VxVector3};
use crate::object::manager::ObjectManager;
use crate::object::ObjectId;
use crate::TransitionError;

/// Welding key: the exact bit patterns of one corner's attributes. Two
/// corners are the same vertex only if all eight components are
/// bit-identical; there is no epsilon comparison.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct VertexKey {
    position: [u32; 3],
    normal: [u32; 3],
    uv: [u32; 2],
}

#[derive(Debug, Copy, Clone)]
struct WeldedVertex {
    position: VxVector3,
    normal: VxVector3,
    uv: VxVector2,
}

impl WeldedVertex {
    fn key(&self) -> VertexKey {
        VertexKey {
            position: [
                self.position.x.to_bits(),
                self.position.y.to_bits(),
                self.position.z.to_bits(),
            ],
            normal: [
                self.normal.x.to_bits(),
                self.normal.y.to_bits(),
                self.normal.z.to_bits(),
            ],
            uv: [self.uv.x.to_bits(), self.uv.y.to_bits()],
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct CompactFace {
    indices: [u32; 3],
    material_slot: u32,
}

/// Staging area for one bulk upload. All five `prepare_*_count` calls must
/// run before `parse`; `parse` runs at most once per instance.
pub struct MeshTransition {
    vertices: Vec<VxVector3>,
    normals: Vec<VxVector3>,
    uvs: Vec<VxVector2>,
    material_slots: Vec<ObjectId>,
    face_vertex_indices: Vec<u32>,
    face_normal_indices: Vec<u32>,
    face_uv_indices: Vec<u32>,
    face_material_slots: Vec<u32>,

    vertices_ready: bool,
    normals_ready: bool,
    uvs_ready: bool,
    material_slots_ready: bool,
    faces_ready: bool,
    parsed: bool,

    welded: Vec<WeldedVertex>,
    faces: Vec<CompactFace>,
}

impl MeshTransition {
    pub fn new() -> Self {
        MeshTransition {
            vertices: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            material_slots: Vec::new(),
            face_vertex_indices: Vec::new(),
            face_normal_indices: Vec::new(),
            face_uv_indices: Vec::new(),
            face_material_slots: Vec::new(),
            vertices_ready: false,
            normals_ready: false,
            uvs_ready: false,
            material_slots_ready: false,
            faces_ready: false,
            parsed: false,
            welded: Vec::new(),
            faces: Vec::new(),
        }
    }

    fn assert_not_parsed(&self) {
        assert!(
            !self.parsed,
            "mesh transition already parsed; prepare and parse are one-shot"
        );
    }

    /// Allocate the position staging array and expose it for direct fill.
    pub fn prepare_vertex_count(&mut self, count: usize) -> &mut [VxVector3] {
        self.assert_not_parsed();
        self.vertices.clear();
        self.vertices.resize(count, VxVector3::default());
        self.vertices_ready = true;
        &mut self.vertices
    }

    pub fn prepare_normal_count(&mut self, count: usize) -> &mut [VxVector3] {
        self.assert_not_parsed();
        self.normals.clear();
        self.normals.resize(count, VxVector3::default());
        self.normals_ready = true;
        &mut self.normals
    }

    pub fn prepare_uv_count(&mut self, count: usize) -> &mut [VxVector2] {
        self.assert_not_parsed();
        self.uvs.clear();
        self.uvs.resize(count, VxVector2::default());
        self.uvs_ready = true;
        &mut self.uvs
    }

    /// Material slots hold external object handles, resolved to live
    /// materials only at commit time.
    pub fn prepare_material_slot_count(&mut self, count: usize) -> &mut [ObjectId] {
        self.assert_not_parsed();
        self.material_slots.clear();
        self.material_slots.resize(count, ObjectId::NULL);
        self.material_slots_ready = true;
        &mut self.material_slots
    }

    /// Allocate the per-corner index arrays (three per face) and the
    /// per-face material slot array.
    pub fn prepare_face_count(&mut self, count: usize) {
        self.assert_not_parsed();
        self.face_vertex_indices.clear();
        self.face_vertex_indices.resize(count * 3, 0);
        self.face_normal_indices.clear();
        self.face_normal_indices.resize(count * 3, 0);
        self.face_uv_indices.clear();
        self.face_uv_indices.resize(count * 3, 0);
        self.face_material_slots.clear();
        self.face_material_slots.resize(count, 0);
        self.faces_ready = true;
    }

    pub fn face_vertex_indices_mut(&mut self) -> &mut [u32] {
        self.assert_not_parsed();
        &mut self.face_vertex_indices
    }

    pub fn face_normal_indices_mut(&mut self) -> &mut [u32] {
        self.assert_not_parsed();
        &mut self.face_normal_indices
    }

    pub fn face_uv_indices_mut(&mut self) -> &mut [u32] {
        self.assert_not_parsed();
        &mut self.face_uv_indices
    }

    pub fn face_material_slots_mut(&mut self) -> &mut [u32] {
        self.assert_not_parsed();
        &mut self.face_material_slots
    }

    /// Weld the staged corners and commit the compacted mesh into
    /// `mesh_id`. On any failure the destination mesh is left untouched.
    pub fn parse(
        &mut self,
        manager: &mut ObjectManager,
        mesh_id: ObjectId,
    ) -> Result<(), TransitionError> {
        self.assert_not_parsed();
        if !(self.vertices_ready
            && self.normals_ready
            && self.uvs_ready
            && self.material_slots_ready
            && self.faces_ready)
        {
            return Err(TransitionError::NotPrepared);
        }
        if manager.get_as::<Mesh>(mesh_id).is_none() {
            return Err(TransitionError::NotAMesh);
        }
        self.parsed = true;

        self.weld();

        // the destination format uses 16-bit indices
        if self.welded.len() > u16::MAX as usize {
            return Err(TransitionError::VertexOverflow(self.welded.len()));
        }
        if self.material_slots.len() > u16::MAX as usize {
            return Err(TransitionError::MaterialSlotOverflow(self.material_slots.len()));
        }

        self.apply_to_mesh(manager, mesh_id);
        Ok(())
    }

    /// The welding pass. An ordered map keyed on exact bit patterns gives a
    /// guaranteed O(log n) per corner instead of a hash table's worst case;
    /// predictability wins over best-case speed on large meshes.
    fn weld(&mut self) {
        let face_count = self.face_material_slots.len();
        self.welded.reserve(face_count * 3);
        self.faces.reserve(face_count);

        let mut dedup: BTreeMap<VertexKey, u32> = BTreeMap::new();
        for face in 0..face_count {
            let mut indices = [0u32; 3];
            for (corner, index) in indices.iter_mut().enumerate() {
                let at = face * 3 + corner;
                let candidate = WeldedVertex {
                    position: self.vertices[self.face_vertex_indices[at] as usize],
                    normal: self.normals[self.face_normal_indices[at] as usize],
                    uv: self.uvs[self.face_uv_indices[at] as usize],
                };
                *index = *dedup.entry(candidate.key()).or_insert_with(|| {
                    self.welded.push(candidate);
                    self.welded.len() as u32 - 1
                });
            }
            self.faces.push(CompactFace {
                indices,
                material_slot: self.face_material_slots[face],
            });
        }
    }

    fn apply_to_mesh(&self, manager: &mut ObjectManager, mesh_id: ObjectId) {
        // resolve the external material handles first; a dead or non-material
        // handle degrades to the null slot rather than failing the commit
        let resolved: Vec<ObjectId> = self
            .material_slots
            .iter()
            .map(|&id| {
                if manager.get_as::<Material>(id).is_some() {
                    id
                } else {
                    ObjectId::NULL
                }
            })
            .collect();

        let mesh = manager
            .get_as_mut::<Mesh>(mesh_id)
            .expect("destination checked before welding");

        mesh.clean_mesh();
        mesh.set_vertex_count(self.welded.len());
        mesh.set_face_count(self.faces.len());
        mesh.set_material_slot_count(resolved.len());

        // strided copy out of the interleaved welded records into the
        // mesh's parallel flat arrays
        for (dst, src) in mesh.positions_mut().iter_mut().zip(&self.welded) {
            *dst = src.position;
        }
        for (dst, src) in mesh.normals_mut().iter_mut().zip(&self.welded) {
            *dst = src.normal;
        }
        for (dst, src) in mesh.uvs_mut().iter_mut().zip(&self.welded) {
            *dst = src.uv;
        }

        for (face, compact) in self.faces.iter().enumerate() {
            let indices = mesh.face_indices_mut();
            indices[face * 3] = compact.indices[0] as u16;
            indices[face * 3 + 1] = compact.indices[1] as u16;
            indices[face * 3 + 2] = compact.indices[2] as u16;
            mesh.face_material_slots_mut()[face] = compact.material_slot as u16;
        }

        mesh.material_slots_mut().copy_from_slice(&resolved);
    }
}

impl Default for MeshTransition {
    fn default() -> Self {
        Self::new()
    }
}
