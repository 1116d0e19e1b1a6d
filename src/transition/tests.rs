use std::rc::Rc;

use crate::classes::mesh::Mesh;
use crate::common::types::{VxVector2, VxVector3};
use crate::object::manager::ObjectManager;
use crate::object::registry::{ClassId, ClassRegistry};
use crate::object::ObjectId;
use crate::transition::MeshTransition;
use crate::TransitionError;

fn manager() -> ObjectManager {
    ObjectManager::new(Rc::new(ClassRegistry::with_builtin_classes()))
}

/// Stage a unit quad split into two triangles: four corner positions, one
/// shared normal, four UVs, one material slot.
fn prepare_quad(transition: &mut MeshTransition, material: ObjectId) {
    let positions = transition.prepare_vertex_count(4);
    positions[0] = VxVector3::new(0.0, 0.0, 0.0);
    positions[1] = VxVector3::new(1.0, 0.0, 0.0);
    positions[2] = VxVector3::new(1.0, 1.0, 0.0);
    positions[3] = VxVector3::new(0.0, 1.0, 0.0);

    let normals = transition.prepare_normal_count(1);
    normals[0] = VxVector3::new(0.0, 0.0, 1.0);

    let uvs = transition.prepare_uv_count(4);
    uvs[0] = VxVector2::new(0.0, 0.0);
    uvs[1] = VxVector2::new(1.0, 0.0);
    uvs[2] = VxVector2::new(1.0, 1.0);
    uvs[3] = VxVector2::new(0.0, 1.0);

    transition.prepare_material_slot_count(1)[0] = material;

    transition.prepare_face_count(2);
    transition
        .face_vertex_indices_mut()
        .copy_from_slice(&[0, 1, 2, 0, 2, 3]);
    transition.face_normal_indices_mut().fill(0);
    transition
        .face_uv_indices_mut()
        .copy_from_slice(&[0, 1, 2, 0, 2, 3]);
    transition.face_material_slots_mut().fill(0);
}

#[test]
fn quad_welds_shared_corners() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);
    transition.parse(&mut manager, mesh_id).expect("parse");

    let mesh = manager.get_as::<Mesh>(mesh_id).unwrap();
    // six corners collapse onto four welded vertices
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.face_count(), 2);
    assert_eq!(mesh.material_slot_count(), 1);
    assert_eq!(mesh.material_slots(), &[material]);

    // the shared edge (corners 0 and 2) resolves to the same indices in
    // both triangles
    let indices = mesh.face_indices();
    assert_eq!(indices[0], indices[3]);
    assert_eq!(indices[2], indices[4]);
    // and every index addresses a welded vertex
    assert!(indices.iter().all(|&i| (i as usize) < 4));
}

#[test]
fn one_bit_normal_difference_splits_the_vertex() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);

    // two normals differing in exactly one mantissa bit
    let normals = transition.prepare_normal_count(2);
    normals[0] = VxVector3::new(0.0, 0.0, 1.0);
    normals[1] = VxVector3::new(0.0, 0.0, f32::from_bits(1.0f32.to_bits() | 1));

    // the second triangle reads its shared corners through normal 1
    transition
        .face_normal_indices_mut()
        .copy_from_slice(&[0, 0, 0, 1, 1, 1]);

    transition.parse(&mut manager, mesh_id).expect("parse");

    let mesh = manager.get_as::<Mesh>(mesh_id).unwrap();
    // corners 0 and 2 exist twice now: once per normal, no epsilon fuzz
    assert_eq!(mesh.vertex_count(), 6);
}

#[test]
fn overflow_leaves_the_destination_untouched() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    // give the destination recognizable prior content
    {
        let mesh = manager.get_as_mut::<Mesh>(mesh_id).unwrap();
        mesh.set_vertex_count(3);
        mesh.set_face_count(1);
        mesh.set_material_slot_count(1);
    }

    // 70,000 distinct corners exceed the 16-bit index range
    const CORNERS: usize = 70_000;
    let faces = CORNERS / 3 + 1;
    let padded = faces * 3;

    let mut transition = MeshTransition::new();
    let positions = transition.prepare_vertex_count(padded);
    for (i, p) in positions.iter_mut().enumerate() {
        *p = VxVector3::new(i as f32, 0.0, 0.0);
    }
    transition.prepare_normal_count(1);
    transition.prepare_uv_count(1);
    transition.prepare_material_slot_count(1)[0] = material;
    transition.prepare_face_count(faces);
    for (i, v) in transition.face_vertex_indices_mut().iter_mut().enumerate() {
        *v = i as u32;
    }

    let result = transition.parse(&mut manager, mesh_id);
    assert!(matches!(result, Err(TransitionError::VertexOverflow(_))));

    let mesh = manager.get_as::<Mesh>(mesh_id).unwrap();
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.face_count(), 1);
    assert_eq!(mesh.material_slot_count(), 1);
}

#[test]
fn parse_requires_every_prepare_call() {
    let mut manager = manager();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    transition.prepare_vertex_count(3);
    transition.prepare_normal_count(1);
    transition.prepare_uv_count(1);
    transition.prepare_face_count(1);
    // material slots were never prepared
    assert_eq!(
        transition.parse(&mut manager, mesh_id),
        Err(TransitionError::NotPrepared)
    );
}

#[test]
fn parse_rejects_non_mesh_destinations() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let not_a_mesh = manager.create_object(ClassId::Group, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);
    assert_eq!(
        transition.parse(&mut manager, not_a_mesh),
        Err(TransitionError::NotAMesh)
    );
}

#[test]
#[should_panic(expected = "already parsed")]
fn parse_twice_panics() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);
    transition.parse(&mut manager, mesh_id).expect("first parse");
    let _ = transition.parse(&mut manager, mesh_id);
}

#[test]
#[should_panic(expected = "already parsed")]
fn prepare_after_parse_panics() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);
    transition.parse(&mut manager, mesh_id).expect("parse");
    transition.prepare_vertex_count(1);
}

#[test]
fn dead_material_handles_degrade_to_null_slots() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let impostor = manager.create_object(ClassId::Group, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);
    let slots = transition.prepare_material_slot_count(3);
    slots[0] = material;
    slots[1] = impostor; // wrong class
    slots[2] = ObjectId(4242); // dangling

    transition.parse(&mut manager, mesh_id).expect("parse");

    let mesh = manager.get_as::<Mesh>(mesh_id).unwrap();
    assert_eq!(
        mesh.material_slots(),
        &[material, ObjectId::NULL, ObjectId::NULL]
    );
}

/// The end-to-end scenario: a unit quad with one shared normal, four UVs,
/// one material slot and two triangles.
#[test]
fn quad_end_to_end() {
    let mut manager = manager();
    let material = manager.create_object(ClassId::Material, None).unwrap();
    let mesh_id = manager.create_object(ClassId::Mesh, None).unwrap();

    let mut transition = MeshTransition::new();
    prepare_quad(&mut transition, material);
    transition.parse(&mut manager, mesh_id).expect("parse");

    let mesh = manager.get_as::<Mesh>(mesh_id).unwrap();
    assert_eq!(mesh.vertex_count(), 4);
    assert_eq!(mesh.face_count(), 2);
    assert_eq!(mesh.material_slot_count(), 1);
    for face in 0..2 {
        for corner in 0..3 {
            let index = mesh.face_indices()[face * 3 + corner] as usize;
            assert!(index < 4);
        }
        assert_eq!(mesh.face_material_slots()[face], 0);
    }
}
