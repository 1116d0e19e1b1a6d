use crate::classes::group::Group;
use crate::classes::light::{Light, LightType};
use crate::classes::mesh::Mesh;
use crate::common::types::{Guid, VxVector3};
use crate::context::Context;
use crate::file::{FileReader, FileWriter, FileWriteMode, FILE_VERSION};
use crate::object::registry::ClassId;
use crate::object::{ObjectFlags, ObjectId};
use crate::FileError;

/// A small scene: a group holding a lit 3d object with a mesh, plus a
/// targeted light pointing at the object.
fn build_scene(ctx: &mut Context) -> (ObjectId, ObjectId, ObjectId, ObjectId) {
    let group_id = ctx.create_group(Some("room")).unwrap();
    let object_id = ctx.create_object3d(Some("table")).unwrap();
    let mesh_id = ctx.create_mesh(Some("table.mesh")).unwrap();
    let light_id = ctx.create_target_light(Some("lamp")).unwrap();

    {
        let mesh = ctx.manager_mut().get_as_mut::<Mesh>(mesh_id).unwrap();
        mesh.set_vertex_count(3);
        mesh.positions_mut()[1] = VxVector3::new(1.0, 0.0, 0.0);
        mesh.positions_mut()[2] = VxVector3::new(0.0, 0.0, 1.0);
        mesh.set_face_count(1);
        mesh.face_indices_mut().copy_from_slice(&[0, 1, 2]);
    }
    {
        let group = ctx.manager_mut().get_as_mut::<Group>(group_id).unwrap();
        group.add_object(object_id);
        group.add_object(light_id);
    }
    {
        let light = ctx.manager_mut().get_as_mut::<Light>(light_id).unwrap();
        light.set_light_type(LightType::Spot);
        light.set_target(object_id);
        light.set_power(2.5);
    }

    (group_id, object_id, mesh_id, light_id)
}

fn save_scene(ctx: &Context, mode: FileWriteMode) -> Vec<u8> {
    let mut writer = FileWriter::new();
    writer.set_write_mode(mode);
    writer.add_all_objects(ctx);
    writer.save(ctx).expect("save")
}

#[test]
fn header_fields_survive_the_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut ctx = Context::new();
    build_scene(&mut ctx);
    let image = save_scene(&ctx, FileWriteMode::empty());

    let reader = FileReader::shallow_load(&image).expect("shallow load");
    let info = reader.file_info();
    assert_eq!(info.file_version, FILE_VERSION);
    assert_eq!(info.object_count, 4);
    assert_eq!(info.manager_count, 0);
    assert_eq!(info.max_id_saved, 4);
    // stored raw: pack and unpack sizes agree
    assert_eq!(info.hdr1_pack_size, info.hdr1_unpack_size);
    assert_eq!(info.data_pack_size, info.data_unpack_size);

    let names: Vec<_> = reader
        .objects()
        .iter()
        .map(|o| o.name.as_deref().unwrap_or(""))
        .collect();
    assert_eq!(names, vec!["room", "table", "table.mesh", "lamp"]);
}

#[test]
fn deep_load_rebuilds_the_scene_with_remapped_references() {
    let mut ctx = Context::new();
    let (_, object_id, mesh_id, _) = build_scene(&mut ctx);
    let image = save_scene(&ctx, FileWriteMode::empty());

    // pre-occupy a slot in the destination so every created id differs
    // from the saved ones
    let mut restored = Context::new();
    let placeholder = restored.create_material(Some("placeholder")).unwrap();

    let mut reader = FileReader::shallow_load(&image).expect("shallow load");
    reader.deep_load(&mut restored).expect("deep load");

    assert_eq!(restored.group_count(), 1);
    assert_eq!(restored.object3d_count(), 1);
    assert_eq!(restored.mesh_count(), 1);
    assert_eq!(restored.target_light_count(), 1);

    let new_group = restored.group(0).unwrap();
    let new_object = restored.object3d(0).unwrap();
    let new_mesh = restored.mesh(0).unwrap();
    let new_light = restored.target_light(0).unwrap();

    // created ids shifted, so resolving through raw saved ids must not
    // have happened anywhere
    assert_ne!(new_object, object_id);
    assert_ne!(new_mesh, mesh_id);
    assert_ne!(new_group, placeholder);

    let group = restored.manager().get_as::<Group>(new_group).unwrap();
    assert_eq!(group.members(), &[new_object, new_light]);

    let light = restored.manager().get_as::<Light>(new_light).unwrap();
    assert_eq!(light.target(), new_object);
    assert_eq!(light.light_type(), LightType::Spot);
    assert_eq!(light.power(), 2.5);

    let mesh = restored.manager().get_as::<Mesh>(new_mesh).unwrap();
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.face_indices(), &[0, 1, 2]);
}

#[test]
fn compressed_files_roundtrip() {
    let mut ctx = Context::new();
    build_scene(&mut ctx);
    let raw = save_scene(&ctx, FileWriteMode::empty());
    let packed = save_scene(&ctx, FileWriteMode::WHOLE_COMPRESSED);
    assert!(packed.len() < raw.len());

    let mut restored = Context::new();
    let mut reader = FileReader::shallow_load(&packed).expect("shallow load");
    assert_ne!(
        reader.file_info().data_pack_size,
        reader.file_info().data_unpack_size
    );
    reader.deep_load(&mut restored).expect("deep load");
    assert_eq!(restored.manager().object_count(), 4);
}

#[test]
fn unsaveable_objects_are_left_out() {
    let mut ctx = Context::new();
    let (_, object_id, _, _) = build_scene(&mut ctx);
    ctx.manager_mut()
        .get_mut(object_id)
        .unwrap()
        .core_mut()
        .flags
        .insert(ObjectFlags::NOT_TO_BE_SAVED);

    let image = save_scene(&ctx, FileWriteMode::empty());
    let reader = FileReader::shallow_load(&image).expect("shallow load");
    assert_eq!(reader.file_info().object_count, 3);
    assert!(reader
        .objects()
        .iter()
        .all(|o| o.class_id != u8::from(ClassId::Object3d) as u32));
}

#[test]
fn manager_data_roundtrips() {
    let mut ctx = Context::new();
    build_scene(&mut ctx);

    let guid = Guid::new(0x1111, 0x2222);
    let mut chunk = crate::chunk::StateChunk::new(None);
    chunk.start_write();
    chunk.write_struct(&0xC0FFEEu32);
    chunk.stop_write();

    let mut writer = FileWriter::new();
    writer.add_all_objects(&ctx);
    writer.add_manager_data(guid, &chunk);
    let image = writer.save(&ctx).expect("save");

    let reader = FileReader::shallow_load(&image).expect("shallow load");
    assert_eq!(reader.managers().len(), 1);
    assert_eq!(reader.managers()[0].guid, guid);

    let mut restored =
        crate::chunk::StateChunk::from_bytes(&reader.managers()[0].data, None).expect("chunk");
    restored.start_read();
    assert_eq!(restored.read_struct::<u32>().unwrap(), 0xC0FFEE);
    restored.stop_read();
}

#[test]
fn corrupted_files_are_rejected() {
    let mut ctx = Context::new();
    build_scene(&mut ctx);
    let image = save_scene(&ctx, FileWriteMode::empty());

    // bad magic
    let mut bad_magic = image.clone();
    bad_magic[0] = b'X';
    assert!(matches!(
        FileReader::shallow_load(&bad_magic),
        Err(FileError::InvalidMagicValue)
    ));

    // one flipped payload byte breaks the checksum
    let mut bad_body = image.clone();
    let last = bad_body.len() - 1;
    bad_body[last] ^= 0xFF;
    assert!(matches!(
        FileReader::shallow_load(&bad_body),
        Err(FileError::ChecksumMismatch { .. })
    ));

    // an unsupported version is refused before any table parsing
    let mut bad_version = image.clone();
    bad_version[16] = 99;
    assert!(matches!(
        FileReader::shallow_load(&bad_version),
        Err(FileError::UnsupportedFileVersion { .. })
    ));
}

#[test]
fn truncated_files_are_rejected() {
    let mut ctx = Context::new();
    build_scene(&mut ctx);
    let image = save_scene(&ctx, FileWriteMode::empty());

    assert!(FileReader::shallow_load(&image[..32]).is_err());
    assert!(FileReader::shallow_load(&image[..image.len() - 8]).is_err());
}
