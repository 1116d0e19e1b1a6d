use crate::bitmap::handler::{BitmapProperties, ImageCodecRegistry};
use crate::bitmap::TextureSaveOptions;
use crate::chunk::StateChunk;
use crate::classes::camera::{Camera, ProjectionType};
use crate::classes::group::Group;
use crate::classes::light::{Light, LightType};
use crate::classes::material::Material;
use crate::classes::mesh::Mesh;
use crate::common::path::PathManager;
use crate::common::types::{VxColor, VxVector2, VxVector3};
use crate::context::{Context, IoEnv};
use crate::object::registry::ClassId;
use crate::object::{ObjectFlags, ObjectId, SceneObject};

fn with_env(f: impl FnOnce(&IoEnv<'_>)) {
    let codecs = ImageCodecRegistry::new();
    let paths = PathManager::new();
    let env = IoEnv {
        codecs: &codecs,
        paths: &paths,
        global_texture_save_options: TextureSaveOptions::RawData,
        global_texture_save_format: BitmapProperties::default(),
        manager: None,
    };
    f(&env);
}

/// Save an object into a fresh chunk and feed the chunk to `target`.
fn roundtrip(source: &dyn SceneObject, target: &mut dyn SceneObject, env: &IoEnv<'_>) {
    let mut chunk = StateChunk::new(None);
    chunk.start_write();
    source.save(&mut chunk, env).expect("save");
    chunk.stop_write();

    assert_eq!(chunk.class_id(), source.class_id());

    chunk.start_read();
    target.load(&mut chunk, env).expect("load");
    chunk.stop_read();
}

#[test]
fn hidden_state_roundtrips() {
    with_env(|env| {
        let mut ctx = Context::new();
        let hidden = ctx.create_object3d(Some("hidden")).unwrap();
        let obj = ctx.manager_mut().get_mut(hidden).unwrap();
        obj.core_mut().flags.remove(ObjectFlags::VISIBLE);

        let mut ctx2 = Context::new();
        let restored = ctx2.create_object3d(None).unwrap();

        roundtrip(
            ctx.manager().get(hidden).unwrap(),
            ctx2.manager_mut().get_mut(restored).unwrap(),
            env,
        );
        assert!(!ctx2.manager().get(restored).unwrap().core().is_visible());
    });
}

#[test]
fn group_members_roundtrip() {
    with_env(|env| {
        let mut ctx = Context::new();
        let group_id = ctx.create_group(Some("walls")).unwrap();
        let a = ctx.create_object3d(None).unwrap();
        let b = ctx.create_object3d(None).unwrap();
        {
            let group = ctx.manager_mut().get_as_mut::<Group>(group_id).unwrap();
            group.add_object(a);
            group.add_object(b);
        }

        let mut ctx2 = Context::new();
        let restored = ctx2.create_group(None).unwrap();
        roundtrip(
            ctx.manager().get(group_id).unwrap(),
            ctx2.manager_mut().get_mut(restored).unwrap(),
            env,
        );

        // unbound chunks carry raw ids; without a manager no filtering runs
        let group = ctx2.manager().get_as::<Group>(restored).unwrap();
        assert_eq!(group.members(), &[a, b]);
    });
}

#[test]
fn light_fields_roundtrip_including_power_tag() {
    with_env(|env| {
        let mut ctx = Context::new();
        let light_id = ctx.create_light(Some("spot")).unwrap();
        {
            let light = ctx.manager_mut().get_as_mut::<Light>(light_id).unwrap();
            light.set_light_type(LightType::Spot);
            light.data.color = VxColor::new(1.0, 0.5, 0.25, 1.0);
            light.data.range = 123.0;
            light.data.falloff = 2.0;
            light.set_power(3.5);
        }

        let mut ctx2 = Context::new();
        let restored_id = ctx2.create_light(None).unwrap();
        roundtrip(
            ctx.manager().get(light_id).unwrap(),
            ctx2.manager_mut().get_mut(restored_id).unwrap(),
            env,
        );

        let restored = ctx2.manager().get_as::<Light>(restored_id).unwrap();
        assert_eq!(restored.light_type(), LightType::Spot);
        assert_eq!(restored.data.range, 123.0);
        assert_eq!(restored.data.falloff, 2.0);
        assert_eq!(restored.power(), 3.5);
    });
}

#[test]
fn default_power_writes_no_region() {
    with_env(|env| {
        let mut ctx = Context::new();
        let light_id = ctx.create_light(None).unwrap();

        let mut chunk = StateChunk::new(None);
        chunk.start_write();
        ctx.manager()
            .get(light_id)
            .unwrap()
            .save(&mut chunk, env)
            .unwrap();
        chunk.stop_write();

        chunk.start_read();
        let tags: Vec<u32> = chunk
            .identifier_profile()
            .iter()
            .map(|p| p.identifier)
            .collect();
        chunk.stop_read();
        // power stays at its default, so only main data regions exist
        assert!(!tags.contains(&0x0000_0400));
    });
}

#[test]
fn out_of_range_light_type_resets_to_point() {
    with_env(|env| {
        // craft a main-data region carrying a type value outside the set
        let mut chunk = StateChunk::new(None);
        chunk.start_write();
        chunk.write_identifier(0x0000_0200u32);
        chunk.write_struct(&(0x0000_0100u32 | 0x7F));
        chunk.write_struct(&VxColor::new(1.0, 1.0, 1.0, 1.0));
        chunk.write_struct(&1.0f32);
        chunk.write_struct(&0.0f32);
        chunk.write_struct(&0.0f32);
        chunk.write_struct(&100.0f32);
        chunk.stop_write();

        let mut ctx = Context::new();
        let light_id = ctx.create_light(None).unwrap();
        chunk.start_read();
        ctx.manager_mut()
            .get_mut(light_id)
            .unwrap()
            .load(&mut chunk, env)
            .unwrap();
        chunk.stop_read();

        assert_eq!(
            ctx.manager().get_as::<Light>(light_id).unwrap().light_type(),
            LightType::Point
        );
    });
}

#[test]
fn camera_target_only_persists_for_targeted_class() {
    with_env(|env| {
        let mut ctx = Context::new();
        let plain = ctx.create_camera(None).unwrap();
        let targeted = ctx.create_target_camera(None).unwrap();
        let subject = ctx.create_object3d(None).unwrap();
        ctx.manager_mut()
            .get_as_mut::<Camera>(plain)
            .unwrap()
            .set_target(subject);
        ctx.manager_mut()
            .get_as_mut::<Camera>(targeted)
            .unwrap()
            .set_target(subject);

        let mut ctx2 = Context::new();
        let plain2 = ctx2.create_camera(None).unwrap();
        let targeted2 = ctx2.create_target_camera(None).unwrap();
        roundtrip(
            ctx.manager().get(plain).unwrap(),
            ctx2.manager_mut().get_mut(plain2).unwrap(),
            env,
        );
        roundtrip(
            ctx.manager().get(targeted).unwrap(),
            ctx2.manager_mut().get_mut(targeted2).unwrap(),
            env,
        );

        assert_eq!(
            ctx2.manager().get_as::<Camera>(plain2).unwrap().target(),
            ObjectId::NULL
        );
        assert_eq!(
            ctx2.manager().get_as::<Camera>(targeted2).unwrap().target(),
            subject
        );
    });
}

#[test]
fn camera_projection_roundtrips() {
    with_env(|env| {
        let mut ctx = Context::new();
        let id = ctx.create_camera(None).unwrap();
        {
            let camera = ctx.manager_mut().get_as_mut::<Camera>(id).unwrap();
            camera.set_projection(ProjectionType::Orthographic);
            camera.set_orthographic_zoom(4.0);
            camera.set_planes(0.5, 900.0);
        }

        let mut ctx2 = Context::new();
        let restored_id = ctx2.create_camera(None).unwrap();
        roundtrip(
            ctx.manager().get(id).unwrap(),
            ctx2.manager_mut().get_mut(restored_id).unwrap(),
            env,
        );

        let restored = ctx2.manager().get_as::<Camera>(restored_id).unwrap();
        assert_eq!(restored.projection(), ProjectionType::Orthographic);
        assert_eq!(restored.orthographic_zoom(), 4.0);
        assert_eq!(restored.front_plane(), 0.5);
        assert_eq!(restored.back_plane(), 900.0);
    });
}

#[test]
fn material_roundtrips() {
    with_env(|env| {
        let mut ctx = Context::new();
        let id = ctx.create_material(Some("metal")).unwrap();
        let texture = ctx.create_texture(None).unwrap();
        {
            let material = ctx.manager_mut().get_as_mut::<Material>(id).unwrap();
            material.diffuse = VxColor::new(0.2, 0.4, 0.6, 1.0);
            material.specular_power = 16.0;
            material.two_sided = true;
            material.set_texture(texture);
        }

        let mut ctx2 = Context::new();
        let restored_id = ctx2.create_material(None).unwrap();
        roundtrip(
            ctx.manager().get(id).unwrap(),
            ctx2.manager_mut().get_mut(restored_id).unwrap(),
            env,
        );

        let restored = ctx2.manager().get_as::<Material>(restored_id).unwrap();
        assert_eq!(restored.diffuse, VxColor::new(0.2, 0.4, 0.6, 1.0));
        assert_eq!(restored.specular_power, 16.0);
        assert!(restored.two_sided);
        assert_eq!(restored.texture(), texture);
    });
}

#[test]
fn mesh_geometry_roundtrips() {
    with_env(|env| {
        let mut ctx = Context::new();
        let id = ctx.create_mesh(Some("quad")).unwrap();
        {
            let mesh = ctx.manager_mut().get_as_mut::<Mesh>(id).unwrap();
            mesh.set_vertex_count(3);
            mesh.positions_mut()[1] = VxVector3::new(1.0, 0.0, 0.0);
            mesh.positions_mut()[2] = VxVector3::new(0.0, 1.0, 0.0);
            mesh.normals_mut().fill(VxVector3::new(0.0, 0.0, 1.0));
            mesh.uvs_mut()[2] = VxVector2::new(1.0, 1.0);
            mesh.set_face_count(1);
            mesh.face_indices_mut().copy_from_slice(&[0, 1, 2]);
            mesh.set_material_slot_count(1);
        }

        let mut ctx2 = Context::new();
        let restored_id = ctx2.create_mesh(None).unwrap();
        roundtrip(
            ctx.manager().get(id).unwrap(),
            ctx2.manager_mut().get_mut(restored_id).unwrap(),
            env,
        );

        let restored = ctx2.manager().get_as::<Mesh>(restored_id).unwrap();
        assert_eq!(restored.vertex_count(), 3);
        assert_eq!(restored.face_count(), 1);
        assert_eq!(restored.material_slot_count(), 1);
        assert_eq!(restored.positions()[2], VxVector3::new(0.0, 1.0, 0.0));
        assert_eq!(restored.normals()[0], VxVector3::new(0.0, 0.0, 1.0));
        assert_eq!(restored.uvs()[2], VxVector2::new(1.0, 1.0));
        assert_eq!(restored.face_indices(), &[0, 1, 2]);
    });
}

/// Saving, loading and saving again must produce byte-identical chunks
/// when nothing mutates in between.
#[test]
fn save_load_save_is_idempotent() {
    with_env(|env| {
        let mut ctx = Context::new();
        let light_id = ctx.create_light(Some("key")).unwrap();
        {
            let light = ctx.manager_mut().get_as_mut::<Light>(light_id).unwrap();
            light.set_light_type(LightType::Directional);
            light.set_power(2.0);
        }

        let mut first = StateChunk::new(None);
        first.start_write();
        ctx.manager()
            .get(light_id)
            .unwrap()
            .save(&mut first, env)
            .unwrap();
        first.stop_write();

        let mut ctx2 = Context::new();
        let restored = ctx2.create_light(None).unwrap();
        first.start_read();
        ctx2.manager_mut()
            .get_mut(restored)
            .unwrap()
            .load(&mut first, env)
            .unwrap();
        first.stop_read();

        let mut second = StateChunk::new(None);
        second.start_write();
        ctx2.manager()
            .get(restored)
            .unwrap()
            .save(&mut second, env)
            .unwrap();
        second.stop_write();

        assert_eq!(first.to_bytes(), second.to_bytes());
    });
}

#[test]
fn class_ids_match_the_legacy_numbering() {
    assert_eq!(u8::from(ClassId::Object), 1);
    assert_eq!(u8::from(ClassId::Group), 23);
    assert_eq!(u8::from(ClassId::Material), 30);
    assert_eq!(u8::from(ClassId::Texture), 31);
    assert_eq!(u8::from(ClassId::Mesh), 32);
    assert_eq!(u8::from(ClassId::Entity3d), 33);
    assert_eq!(u8::from(ClassId::TargetCamera), 35);
    assert_eq!(u8::from(ClassId::TargetLight), 39);
    assert_eq!(u8::from(ClassId::Object3d), 41);
}
