use std::rc::Rc;

use crate::classes::group::Group;
use crate::classes::light::Light;
use crate::object::manager::ObjectManager;
use crate::object::registry::{ClassId, ClassRegistry};
use crate::object::ObjectId;

fn manager() -> ObjectManager {
    ObjectManager::new(Rc::new(ClassRegistry::with_builtin_classes()))
}

#[test]
fn hierarchy_is_closed_over_parents() {
    let registry = ClassRegistry::with_builtin_classes();

    assert!(registry.is_child_class_of(ClassId::TargetLight, ClassId::Light));
    assert!(registry.is_child_class_of(ClassId::TargetLight, ClassId::Entity3d));
    assert!(registry.is_child_class_of(ClassId::TargetLight, ClassId::Object));
    assert!(registry.is_child_class_of(ClassId::Group, ClassId::BeObject));
    assert!(!registry.is_child_class_of(ClassId::Group, ClassId::Entity3d));
    assert!(!registry.is_child_class_of(ClassId::Light, ClassId::TargetLight));
}

#[test]
fn notify_closure_covers_derived_classes() {
    let registry = ClassRegistry::with_builtin_classes();

    // a group listens for every behavioral object, including derived ones
    assert!(registry.is_need_notify(ClassId::Group, ClassId::Mesh));
    assert!(registry.is_need_notify(ClassId::Group, ClassId::TargetLight));

    // a targeted light listens for 3d entities and everything under them
    assert!(registry.is_need_notify(ClassId::TargetLight, ClassId::Object3d));
    assert!(registry.is_need_notify(ClassId::TargetLight, ClassId::Entity3d));

    // a plain light does not
    assert!(!registry.is_need_notify(ClassId::Light, ClassId::Object3d));

    let mut deleted = vec![false; registry.class_count()];
    deleted[u8::from(ClassId::Object3d) as usize] = true;
    let notified = registry.all_notify_class_ids(&deleted);
    assert!(notified[u8::from(ClassId::TargetLight) as usize]);
    assert!(notified[u8::from(ClassId::TargetCamera) as usize]);
    assert!(!notified[u8::from(ClassId::Material) as usize]);
}

#[test]
fn created_objects_resolve_by_id() {
    let mut manager = manager();
    let id = manager
        .create_object(ClassId::Light, Some("sun"))
        .expect("create");

    let obj = manager.get(id).expect("live object");
    assert_eq!(obj.class_id(), ClassId::Light);
    assert_eq!(obj.core().name.as_deref(), Some("sun"));
    assert_eq!(obj.core().id, id);

    assert!(manager.get_as::<Light>(id).is_some());
    assert!(manager.get_as::<Group>(id).is_none());
    assert!(manager.is_object_safe(id));
    assert!(!manager.is_object_safe(ObjectId::NULL));
    assert!(!manager.is_object_safe(ObjectId(999)));
}

#[test]
fn freed_slots_are_reused_lifo_and_ids_stay_stable() {
    let mut manager = manager();
    let first = manager.create_object(ClassId::Object3d, Some("a")).unwrap();
    let second = manager.create_object(ClassId::Object3d, Some("b")).unwrap();
    let third = manager.create_object(ClassId::Object3d, Some("c")).unwrap();

    manager.destroy_objects(&[second]);
    assert!(!manager.is_object_safe(second));
    assert_eq!(manager.object_count(), 2);

    // the freed slot is handed out again, most recently freed first
    let reused = manager.create_object(ClassId::Mesh, None).unwrap();
    assert_eq!(reused, second);

    // the surviving ids still resolve to their original objects
    assert_eq!(manager.get(first).unwrap().core().name.as_deref(), Some("a"));
    assert_eq!(manager.get(third).unwrap().core().name.as_deref(), Some("c"));
    assert_eq!(manager.get(reused).unwrap().class_id(), ClassId::Mesh);
}

#[test]
fn per_class_index_tracks_live_objects() {
    let mut manager = manager();
    let g1 = manager.create_object(ClassId::Group, None).unwrap();
    let g2 = manager.create_object(ClassId::Group, None).unwrap();
    let mesh = manager.create_object(ClassId::Mesh, None).unwrap();

    assert_eq!(manager.objects_of_class(ClassId::Group), &[g1, g2]);
    assert_eq!(manager.objects_of_class(ClassId::Mesh), &[mesh]);

    manager.destroy_objects(&[g1]);
    assert_eq!(manager.objects_of_class(ClassId::Group), &[g2]);
}

#[test]
fn destroying_invalid_ids_is_a_silent_noop() {
    let mut manager = manager();
    let id = manager.create_object(ClassId::Material, None).unwrap();

    manager.destroy_objects(&[ObjectId::NULL, ObjectId(12345), id, id]);
    assert_eq!(manager.object_count(), 0);
}

#[test]
fn destroy_batch_nulls_targets_in_any_order() {
    // the dependent's target must be nulled whether the target or the
    // dependent comes first in the batch input
    for reversed in [false, true] {
        let mut manager = manager();
        let victim = manager.create_object(ClassId::Object3d, None).unwrap();
        let light_id = manager.create_object(ClassId::TargetLight, None).unwrap();
        let bystander_id = manager.create_object(ClassId::TargetLight, None).unwrap();

        manager
            .get_as_mut::<Light>(light_id)
            .unwrap()
            .set_target(victim);
        manager
            .get_as_mut::<Light>(bystander_id)
            .unwrap()
            .set_target(victim);

        let batch = if reversed {
            [light_id, victim]
        } else {
            [victim, light_id]
        };
        manager.destroy_objects(&batch);

        assert!(!manager.is_object_safe(victim));
        assert!(!manager.is_object_safe(light_id));
        // the surviving dependent saw the deletion and cleared its target
        assert_eq!(
            manager.get_as::<Light>(bystander_id).unwrap().target(),
            ObjectId::NULL
        );
    }
}

#[test]
fn groups_stop_listing_destroyed_members() {
    let mut manager = manager();
    let group_id = manager.create_object(ClassId::Group, None).unwrap();
    let kept = manager.create_object(ClassId::Object3d, None).unwrap();
    let dropped = manager.create_object(ClassId::Object3d, None).unwrap();

    {
        let group = manager.get_as_mut::<Group>(group_id).unwrap();
        assert!(group.add_object(kept));
        assert!(group.add_object(dropped));
        assert!(!group.add_object(dropped));
    }

    manager.destroy_objects(&[dropped]);

    let group = manager.get_as::<Group>(group_id).unwrap();
    assert_eq!(group.members(), &[kept]);
}

#[test]
fn destroy_all_objects_resets_everything() {
    let mut manager = manager();
    manager.create_object(ClassId::Group, None);
    manager.create_object(ClassId::Mesh, None);
    manager.destroy_all_objects();

    assert_eq!(manager.object_count(), 0);
    assert!(manager.objects_of_class(ClassId::Group).is_empty());
    assert_eq!(manager.live_objects().count(), 0);
}

#[test]
fn unknown_low_ids_never_resolve() {
    let manager = manager();
    assert!(manager.get(ObjectId::NULL).is_none());
    assert!(!manager.is_object_listed(ObjectId(1)));
}
