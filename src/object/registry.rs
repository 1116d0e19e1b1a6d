//! The class registry: per-class factories, the inheritance hierarchy and
//! the deletion notification closure.
//!
//! The registry is built once at context creation and immutable afterwards;
//! nothing here needs synchronization because nothing here ever changes
//! again.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{ObjectId, SceneObject};
use crate::classes;

/// Concrete type of a persisted object. The numeric values are the legacy
/// engine's class ids and are persisted in chunk and file headers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ClassId {
    Object = 1,
    SceneObject = 11,
    BeObject = 19,
    Group = 23,
    Material = 30,
    Texture = 31,
    Mesh = 32,
    Entity3d = 33,
    Camera = 34,
    TargetCamera = 35,
    Light = 38,
    TargetLight = 39,
    Object3d = 41,
    RenderObject = 47,
}

const MAX_CLASS_ID: usize = 55;

type CreationFn = fn(ObjectId, Option<&str>) -> Box<dyn SceneObject>;

/// Per-class bit mask, indexed by numeric class id.
pub type ClassMask = Vec<bool>;

pub struct ClassDesc {
    pub id: ClassId,
    pub parent: ClassId,
    pub name: &'static str,
    pub create: CreationFn,
    /// Classes whose deletion this class wants to hear about, as declared
    /// at registration. The effective set (closed over inheritance) is
    /// computed into `common_to_be_notify`.
    to_be_notify: &'static [ClassId],

    parents: ClassMask,
    children: ClassMask,
    common_to_be_notify: ClassMask,
    to_notify: ClassMask,
    pub derivation_level: u32,
}

pub struct ClassRegistry {
    descs: Vec<Option<ClassDesc>>,
}

impl ClassRegistry {
    /// Build the registry with the full builtin class catalog and compute
    /// the hierarchy and notification tables.
    pub fn with_builtin_classes() -> Self {
        let mut registry = ClassRegistry {
            descs: std::iter::repeat_with(|| None).take(MAX_CLASS_ID).collect(),
        };

        use ClassId::*;
        registry.register(Object, Object, "Basic Object", classes::create_basic_object, &[]);
        registry.register(SceneObject, Object, "Scene Object", classes::create_scene_object, &[]);
        registry.register(BeObject, SceneObject, "Behavioral Object", classes::create_be_object, &[]);
        registry.register(Group, BeObject, "Group", classes::group::create, &[BeObject]);
        registry.register(RenderObject, BeObject, "Render Object", classes::create_render_object, &[]);
        registry.register(Entity3d, RenderObject, "3D Entity", classes::entity::create, &[Mesh]);
        registry.register(Object3d, Entity3d, "3D Object", classes::entity::create_object3d, &[]);
        registry.register(Camera, Entity3d, "Camera", classes::camera::create, &[]);
        registry.register(TargetCamera, Camera, "Target Camera", classes::camera::create_targeted, &[Entity3d]);
        registry.register(Light, Entity3d, "Light", classes::light::create, &[]);
        registry.register(TargetLight, Light, "Target Light", classes::light::create_targeted, &[Entity3d]);
        registry.register(Material, BeObject, "Material", classes::material::create, &[Texture]);
        registry.register(Texture, BeObject, "Texture", classes::texture::create, &[]);
        registry.register(Mesh, BeObject, "Mesh", classes::mesh::create, &[Material]);

        registry.build_hierarchy_tables();
        registry
    }

    fn register(
        &mut self,
        id: ClassId,
        parent: ClassId,
        name: &'static str,
        create: CreationFn,
        to_be_notify: &'static [ClassId],
    ) {
        let index = u8::from(id) as usize;
        self.descs[index] = Some(ClassDesc {
            id,
            parent,
            name,
            create,
            to_be_notify,
            parents: Vec::new(),
            children: Vec::new(),
            common_to_be_notify: Vec::new(),
            to_notify: Vec::new(),
            derivation_level: 0,
        });
    }

    pub fn class_count(&self) -> usize {
        self.descs.len()
    }

    pub fn desc(&self, id: ClassId) -> Option<&ClassDesc> {
        self.descs[u8::from(id) as usize].as_ref()
    }

    pub fn class_name(&self, id: ClassId) -> Option<&'static str> {
        self.desc(id).map(|d| d.name)
    }

    /// True when `child` is `parent` or derives from it.
    pub fn is_child_class_of(&self, child: ClassId, parent: ClassId) -> bool {
        self.desc(child)
            .map(|d| d.parents[u8::from(parent) as usize])
            .unwrap_or(false)
    }

    pub fn create(
        &self,
        id: ClassId,
        object_id: ObjectId,
        name: Option<&str>,
    ) -> Option<Box<dyn SceneObject>> {
        let desc = self.desc(id)?;
        Some((desc.create)(object_id, name))
    }

    /// Union of the to-notify sets of every class marked in `deleted`: the
    /// classes whose live objects must receive the deletion hooks.
    pub fn all_notify_class_ids(&self, deleted: &[bool]) -> ClassMask {
        let mut result = vec![false; self.descs.len()];
        for (index, &flagged) in deleted.iter().enumerate() {
            if !flagged {
                continue;
            }
            if let Some(desc) = self.descs[index].as_ref() {
                for (target, notify) in desc.to_notify.iter().enumerate() {
                    if *notify {
                        result[target] = true;
                    }
                }
            }
        }
        result
    }

    /// Whether `listener` class objects need the deletion hooks when a
    /// `deleted` class object goes away.
    pub fn is_need_notify(&self, listener: ClassId, deleted: ClassId) -> bool {
        self.desc(listener)
            .map(|d| d.common_to_be_notify[u8::from(deleted) as usize])
            .unwrap_or(false)
    }

    fn build_hierarchy_tables(&mut self) {
        let count = self.descs.len();

        // parents closure and derivation depth, by walking each chain to
        // the self-parenting root
        for index in 0..count {
            if self.descs[index].is_none() {
                continue;
            }
            let mut parents = vec![false; count];
            let mut level = 0u32;
            let mut cursor = index;
            loop {
                parents[cursor] = true;
                let parent = u8::from(
                    self.descs[cursor]
                        .as_ref()
                        .expect("parent chain leads to an unregistered class")
                        .parent,
                ) as usize;
                if parent == cursor {
                    break;
                }
                cursor = parent;
                level += 1;
            }
            let desc = self.descs[index].as_mut().expect("checked above");
            desc.parents = parents;
            desc.derivation_level = level;
        }

        // children closure: transpose of parents
        for index in 0..count {
            let Some(parents) = self.descs[index].as_ref().map(|d| d.parents.clone()) else {
                continue;
            };
            for (ancestor, is_parent) in parents.iter().enumerate() {
                if *is_parent {
                    if let Some(desc) = self.descs[ancestor].as_mut() {
                        if desc.children.is_empty() {
                            desc.children = vec![false; count];
                        }
                        desc.children[index] = true;
                    }
                }
            }
        }
        for desc in self.descs.iter_mut().flatten() {
            if desc.children.is_empty() {
                desc.children = vec![false; count];
            }
        }

        // effective listen sets: every declared target expands to all of its
        // children, then the parent's effective set is merged in; processing
        // in derivation order guarantees the parent is done first
        let mut order: Vec<usize> = (0..count).filter(|&i| self.descs[i].is_some()).collect();
        order.sort_by_key(|&i| self.descs[i].as_ref().expect("filtered").derivation_level);

        for index in order {
            let mut mask = vec![false; count];
            let (declared, parent_index) = {
                let desc = self.descs[index].as_ref().expect("filtered");
                (desc.to_be_notify, u8::from(desc.parent) as usize)
            };
            for &target in declared {
                let children = &self.descs[u8::from(target) as usize]
                    .as_ref()
                    .expect("notification target is unregistered")
                    .children;
                for (i, set) in children.iter().enumerate() {
                    if *set {
                        mask[i] = true;
                    }
                }
            }
            if parent_index != index {
                let parent_mask = self.descs[parent_index]
                    .as_ref()
                    .expect("parent chain leads to an unregistered class")
                    .common_to_be_notify
                    .clone();
                for (i, set) in parent_mask.iter().enumerate() {
                    if *set {
                        mask[i] = true;
                    }
                }
            }
            self.descs[index].as_mut().expect("filtered").common_to_be_notify = mask;
        }

        // to_notify: transpose of the effective listen sets
        for index in 0..count {
            if self.descs[index].is_none() {
                continue;
            }
            let mut to_notify = vec![false; count];
            for listener in 0..count {
                if let Some(desc) = self.descs[listener].as_ref() {
                    if desc.common_to_be_notify[index] {
                        to_notify[listener] = true;
                    }
                }
            }
            self.descs[index].as_mut().expect("checked above").to_notify = to_notify;
        }
    }
}
