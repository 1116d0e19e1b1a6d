//! The per-session context: object manager, global save configuration and
//! the collaborators the codecs need.
//!
//! A context is single-threaded by contract. Each independent load/save
//! session gets its own instance; nothing here is shareable across threads.

use std::rc::Rc;

use crate::bitmap::handler::{BitmapProperties, ImageCodecRegistry};
use crate::bitmap::TextureSaveOptions;
use crate::common::path::PathManager;
use crate::object::manager::ObjectManager;
use crate::object::registry::{ClassId, ClassRegistry};
use crate::object::ObjectId;

/// Borrowed view of the context's ambient services, passed down into every
/// object's save/load. During a deep load the manager is present so loaders
/// can validate references; standalone chunk round-trips run without one.
pub struct IoEnv<'a> {
    pub codecs: &'a ImageCodecRegistry,
    pub paths: &'a PathManager,
    pub global_texture_save_options: TextureSaveOptions,
    pub global_texture_save_format: BitmapProperties,
    pub manager: Option<&'a ObjectManager>,
}

pub struct Context {
    pub(crate) registry: Rc<ClassRegistry>,
    pub(crate) manager: ObjectManager,
    pub(crate) codecs: ImageCodecRegistry,
    pub(crate) paths: PathManager,
    pub(crate) global_texture_save_options: TextureSaveOptions,
    pub(crate) global_texture_save_format: BitmapProperties,
}

impl Context {
    pub fn new() -> Self {
        let registry = Rc::new(ClassRegistry::with_builtin_classes());
        Context {
            manager: ObjectManager::new(Rc::clone(&registry)),
            registry,
            codecs: ImageCodecRegistry::new(),
            paths: PathManager::new(),
            global_texture_save_options: TextureSaveOptions::RawData,
            global_texture_save_format: BitmapProperties::default(),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn manager(&self) -> &ObjectManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ObjectManager {
        &mut self.manager
    }

    pub fn codecs(&self) -> &ImageCodecRegistry {
        &self.codecs
    }

    pub fn codecs_mut(&mut self) -> &mut ImageCodecRegistry {
        &mut self.codecs
    }

    pub fn paths(&self) -> &PathManager {
        &self.paths
    }

    pub fn paths_mut(&mut self) -> &mut PathManager {
        &mut self.paths
    }

    pub fn global_texture_save_options(&self) -> TextureSaveOptions {
        self.global_texture_save_options
    }

    pub fn set_global_texture_save_options(&mut self, options: TextureSaveOptions) {
        self.global_texture_save_options = options;
    }

    pub fn global_texture_save_format(&self) -> BitmapProperties {
        self.global_texture_save_format
    }

    pub fn set_global_texture_save_format(&mut self, format: BitmapProperties) {
        self.global_texture_save_format = format;
    }

    /// The ambient-service view handed to save/load overrides.
    pub fn io_env(&self) -> IoEnv<'_> {
        IoEnv {
            codecs: &self.codecs,
            paths: &self.paths,
            global_texture_save_options: self.global_texture_save_options,
            global_texture_save_format: self.global_texture_save_format,
            manager: Some(&self.manager),
        }
    }

    pub fn create_object(&mut self, class_id: ClassId, name: Option<&str>) -> Option<ObjectId> {
        self.manager.create_object(class_id, name)
    }

    pub fn destroy_objects(&mut self, ids: &[ObjectId]) {
        self.manager.destroy_objects(ids);
    }

    pub fn destroy_all_objects(&mut self) {
        self.manager.destroy_all_objects();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-class binding surface: `create_<class>`, `<class>_count` and
/// `<class>(index)` for every concrete persisted class.
macro_rules! class_accessors {
    ($(($create:ident, $count:ident, $get:ident, $cid:expr)),+ $(,)?) => {
        impl Context {
            $(
                pub fn $create(&mut self, name: Option<&str>) -> Option<ObjectId> {
                    self.manager.create_object($cid, name)
                }

                pub fn $count(&self) -> usize {
                    self.manager.objects_of_class($cid).len()
                }

                pub fn $get(&self, index: usize) -> Option<ObjectId> {
                    self.manager.objects_of_class($cid).get(index).copied()
                }
            )+
        }
    };
}

class_accessors!(
    (create_group, group_count, group, ClassId::Group),
    (create_object3d, object3d_count, object3d, ClassId::Object3d),
    (create_mesh, mesh_count, mesh, ClassId::Mesh),
    (create_material, material_count, material, ClassId::Material),
    (create_texture, texture_count, texture, ClassId::Texture),
    (create_camera, camera_count, camera, ClassId::Camera),
    (create_target_camera, target_camera_count, target_camera, ClassId::TargetCamera),
    (create_light, light_count, light, ClassId::Light),
    (create_target_light, target_light_count, target_light, ClassId::TargetLight),
);
