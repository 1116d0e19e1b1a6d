//! The object manager: the authoritative identity table and the only
//! creation/destruction path for persisted objects.

use std::rc::Rc;

use log::debug;

use super::registry::{ClassId, ClassRegistry};
use super::{ObjectFlags, ObjectId, SceneObject};

/// Lowest id ever issued; everything below is reserved so the null id can
/// never collide with a live slot.
const ID_OFFSET: u64 = 1;

pub struct ObjectManager {
    registry: Rc<ClassRegistry>,
    slots: Vec<Option<Box<dyn SceneObject>>>,
    /// Freed slot offsets, reused LIFO: the most recently freed slot is
    /// handed out first.
    free_offsets: Vec<u32>,
    live_count: u32,
    by_class: Vec<Vec<ObjectId>>,
}

impl ObjectManager {
    pub fn new(registry: Rc<ClassRegistry>) -> Self {
        let class_count = registry.class_count();
        ObjectManager {
            registry,
            slots: Vec::new(),
            free_offsets: Vec::new(),
            live_count: 0,
            by_class: vec![Vec::new(); class_count],
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    fn offset_of(&self, id: ObjectId) -> Option<usize> {
        if id.0 < ID_OFFSET {
            return None;
        }
        let offset = (id.0 - ID_OFFSET) as usize;
        (offset < self.slots.len()).then_some(offset)
    }

    fn id_of_offset(offset: usize) -> ObjectId {
        ObjectId(offset as u64 + ID_OFFSET)
    }

    /// Create an object of class `class_id`. Unknown class ids are not
    /// fatal, just unsupported: the result is `None`.
    pub fn create_object(&mut self, class_id: ClassId, name: Option<&str>) -> Option<ObjectId> {
        self.registry.desc(class_id)?;

        let offset = match self.free_offsets.pop() {
            Some(offset) => offset as usize,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };

        let id = Self::id_of_offset(offset);
        let obj = self.registry.create(class_id, id, name)?;

        self.slots[offset] = Some(obj);
        self.live_count += 1;
        self.by_class[u8::from(class_id) as usize].push(id);
        Some(id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&dyn SceneObject> {
        let offset = self.offset_of(id)?;
        self.slots[offset].as_deref()
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut dyn SceneObject> {
        let offset = self.offset_of(id)?;
        self.slots[offset].as_deref_mut()
    }

    /// Typed access to a live object.
    pub fn get_as<T: SceneObject>(&self, id: ObjectId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn get_as_mut<T: SceneObject>(&mut self, id: ObjectId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn object_count(&self) -> u32 {
        self.live_count
    }

    /// Ids of all live objects created with exactly this class id, in
    /// creation order.
    pub fn objects_of_class(&self, class_id: ClassId) -> &[ObjectId] {
        &self.by_class[u8::from(class_id) as usize]
    }

    /// O(1) validity probe.
    pub fn is_object_safe(&self, id: ObjectId) -> bool {
        self.offset_of(id)
            .map(|offset| self.slots[offset].is_some())
            .unwrap_or(false)
    }

    /// Diagnostic probe: does any live slot carry this id? Linear, meant
    /// for debug paths only.
    pub fn is_object_listed(&self, id: ObjectId) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|obj| obj.core().id == id)
    }

    /// Destroy a batch of objects under the five-phase protocol: mark,
    /// prune per-class indexes, notify listeners, let victims clear their
    /// own references, free. A final pass notifies listeners again so they can null
    /// ids that now point at freed slots.
    ///
    /// Invalid or repeated ids are silently skipped; a single destroy is
    /// just a batch of one.
    pub fn destroy_objects(&mut self, ids: &[ObjectId]) {
        let class_count = self.registry.class_count();

        // mark victims and collect their classes
        let mut touched = vec![false; class_count];
        let mut victims: Vec<ObjectId> = Vec::new();
        for &id in ids {
            let Some(offset) = self.offset_of(id) else { continue };
            let Some(obj) = self.slots[offset].as_mut() else { continue };
            if obj.core().is_to_be_deleted() {
                continue;
            }
            obj.core_mut().flags.insert(ObjectFlags::TO_BE_DELETED);
            touched[u8::from(obj.class_id()) as usize] = true;
            victims.push(id);
        }
        if victims.is_empty() {
            return;
        }
        debug!("destroying {} object(s)", victims.len());

        // prune marked entries out of the touched per-class indexes before
        // anyone gets notified
        for class_index in 0..class_count {
            if !touched[class_index] {
                continue;
            }
            let kept: Vec<ObjectId> = self.by_class[class_index]
                .iter()
                .copied()
                .filter(|&id| {
                    self.get(id)
                        .map(|obj| !obj.core().is_to_be_deleted())
                        .unwrap_or(false)
                })
                .collect();
            self.by_class[class_index] = kept;
        }

        // every class transitively interested in one of the touched classes
        let notified = self.registry.all_notify_class_ids(&touched);

        self.for_each_of_classes(&notified, |obj, manager| obj.check_pre_deletion(manager));

        // victims clear their own outgoing references
        for &id in &victims {
            self.with_taken(id, |obj, manager| obj.pre_delete(manager));
        }

        // free the slots and recycle the offsets
        for &id in &victims {
            let Some(offset) = self.offset_of(id) else { continue };
            let Some(obj) = self.slots[offset].take() else { continue };
            // creation went through the registry, so its desc must exist
            self.registry
                .desc(obj.class_id())
                .expect("class registry and object table out of sync");
            drop(obj);
            self.free_offsets.push(offset as u32);
            self.live_count -= 1;
        }

        self.for_each_of_classes(&notified, |obj, manager| obj.check_post_deletion(manager));
    }

    /// Unconditionally release every live object, with no notification
    /// phases. Full-context teardown only.
    pub fn destroy_all_objects(&mut self) {
        self.slots.clear();
        self.free_offsets.clear();
        self.live_count = 0;
        for list in &mut self.by_class {
            list.clear();
        }
    }

    /// Run `hook` on every live object of every class marked in `classes`.
    /// The object is moved out of its slot for the call, so the hook can
    /// query the manager freely without seeing itself.
    fn for_each_of_classes(
        &mut self,
        classes: &[bool],
        mut hook: impl FnMut(&mut dyn SceneObject, &ObjectManager),
    ) {
        for (class_index, &flagged) in classes.iter().enumerate() {
            if !flagged {
                continue;
            }
            let ids: Vec<ObjectId> = self.by_class[class_index].clone();
            for id in ids {
                self.with_taken(id, |obj, manager| hook(obj, manager));
            }
        }
    }

    /// Ids of every live object in slot order, whatever its class.
    pub fn live_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots.iter().flatten().map(|obj| obj.core().id)
    }

    /// Run `hook` with the object moved out of its slot, so the hook can
    /// hold `&mut` to it while still querying the manager.
    pub(crate) fn with_taken(
        &mut self,
        id: ObjectId,
        hook: impl FnOnce(&mut dyn SceneObject, &ObjectManager),
    ) {
        let Some(offset) = self.offset_of(id) else { return };
        let Some(mut obj) = self.slots[offset].take() else { return };
        hook(obj.as_mut(), self);
        self.slots[offset] = Some(obj);
    }
}
