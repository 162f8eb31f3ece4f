//! In-memory host scene
//!
//! The object graph mutated by host tools. The host loop advances the frame
//! counter once per tick; tools only ever touch it from inside dispatched
//! closures, so the lock is uncontended in practice.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub type ObjectId = u64;
pub type SceneHandle = Arc<Mutex<Scene>>;

pub const OBJECT_KINDS: [&str; 5] = ["empty", "cube", "sphere", "light", "camera"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub kind: String,
    pub parent: Option<ObjectId>,
    pub position: Vector3,
    pub tags: Vec<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewObject {
    pub name: String,
    pub kind: String,
    pub parent: Option<ObjectId>,
    pub position: Vector3,
    pub tags: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Scene {
    objects: IndexMap<ObjectId, SceneObject>,
    next_id: ObjectId,
    frame: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SceneHandle {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn advance_frame(&mut self) {
        self.frame += 1;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SceneObject> {
        self.objects.values().find(|object| object.name == name)
    }

    pub fn create(&mut self, new: NewObject) -> Result<&SceneObject, String> {
        if !OBJECT_KINDS.contains(&new.kind.as_str()) {
            return Err(format!("Unsupported object kind: {}", new.kind));
        }
        if let Some(parent) = new.parent {
            if !self.objects.contains_key(&parent) {
                return Err(format!("Parent object not found: {parent}"));
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        let object = SceneObject {
            id,
            name: new.name,
            kind: new.kind,
            parent: new.parent,
            position: new.position,
            tags: new.tags,
            active: true,
        };
        Ok(&*self.objects.entry(id).or_insert(object))
    }

    pub fn set_active(&mut self, id: ObjectId, active: bool) -> Option<&SceneObject> {
        let object = self.objects.get_mut(&id)?;
        object.active = active;
        Some(&*object)
    }

    /// Removes an object and all of its descendants, returning the removed ids.
    pub fn delete(&mut self, id: ObjectId) -> Option<Vec<ObjectId>> {
        if !self.objects.contains_key(&id) {
            return None;
        }

        let mut removed = vec![id];
        let mut cursor = 0;
        while cursor < removed.len() {
            let parent = removed[cursor];
            removed.extend(
                self.objects
                    .values()
                    .filter(|object| object.parent == Some(parent))
                    .map(|object| object.id),
            );
            cursor += 1;
        }

        for removed_id in &removed {
            self.objects.shift_remove(removed_id);
        }
        Some(removed)
    }
}
