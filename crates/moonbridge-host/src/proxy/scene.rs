use std::cell::RefCell;
use std::rc::Rc;

use super::vector::Vector3;
use crate::error::BridgeError;

/// Scene shared between the host and the script environment
pub type SharedScene = Rc<RefCell<SceneGraph>>;

/// Generational index of a scene object
///
/// A destroyed object's slot may be reused, but the generation changes, so an
/// old id never resolves to the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

/// A host object scripts can only reach through handle functions
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub active: bool,
    pub position: Vector3,
    pub rotation: Vector3,
}

impl SceneObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            position: Vector3::ZERO,
            rotation: Vector3::ZERO,
        }
    }
}

/// Something that happened in the scene as a result of a script request
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Explosion { position: Vector3 },
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<SceneObject>,
}

/// In-memory host scene
#[derive(Debug)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    map_regions: Vec<String>,
    is_server: bool,
    events: Vec<SceneEvent>,
}

impl SceneGraph {
    /// Create an empty scene that is authoritative (acts as the server)
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            map_regions: Vec::new(),
            is_server: true,
            events: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedScene {
        Rc::new(RefCell::new(self))
    }

    /// Add an object and return its id
    pub fn create(&mut self, object: SceneObject) -> ObjectId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectId {
            index,
            generation: 0,
        }
    }

    /// Remove an object; returns false if the id was already stale
    pub fn destroy(&mut self, id: ObjectId) -> bool {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.object.is_some() => {
                slot.object = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: ObjectId) -> Result<&SceneObject, BridgeError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_ref())
            .ok_or(BridgeError::InvalidHandle)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut SceneObject, BridgeError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.object.as_mut())
            .ok_or(BridgeError::InvalidHandle)
    }

    /// Find the first active object with the given name
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            slot.object
                .as_ref()
                .filter(|object| object.active && object.name == name)
                .map(|_| ObjectId {
                    index: index as u32,
                    generation: slot.generation,
                })
        })
    }

    /// Get the number of live objects
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.object.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_map_regions(&mut self, regions: Vec<String>) {
        self.map_regions = regions;
    }

    pub fn map_regions(&self) -> &[String] {
        &self.map_regions
    }

    pub fn set_server(&mut self, is_server: bool) {
        self.is_server = is_server;
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn push_event(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    /// Hand recorded events to the host, leaving the log empty
    pub fn take_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
