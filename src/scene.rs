use std::collections::HashMap;
use std::fmt;

use glam::{Mat4, Quat, Vec3};

use crate::render::{MeshHandle, TextureHandle};

/// Stable identifier assigned when an object enters the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub(crate) const fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rigid placement of an object in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Drawable object. GPU buffers are owned by the backend and referenced by handle.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub mesh: MeshHandle,
    pub texture: TextureHandle,
    pub index_count: u32,
    transform: Transform,
    model: Mat4,
}

impl SceneObject {
    pub fn new(
        name: impl Into<String>,
        mesh: MeshHandle,
        texture: TextureHandle,
        index_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            mesh,
            texture,
            index_count,
            transform: Transform::default(),
            model: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.set_transform(transform);
        self
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.model = transform.matrix();
    }

    /// Updates position and rotation, keeping the object's scale.
    pub fn set_pose(&mut self, position: Vec3, rotation: Quat) {
        self.set_transform(Transform {
            position,
            rotation,
            scale: self.transform.scale,
        });
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }
}

/// Append-only, insertion-ordered collection of scene objects.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    entries: Vec<(ObjectId, SceneObject)>,
    lookup: HashMap<ObjectId, usize>,
    next_id: u32,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: SceneObject) -> ObjectId {
        let id = ObjectId::from_index(self.next_id);
        self.next_id += 1;
        self.lookup.insert(id, self.entries.len());
        self.entries.push((id, object));
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.lookup.get(&id).map(|&index| &self.entries[index].1)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        let index = *self.lookup.get(&id)?;
        Some(&mut self.entries[index].1)
    }

    /// Returns the object stored at an insertion position.
    pub fn at(&self, position: usize) -> Option<(ObjectId, &SceneObject)> {
        self.entries.get(position).map(|(id, object)| (*id, object))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> + '_ {
        self.entries.iter().map(|(id, object)| (*id, object))
    }
}
