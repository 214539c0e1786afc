//! Ordered, id-keyed entity collections.
//!
//! Lookup by id goes through a hash map. Lookup by name is a linear scan
//! over the insertion order; collections are small compared to payloads.

use crate::entity::HasEntity;
use crate::error::{NixError, Result};
use crate::types::{EntityId, Key};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::HashMap;

/// Map lookup misses to `false`, keep every other error
pub(crate) fn exists<T>(lookup: Result<T>) -> Result<bool> {
    match lookup {
        Ok(_) => Ok(true),
        Err(NixError::NotFound(_)) | Err(NixError::OutOfBounds { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Resolve a possibly negative position against a collection length
pub(crate) fn resolve_index(index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(NixError::OutOfBounds { index, len });
    }
    Ok(resolved as usize)
}

/// Ordered collection of entities owned by a parent
#[derive(Debug, Clone)]
pub struct Registry<T> {
    order: Vec<EntityId>,
    items: HashMap<EntityId, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            items: HashMap::new(),
        }
    }
}

impl<T: HasEntity> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.items.contains_key(id)
    }

    /// Insert a new entity; its name must not be taken yet
    pub fn insert(&mut self, item: T) -> Result<EntityId> {
        let entity = item.entity();
        if self.get_by_name(&entity.name).is_some() {
            return Err(NixError::validation(format!(
                "name '{}' is already in use",
                entity.name
            )));
        }
        let id = entity.id;
        self.order.push(id);
        self.items.insert(id, item);
        Ok(id)
    }

    /// Fail if `name` is used by an entity other than `id`
    pub fn check_rename(&self, id: &EntityId, name: &str) -> Result<()> {
        match self.get_by_name(name) {
            Some(other) if other.entity().id != *id => Err(NixError::validation(format!(
                "name '{}' is already in use",
                name
            ))),
            _ => Ok(()),
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut T> {
        self.items.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.iter().find(|item| item.entity().name == name)
    }

    /// Resolve a key: positions (negative from the end), ids, or id/name strings
    pub fn resolve(&self, key: &Key) -> Result<&T> {
        let id = match key {
            Key::Index(index) => self.order[resolve_index(*index, self.len())?],
            _ => *self
                .order
                .iter()
                .find(|&id| {
                    let name = self.items.get(id).map(|item| item.entity().name.as_str());
                    key.matches(id, name)
                })
                .ok_or_else(|| NixError::not_found("entity", format!("{:?}", key)))?,
        };
        self.items
            .get(&id)
            .ok_or_else(|| NixError::not_found("entity", id))
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<T> {
        let item = self.items.remove(id)?;
        self.order.retain(|other| other != id);
        Some(item)
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(move |id| self.items.get(id))
    }

    /// Entities in arbitrary order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }
}

impl<T: Serialize + HasEntity> Serialize for Registry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().collect::<Vec<_>>())
    }
}

impl<'de, T: Deserialize<'de> + HasEntity> Deserialize<'de> for Registry<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        let mut registry = Registry::new();
        for item in items {
            registry
                .insert(item)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(registry)
    }
}
