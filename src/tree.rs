//! Generic tree of named nodes.
//!
//! Used for Source hierarchies (rooted in a Block) and Section hierarchies
//! (rooted in the file). Node records carry an [`EntityRecord`]; names are
//! unique among siblings.

use crate::entity::HasEntity;
use crate::error::{NixError, Result};
use crate::registry::resolve_index;
use crate::types::{EntityId, Key};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode<T> {
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub value: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree<T> {
    roots: Vec<EntityId>,
    nodes: HashMap<EntityId, TreeNode<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            nodes: HashMap::new(),
        }
    }
}

impl<T: HasEntity> Tree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes at every depth
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.nodes.get(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|node| &mut node.value)
    }

    pub fn parent_of(&self, id: &EntityId) -> Option<EntityId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Children of `parent`, or the roots when `parent` is `None`
    pub fn children(&self, parent: Option<&EntityId>) -> Result<&[EntityId]> {
        match parent {
            None => Ok(&self.roots),
            Some(id) => self
                .nodes
                .get(id)
                .map(|node| node.children.as_slice())
                .ok_or_else(|| NixError::not_found("node", id)),
        }
    }

    fn sibling_with_name(&self, parent: Option<&EntityId>, name: &str) -> Result<Option<EntityId>> {
        Ok(self
            .children(parent)?
            .iter()
            .find(|id| {
                self.get(id)
                    .map(|value| value.entity().name == name)
                    .unwrap_or(false)
            })
            .copied())
    }

    /// Attach `value` below `parent` (or as a root)
    pub fn insert(&mut self, parent: Option<&EntityId>, value: T) -> Result<EntityId> {
        let name = value.entity().name.clone();
        if self.sibling_with_name(parent, &name)?.is_some() {
            return Err(NixError::validation(format!(
                "name '{}' is already in use",
                name
            )));
        }

        let id = value.entity().id;
        match parent {
            None => self.roots.push(id),
            Some(parent_id) => {
                if let Some(node) = self.nodes.get_mut(parent_id) {
                    node.children.push(id);
                }
            }
        }
        self.nodes.insert(
            id,
            TreeNode {
                parent: parent.copied(),
                children: Vec::new(),
                value,
            },
        );
        Ok(id)
    }

    /// Fail if a sibling of `id` already uses `name`
    pub fn check_rename(&self, id: &EntityId, name: &str) -> Result<()> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| NixError::not_found("node", id))?;
        match self.sibling_with_name(node.parent.as_ref(), name)? {
            Some(other) if other != *id => Err(NixError::validation(format!(
                "name '{}' is already in use",
                name
            ))),
            _ => Ok(()),
        }
    }

    /// Resolve a key among the children of `parent`
    pub fn resolve_child(&self, parent: Option<&EntityId>, key: &Key) -> Result<EntityId> {
        let children = self.children(parent)?;
        match key {
            Key::Index(index) => Ok(children[resolve_index(*index, children.len())?]),
            _ => children
                .iter()
                .find(|&id| {
                    let name = self.get(id).map(|value| value.entity().name.as_str());
                    key.matches(id, name)
                })
                .copied()
                .ok_or_else(|| NixError::not_found("node", format!("{:?}", key))),
        }
    }

    /// Detach and drop `id` with its whole subtree; returns every removed id
    pub fn remove(&mut self, id: &EntityId) -> Vec<EntityId> {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent) else {
            return Vec::new();
        };
        match parent {
            None => self.roots.retain(|other| other != id),
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|other| other != id);
                }
            }
        }

        let removed = self.descendants(Some(id), usize::MAX);
        for removed_id in &removed {
            self.nodes.remove(removed_id);
        }
        removed
    }

    /// Breadth-first walk. Starting at a node, the node itself is depth 0;
    /// starting at the roots (`None`), the roots are depth 0.
    pub fn descendants(&self, start: Option<&EntityId>, max_depth: usize) -> Vec<EntityId> {
        let mut queue: VecDeque<(EntityId, usize)> = match start {
            Some(id) if self.nodes.contains_key(id) => VecDeque::from([(*id, 0)]),
            Some(_) => VecDeque::new(),
            None => self.roots.iter().map(|id| (*id, 0)).collect(),
        };

        let mut out = Vec::new();
        while let Some((id, depth)) = queue.pop_front() {
            out.push(id);
            if depth >= max_depth {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(node.children.iter().map(|child| (*child, depth + 1)));
            }
        }
        out
    }

    /// Parent chain of `id`, nearest first
    pub fn ancestors(&self, id: &EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent_of(&parent);
        }
        out
    }

    /// All node values in arbitrary order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.nodes.values_mut().map(|node| &mut node.value)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.nodes.values().map(|node| &node.value)
    }
}
