//! Scene graph: an arena-backed node tree with dirty-flag transform
//! propagation.
//!
//! Structural edits and local-transform edits mark the affected subtree
//! dirty immediately; [`SceneGraph::update_global_transforms`] recomputes
//! world transforms once per frame and emits one instance update per dirty
//! bound node. Messages produced while reacting to resource events are
//! queued and drained together with the propagation pass, so the graph never
//! publishes while its own lock is held.

use std::sync::Arc;

use glam::Affine3A;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::errors::{AtelierError, Result};
use crate::notify::{Message, Subscriber};
use crate::registry::{IdRegistry, ObjectType, ResourceId};
use crate::resources::material::DEFAULT_MATERIAL_INDEX;
use crate::resources::mesh::InstanceId;
use crate::scene::node::{MeshBinding, Node, NodeKey};

pub struct SceneGraph {
    registry: Arc<IdRegistry>,
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    /// Messages produced by notify handlers, drained by the next
    /// [`Self::update_global_transforms`].
    pending: Vec<Message>,
}

impl SceneGraph {
    #[must_use]
    pub fn new(registry: Arc<IdRegistry>) -> Self {
        let mut nodes = SlotMap::with_key();
        let root_id = registry.generate(ObjectType::SceneNode);
        let root = nodes.insert(Node::new(root_id, "root"));
        Self {
            registry,
            nodes,
            root,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Creates a node under `parent` and returns its key.
    pub fn create_node(&mut self, name: &str, parent: NodeKey) -> Result<NodeKey> {
        self.ensure_alive(parent)?;
        let id = self.registry.generate(ObjectType::SceneNode);
        let key = self.nodes.insert(Node::new(id, name));
        self.nodes[key].parent = Some(parent);
        self.nodes[parent].children.push(key);
        self.mark_subtree_dirty(key);
        Ok(key)
    }

    /// Detaches `key` from its parent without destroying it. The subtree
    /// floats, untouched by propagation, until [`Self::attach`] reparents it.
    pub fn orphan(&mut self, key: NodeKey) -> Result<()> {
        self.ensure_alive(key)?;
        debug_assert!(key != self.root);
        if let Some(parent) = self.nodes[key].parent.take() {
            self.nodes[parent].children.retain(|&k| k != key);
        }
        self.mark_subtree_dirty(key);
        Ok(())
    }

    /// Moves `child` under `new_parent`, keeping its local transform. The
    /// whole moved subtree goes dirty so world transforms recompute against
    /// the new ancestry. `child` must not be the root or an ancestor of
    /// `new_parent`.
    pub fn attach(&mut self, child: NodeKey, new_parent: NodeKey) -> Result<()> {
        self.ensure_alive(new_parent)?;
        debug_assert!(!self.is_ancestor(child, new_parent));
        self.orphan(child)?;
        self.nodes[child].parent = Some(new_parent);
        self.nodes[new_parent].children.push(child);
        self.mark_subtree_dirty(child);
        Ok(())
    }

    fn is_ancestor(&self, candidate: NodeKey, of: NodeKey) -> bool {
        let mut current = Some(of);
        while let Some(key) = current {
            if key == candidate {
                return true;
            }
            current = self.nodes.get(key).and_then(|node| node.parent);
        }
        false
    }

    pub fn set_local_transform(&mut self, key: NodeKey, local: Affine3A) -> Result<()> {
        self.ensure_alive(key)?;
        self.nodes[key].transform.set_local(local);
        self.mark_subtree_dirty(key);
        Ok(())
    }

    /// Attaches a claimed mesh instance slot to `key`. The node goes dirty
    /// so the first instance record is written on the next propagation.
    pub fn bind_mesh(
        &mut self,
        key: NodeKey,
        mesh: ResourceId,
        instance: InstanceId,
        material_index: u32,
    ) -> Result<()> {
        self.ensure_alive(key)?;
        let node = &mut self.nodes[key];
        node.binding = Some(MeshBinding {
            mesh,
            instance,
            material_index,
            material_override: None,
        });
        node.transform.mark_dirty();
        self.mark_subtree_dirty(key);
        Ok(())
    }

    /// Clears `key`'s binding. Returns the release message for the caller
    /// to publish.
    pub fn unbind_mesh(&mut self, key: NodeKey) -> Result<Option<Message>> {
        self.ensure_alive(key)?;
        Ok(self.nodes[key].binding.take().map(|binding| {
            Message::RemoveMeshInstance {
                mesh: binding.mesh,
                instance: binding.instance,
            }
        }))
    }

    /// Sets or clears the per-node material override and schedules an
    /// instance-record rewrite.
    pub fn set_material_override(&mut self, key: NodeKey, index: Option<u32>) -> Result<()> {
        self.ensure_alive(key)?;
        let node = &mut self.nodes[key];
        if let Some(binding) = &mut node.binding {
            binding.material_override = index;
            node.transform.mark_dirty();
        }
        Ok(())
    }

    /// Destroys `key` and everything below it. Returns one release message
    /// per bound node, for the caller to publish.
    pub fn destroy_subtree(&mut self, key: NodeKey) -> Result<Vec<Message>> {
        self.ensure_alive(key)?;
        if key == self.root {
            // The root itself stays; its children go.
            let children = self.nodes[self.root].children.clone();
            let mut messages = Vec::new();
            for child in children {
                messages.extend(self.remove_subtree(child, None));
            }
            return Ok(messages);
        }
        Ok(self.remove_subtree(key, None))
    }

    fn remove_subtree(
        &mut self,
        key: NodeKey,
        suppressed_meshes: Option<&FxHashSet<ResourceId>>,
    ) -> Vec<Message> {
        if let Some(parent) = self.nodes.get(key).and_then(|node| node.parent) {
            self.nodes[parent].children.retain(|&k| k != key);
        }

        let mut messages = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.remove(current) else {
                continue;
            };
            stack.extend(node.children);
            if let Some(binding) = node.binding {
                // Instances of a mesh that died with its model need no
                // release; the slots are gone already.
                let suppressed =
                    suppressed_meshes.is_some_and(|meshes| meshes.contains(&binding.mesh));
                if !suppressed {
                    messages.push(Message::RemoveMeshInstance {
                        mesh: binding.mesh,
                        instance: binding.instance,
                    });
                }
            }
        }
        messages
    }

    fn mark_subtree_dirty(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            node.transform.mark_dirty();
            stack.extend(node.children.iter().copied());
        }
    }

    /// Recomputes world transforms for every dirty node and returns the
    /// instance updates to publish, together with any messages queued by
    /// resource-event handling.
    pub fn update_global_transforms(&mut self) -> Vec<Message> {
        let mut messages = std::mem::take(&mut self.pending);

        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let parent_global = self
                .nodes
                .get(key)
                .and_then(|node| node.parent)
                .and_then(|parent| self.nodes.get(parent))
                .map_or(Affine3A::IDENTITY, |parent| parent.transform.global());

            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            if node.transform.is_dirty() {
                node.transform.propagate(parent_global);
                if let Some(binding) = &node.binding {
                    messages.push(Message::MeshInstanceUpdate {
                        mesh: binding.mesh,
                        object: node.id,
                        instance: binding.instance,
                        material_index: binding.effective_material(),
                        transform: node.transform.global_matrix(),
                    });
                }
            }
            stack.extend(node.children.iter().copied());
        }
        messages
    }

    fn ensure_alive(&self, key: NodeKey) -> Result<()> {
        if self.nodes.contains_key(key) {
            Ok(())
        } else {
            Err(AtelierError::DeadNode)
        }
    }
}

impl Subscriber for SceneGraph {
    fn notify(&mut self, message: &Message) {
        match message {
            Message::ModelDeleted { meshes, .. } => {
                let doomed: Vec<NodeKey> = self
                    .nodes
                    .iter()
                    .filter(|(_, node)| {
                        node.binding
                            .as_ref()
                            .is_some_and(|binding| meshes.contains(&binding.mesh))
                    })
                    .map(|(key, _)| key)
                    .collect();
                for key in doomed {
                    if self.nodes.contains_key(key) {
                        let released = self.remove_subtree(key, Some(meshes));
                        self.pending.extend(released);
                    }
                }
            }
            Message::MaterialDeleted {
                removed_index,
                transfer_index,
            } => {
                for node in self.nodes.values_mut() {
                    let Some(binding) = &mut node.binding else {
                        continue;
                    };
                    let mut changed = false;
                    changed |= rewrite_index(&mut binding.material_index, *removed_index, *transfer_index);
                    if let Some(override_index) = &mut binding.material_override {
                        changed |=
                            rewrite_index(override_index, *removed_index, *transfer_index);
                    }
                    if changed {
                        node.transform.mark_dirty();
                    }
                }
            }
            Message::MaterialRemap {
                mesh,
                new_material_index,
            } => {
                for node in self.nodes.values_mut() {
                    let Some(binding) = &mut node.binding else {
                        continue;
                    };
                    if binding.mesh == *mesh && binding.material_override.is_none() {
                        binding.material_index = *new_material_index;
                        node.transform.mark_dirty();
                    }
                }
            }
            Message::TextureDeleted { .. }
            | Message::MeshInstanceUpdate { .. }
            | Message::RemoveMeshInstance { .. } => {}
        }
    }
}

fn rewrite_index(index: &mut u32, removed: u32, transfer: Option<u32>) -> bool {
    if *index == removed {
        *index = DEFAULT_MATERIAL_INDEX;
        true
    } else if Some(*index) == transfer {
        *index = removed;
        true
    } else {
        false
    }
}
