use slotmap::new_key_type;

use crate::registry::ResourceId;
use crate::resources::mesh::InstanceId;
use crate::scene::transform::Transform;

new_key_type! {
    /// Arena key of a scene node.
    pub struct NodeKey;
}

/// A node's claim on one instance slot of an instanced mesh.
#[derive(Debug, Clone)]
pub struct MeshBinding {
    pub mesh: ResourceId,
    pub instance: InstanceId,
    /// Dense material index inherited from the owning model.
    pub material_index: u32,
    /// Per-node override; takes precedence over `material_index`.
    pub material_override: Option<u32>,
}

impl MeshBinding {
    /// The index actually written into the instance record.
    #[must_use]
    pub fn effective_material(&self) -> u32 {
        self.material_override.unwrap_or(self.material_index)
    }
}

/// One scene-graph node. Structure (parent, children) is owned by the graph;
/// the node only stores it.
#[derive(Debug)]
pub struct Node {
    pub id: ResourceId,
    pub name: String,
    pub transform: Transform,
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    pub binding: Option<MeshBinding>,
}

impl Node {
    #[must_use]
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transform: Transform::IDENTITY,
            parent: None,
            children: Vec::new(),
            binding: None,
        }
    }
}
