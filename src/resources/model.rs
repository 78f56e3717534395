//! Imported model: mesh set, material name map, and the template hierarchy
//! scene instances are stamped from.

use std::path::PathBuf;

use glam::Mat4;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::notify::{Message, Subscriber};
use crate::registry::ResourceId;
use crate::resources::mesh::BoundingBox;

/// A material as a model refers to it: stable ID plus the dense index
/// currently backing it. The index is rewritten in place when the material
/// array compacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRef {
    pub id: ResourceId,
    pub index: u32,
}

/// One node of a model's template hierarchy. Instantiation stamps this tree
/// into the scene graph.
#[derive(Debug, Clone)]
pub struct ModelNode {
    pub name: String,
    pub transform: Mat4,
    pub mesh: Option<ResourceId>,
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    #[must_use]
    pub fn new(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
            mesh: None,
            children: Vec::new(),
        }
    }
}

/// An imported asset: the meshes it owns, the named materials its primitives
/// reference, and the node template for instantiation.
pub struct Model {
    pub id: ResourceId,
    pub name: String,
    pub source_path: PathBuf,
    pub meshes: FxHashSet<ResourceId>,
    pub root: ModelNode,
    /// Model-space extents of the template, fixed at import.
    pub bounds: BoundingBox,
    default_material: MaterialRef,
    materials: FxHashMap<String, MaterialRef>,
    mesh_materials: FxHashMap<ResourceId, String>,
}

impl Model {
    #[must_use]
    pub fn new(
        id: ResourceId,
        name: impl Into<String>,
        source_path: PathBuf,
        default_material: MaterialRef,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            name: name.clone(),
            source_path,
            meshes: FxHashSet::default(),
            root: ModelNode::new(name, Mat4::IDENTITY),
            bounds: BoundingBox::EMPTY,
            default_material,
            materials: FxHashMap::default(),
            mesh_materials: FxHashMap::default(),
        }
    }

    /// Registers a mesh as belonging to this model, sampling `material_name`.
    pub fn add_mesh(&mut self, mesh: ResourceId, material_name: impl Into<String>) {
        self.meshes.insert(mesh);
        self.mesh_materials.insert(mesh, material_name.into());
    }

    /// Binds `name` to a concrete material.
    pub fn map_material(&mut self, name: impl Into<String>, material: MaterialRef) {
        self.materials.insert(name.into(), material);
    }

    /// The material currently bound to `name`, falling back to the default.
    #[must_use]
    pub fn material(&self, name: &str) -> MaterialRef {
        self.materials
            .get(name)
            .copied()
            .unwrap_or(self.default_material)
    }

    /// The dense material index for `mesh`'s primitives.
    #[must_use]
    pub fn material_index_for_mesh(&self, mesh: ResourceId) -> u32 {
        match self.mesh_materials.get(&mesh) {
            Some(name) => self.material(name).index,
            None => self.default_material.index,
        }
    }

    /// Rebinds `name` to a different material and returns the remap events
    /// the caller publishes, one per mesh sampling `name`.
    pub fn remap_material(&mut self, name: &str, material: MaterialRef) -> Vec<Message> {
        self.materials.insert(name.to_string(), material);
        self.mesh_materials
            .iter()
            .filter(|(_, mesh_material)| mesh_material.as_str() == name)
            .map(|(&mesh, _)| Message::MaterialRemap {
                mesh,
                new_material_index: material.index,
            })
            .collect()
    }

    #[must_use]
    pub fn material_names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }
}

impl Subscriber for Model {
    fn notify(&mut self, message: &Message) {
        if let Message::MaterialDeleted {
            removed_index,
            transfer_index,
        } = message
        {
            // Bindings to the removed material fall back to the default;
            // bindings to the swapped-in material follow it to its new index.
            for material in self.materials.values_mut() {
                if material.index == *removed_index {
                    *material = self.default_material;
                } else if Some(material.index) == *transfer_index {
                    material.index = *removed_index;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{IdRegistry, ObjectType};

    fn test_model() -> (Model, ResourceId) {
        let registry = IdRegistry::new();
        let default = MaterialRef {
            id: registry.generate(ObjectType::Material),
            index: 0,
        };
        let model_id = registry.generate(ObjectType::Model);
        let mesh = registry.generate(ObjectType::Mesh);
        let mut model = Model::new(model_id, "crate", PathBuf::from("crate.gltf"), default);
        model.add_mesh(mesh, "wood");
        model.map_material(
            "wood",
            MaterialRef {
                id: registry.generate(ObjectType::Material),
                index: 3,
            },
        );
        (model, mesh)
    }

    #[test]
    fn deleted_material_falls_back_to_default() {
        let (mut model, mesh) = test_model();
        model.notify(&Message::MaterialDeleted {
            removed_index: 3,
            transfer_index: Some(5),
        });
        assert_eq!(model.material("wood").index, 0);
        assert_eq!(model.material_index_for_mesh(mesh), 0);
    }

    #[test]
    fn transferred_material_follows_the_swap() {
        let (mut model, mesh) = test_model();
        // Index 1 removed, our index 3 was last and moved into 1.
        model.notify(&Message::MaterialDeleted {
            removed_index: 1,
            transfer_index: Some(3),
        });
        assert_eq!(model.material_index_for_mesh(mesh), 1);
    }

    #[test]
    fn remap_emits_one_event_per_mesh() {
        let (mut model, mesh) = test_model();
        let registry = IdRegistry::new();
        let replacement = MaterialRef {
            id: registry.generate(ObjectType::Material),
            index: 7,
        };
        let events = model.remap_material("wood", replacement);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Message::MaterialRemap {
                mesh: m,
                new_material_index: 7,
            } if m == mesh
        ));
    }
}
