//! Importer seam between external asset formats and the resource manager.
//!
//! An importer runs on a blocking worker of the shared import runtime and
//! produces a [`LoadedModelData`]: a self-contained, index-linked payload
//! with no resource IDs in it. Ingest on the main thread turns local
//! indices into registered resources.

use std::path::Path;
use std::sync::OnceLock;

use glam::Mat4;
use tokio::runtime::Runtime;

use crate::errors::Result;
use crate::resources::material::TextureSlot;
use crate::resources::mesh::{BoundingBox, Vertex};
use crate::resources::texture::Texture;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The shared runtime imports are spawned onto. Built lazily on first use.
pub(crate) fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("atelier-import")
            .build()
            .expect("failed to build import runtime")
    })
}

/// A material as described by the source asset. Texture references are
/// local indices into [`LoadedModelData::textures`].
#[derive(Debug, Clone)]
pub struct LoadedMaterial {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emission_factor: [f32; 3],
    pub texture_slots: [Option<usize>; TextureSlot::COUNT],
}

impl LoadedMaterial {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color_factor: [1.0; 4],
            metallic_factor: 0.0,
            roughness_factor: 1.0,
            emission_factor: [0.0; 3],
            texture_slots: [None; TextureSlot::COUNT],
        }
    }
}

/// Geometry for one mesh. The material is a local index into
/// [`LoadedModelData::materials`], or `None` for the default material.
#[derive(Debug, Clone)]
pub struct LoadedMesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
}

/// One node of the source hierarchy; `mesh` is a local index into
/// [`LoadedModelData::meshes`].
#[derive(Debug, Clone)]
pub struct LoadedNode {
    pub name: String,
    pub transform: Mat4,
    pub mesh: Option<usize>,
    pub children: Vec<LoadedNode>,
}

/// Complete import payload, linked purely by local indices so it can cross
/// threads before any resource exists.
#[derive(Debug, Clone)]
pub struct LoadedModelData {
    pub name: String,
    pub textures: Vec<Texture>,
    pub materials: Vec<LoadedMaterial>,
    pub meshes: Vec<LoadedMesh>,
    pub root: LoadedNode,
}

impl LoadedModelData {
    /// Model-space bounds: every mesh's vertex extents taken under its
    /// node's accumulated transform.
    #[must_use]
    pub fn compute_bounds(&self) -> BoundingBox {
        fn walk(
            node: &LoadedNode,
            parent: Mat4,
            meshes: &[LoadedMesh],
            bounds: &mut BoundingBox,
        ) {
            let global = parent * node.transform;
            if let Some(mesh) = node.mesh.and_then(|index| meshes.get(index)) {
                *bounds =
                    bounds.union(BoundingBox::from_vertices(&mesh.vertices).transformed(global));
            }
            for child in &node.children {
                walk(child, global, meshes, bounds);
            }
        }

        let mut bounds = BoundingBox::EMPTY;
        walk(&self.root, Mat4::IDENTITY, &self.meshes, &mut bounds);
        bounds
    }
}

/// Loads a model file into a [`LoadedModelData`]. Implementations run on a
/// blocking worker thread and must not touch any resource state.
pub trait ModelImporter: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedModelData>;
}
