pub mod gltf;
pub mod importer;

pub use gltf::GltfImporter;
pub use importer::{LoadedMaterial, LoadedMesh, LoadedModelData, LoadedNode, ModelImporter};
