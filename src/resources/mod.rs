pub mod manager;
pub mod material;
pub mod mesh;
pub mod model;
pub mod table;
pub mod texture;

pub use manager::{ResourceManager, TaskSender};
pub use material::{Material, MaterialRecord, TextureSlot, Workflow, DEFAULT_MATERIAL_INDEX};
pub use mesh::{BoundingBox, InstanceId, InstanceRecord, InstancedMesh, MeshGeometry, Vertex};
pub use model::{MaterialRef, Model, ModelNode};
pub use table::{Removal, ResourceTable};
pub use texture::Texture;
