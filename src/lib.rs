#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod assets;
pub mod editor;
pub mod errors;
pub mod gpu;
pub mod notify;
pub mod registry;
pub mod resources;
pub mod scene;

pub use assets::{
    GltfImporter, LoadedMaterial, LoadedMesh, LoadedModelData, LoadedNode, ModelImporter,
};
pub use editor::Editor;
pub use errors::AtelierError;
pub use gpu::{BindlessAllocator, BindlessHandle, GpuBuffer};
pub use notify::{Message, NotificationBus, SharedSubscriber, Subscriber, Topic};
pub use registry::{IdRegistry, ObjectType, ResourceId};
pub use resources::{
    BoundingBox, InstanceId, InstanceRecord, InstancedMesh, Material, MaterialRecord, MaterialRef,
    MeshGeometry, Model, ResourceManager, TaskSender, Texture, TextureSlot, Vertex,
    DEFAULT_MATERIAL_INDEX,
};
pub use scene::{MeshBinding, Node, NodeKey, SceneGraph, Transform};
