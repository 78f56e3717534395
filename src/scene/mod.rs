pub mod graph;
pub mod node;
pub mod transform;

pub use graph::SceneGraph;
pub use node::{MeshBinding, Node, NodeKey};
pub use transform::Transform;
