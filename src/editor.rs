//! Editor facade: owns the registry, the bus, the resource manager and the
//! scene graph, and enforces the locking discipline between them.
//!
//! Lock order is resources before scene, and no lock is ever held across a
//! `publish`. Mutating operations on the shared subsystems hand back their
//! lifecycle messages; the facade publishes them once the locks are gone,
//! which is what lets the manager hear its own texture deletions.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Affine3A, Mat4};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::assets::importer::ModelImporter;
use crate::errors::{AtelierError, Result};
use crate::notify::{NotificationBus, SharedSubscriber, Topic};
use crate::registry::{IdRegistry, ResourceId};
use crate::resources::material::Material;
use crate::resources::model::{MaterialRef, ModelNode};
use crate::resources::texture::Texture;
use crate::resources::{ResourceManager, TaskSender};
use crate::scene::{NodeKey, SceneGraph};

pub struct Editor {
    registry: Arc<IdRegistry>,
    bus: NotificationBus,
    resources: Arc<Mutex<ResourceManager>>,
    scene: Arc<Mutex<SceneGraph>>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    #[must_use]
    pub fn new() -> Self {
        let registry = Arc::new(IdRegistry::new());
        let bus = NotificationBus::new();
        let resources = Arc::new(Mutex::new(ResourceManager::new(
            registry.clone(),
            bus.clone(),
        )));
        let scene = Arc::new(Mutex::new(SceneGraph::new(registry.clone())));

        let resources_sub: SharedSubscriber = resources.clone();
        let scene_sub: SharedSubscriber = scene.clone();
        bus.subscribe(Topic::Resources, &resources_sub);
        bus.subscribe(Topic::Resources, &scene_sub);
        bus.subscribe(Topic::Scene, &resources_sub);

        Self {
            registry,
            bus,
            resources,
            scene,
        }
    }

    #[must_use]
    pub fn registry(&self) -> Arc<IdRegistry> {
        self.registry.clone()
    }

    #[must_use]
    pub fn bus(&self) -> NotificationBus {
        self.bus.clone()
    }

    #[must_use]
    pub fn resources(&self) -> Arc<Mutex<ResourceManager>> {
        self.resources.clone()
    }

    #[must_use]
    pub fn scene(&self) -> Arc<Mutex<SceneGraph>> {
        self.scene.clone()
    }

    #[must_use]
    pub fn task_sender(&self) -> TaskSender {
        self.resources.lock().task_sender()
    }

    /// Per-frame tick: runs queued resource work, polls imports, propagates
    /// scene transforms, then publishes the resulting scene traffic.
    pub fn update(&self) {
        self.resources.lock().update();
        let messages = self.scene.lock().update_global_transforms();
        for message in messages {
            self.bus.publish(Topic::Scene, &message);
        }
    }

    // ========================================================================
    // Resource Operations
    // ========================================================================

    pub fn import_model(
        &self,
        path: impl Into<PathBuf>,
        importer: Arc<dyn ModelImporter>,
    ) -> Result<()> {
        self.resources.lock().import_model(path, importer)
    }

    pub fn create_material(&self, material: Material) -> ResourceId {
        self.resources.lock().create_material(material)
    }

    pub fn create_texture(&self, texture: Texture) -> Result<ResourceId> {
        self.resources.lock().create_texture(texture)
    }

    pub fn delete_material(&self, id: ResourceId) -> Result<()> {
        let message = self.resources.lock().delete_material(id)?;
        self.bus.publish(Topic::Resources, &message);
        Ok(())
    }

    pub fn delete_texture(&self, id: ResourceId) -> Result<()> {
        let message = self.resources.lock().delete_texture(id)?;
        self.bus.publish(Topic::Resources, &message);
        Ok(())
    }

    pub fn delete_model(&self, id: ResourceId) -> Result<()> {
        let messages = self.resources.lock().delete_model(id)?;
        for message in messages {
            self.bus.publish(Topic::Resources, &message);
        }
        Ok(())
    }

    /// Rebinds one of `model`'s named materials to an existing material.
    pub fn remap_material(
        &self,
        model: ResourceId,
        name: &str,
        material: ResourceId,
    ) -> Result<()> {
        let (model_arc, material_ref) = {
            let resources = self.resources.lock();
            let material_ref = MaterialRef {
                id: material,
                index: resources.material_index(material)?,
            };
            (resources.model(model)?, material_ref)
        };
        let messages = model_arc.lock().remap_material(name, material_ref);
        for message in messages {
            self.bus.publish(Topic::Resources, &message);
        }
        Ok(())
    }

    // ========================================================================
    // Scene Operations
    // ========================================================================

    pub fn create_node(&self, name: &str, parent: NodeKey) -> Result<NodeKey> {
        self.scene.lock().create_node(name, parent)
    }

    pub fn scene_root(&self) -> NodeKey {
        self.scene.lock().root()
    }

    pub fn orphan(&self, key: NodeKey) -> Result<()> {
        self.scene.lock().orphan(key)
    }

    pub fn attach(&self, child: NodeKey, new_parent: NodeKey) -> Result<()> {
        self.scene.lock().attach(child, new_parent)
    }

    pub fn set_local_transform(&self, key: NodeKey, local: Affine3A) -> Result<()> {
        self.scene.lock().set_local_transform(key, local)
    }

    pub fn set_material_override(&self, key: NodeKey, index: Option<u32>) -> Result<()> {
        self.scene.lock().set_material_override(key, index)
    }

    /// Claims an instance slot on `mesh` and binds it to `key`, using the
    /// default material. The slot is seeded with the node's current world
    /// transform; the next [`Self::update`] refines it if the node is dirty.
    pub fn bind_mesh(&self, key: NodeKey, mesh: ResourceId) -> Result<()> {
        let mut resources = self.resources.lock();
        let material_index = resources.default_material().index;
        let mut scene = self.scene.lock();
        let (object, transform) = {
            let node = scene.node(key).ok_or(AtelierError::DeadNode)?;
            (node.id, node.transform.global_matrix())
        };
        let instance = resources
            .mesh_mut(mesh)?
            .add_instance(transform, object, material_index);
        scene.bind_mesh(key, mesh, instance, material_index)
    }

    pub fn unbind_mesh(&self, key: NodeKey) -> Result<()> {
        let message = self.scene.lock().unbind_mesh(key)?;
        if let Some(message) = message {
            self.bus.publish(Topic::Scene, &message);
        }
        Ok(())
    }

    pub fn destroy_subtree(&self, key: NodeKey) -> Result<()> {
        let messages = self.scene.lock().destroy_subtree(key)?;
        for message in messages {
            self.bus.publish(Topic::Scene, &message);
        }
        Ok(())
    }

    /// Stamps `model`'s template hierarchy into the scene under `parent`,
    /// claiming one instance slot per mesh node. Instance records flow out
    /// on the next [`Self::update`].
    pub fn instantiate_model(&self, model: ResourceId, parent: NodeKey) -> Result<NodeKey> {
        let model_arc = self.resources.lock().model(model)?;
        let (template, material_of) = {
            let guard = model_arc.lock();
            let material_of: FxHashMap<ResourceId, u32> = guard
                .meshes
                .iter()
                .map(|&mesh| (mesh, guard.material_index_for_mesh(mesh)))
                .collect();
            (guard.root.clone(), material_of)
        };

        let mut resources = self.resources.lock();
        let mut scene = self.scene.lock();
        let parent_global = scene
            .node(parent)
            .ok_or(AtelierError::DeadNode)?
            .transform
            .global_matrix();
        instantiate_node(
            &mut resources,
            &mut scene,
            &template,
            &material_of,
            parent,
            parent_global,
        )
    }
}

fn instantiate_node(
    resources: &mut ResourceManager,
    scene: &mut SceneGraph,
    template: &ModelNode,
    material_of: &FxHashMap<ResourceId, u32>,
    parent: NodeKey,
    parent_global: Mat4,
) -> Result<NodeKey> {
    let key = scene.create_node(&template.name, parent)?;
    scene.set_local_transform(key, Affine3A::from_mat4(template.transform))?;
    let global = parent_global * template.transform;
    if let Some(mesh) = template.mesh {
        let material_index = material_of
            .get(&mesh)
            .copied()
            .unwrap_or(resources.default_material().index);
        let object = scene.node(key).ok_or(AtelierError::DeadNode)?.id;
        let instance = resources
            .mesh_mut(mesh)?
            .add_instance(global, object, material_index);
        scene.bind_mesh(key, mesh, instance, material_index)?;
    }
    for child in &template.children {
        instantiate_node(resources, scene, child, material_of, key, global)?;
    }
    Ok(key)
}
