//! Central owner of every GPU-facing resource.
//!
//! The manager owns the dense material array and its storage-buffer mirror,
//! the bindless texture-handle array, all instanced meshes, and all imported
//! models. Mutating operations that other subsystems must hear about return
//! their [`Message`] instead of publishing it; the caller publishes after
//! releasing the manager's lock. The manager itself subscribes to both
//! topics: scene traffic drives instance records, and its own texture
//! deletions come back around so material records can drop stale slots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::assets::importer::{runtime, LoadedModelData, LoadedNode, ModelImporter};
use crate::errors::{AtelierError, Result};
use crate::gpu::{BindlessAllocator, BindlessHandle, GpuBuffer};
use crate::notify::{Message, NotificationBus, SharedSubscriber, Subscriber, Topic};
use crate::registry::{IdRegistry, ObjectType, ResourceId};
use crate::resources::material::{Material, MaterialRecord, TextureSlot, DEFAULT_MATERIAL_INDEX};
use crate::resources::mesh::{InstancedMesh, MeshGeometry};
use crate::resources::model::{MaterialRef, Model, ModelNode};
use crate::resources::table::{Removal, ResourceTable};
use crate::resources::texture::{default_textures, Texture};

/// Deferred work executed on the main thread during
/// [`ResourceManager::update`].
pub type Task = Box<dyn FnOnce(&mut ResourceManager) + Send>;

/// Clonable handle for queueing main-thread tasks from any thread.
#[derive(Clone)]
pub struct TaskSender(flume::Sender<Task>);

impl TaskSender {
    pub fn submit(&self, task: impl FnOnce(&mut ResourceManager) + Send + 'static) {
        let _ = self.0.send(Box::new(task));
    }
}

struct TextureEntry {
    texture: Texture,
    handle: BindlessHandle,
}

struct OwnedResources {
    materials: Vec<ResourceId>,
    textures: Vec<ResourceId>,
}

struct PendingImport {
    path: PathBuf,
    receiver: flume::Receiver<Result<LoadedModelData>>,
}

pub struct ResourceManager {
    registry: Arc<IdRegistry>,
    bus: NotificationBus,

    materials: ResourceTable<Material>,
    material_buffer: GpuBuffer,
    default_material_id: ResourceId,

    textures: ResourceTable<TextureEntry>,
    texture_handle_buffer: GpuBuffer,
    bindless: BindlessAllocator,
    default_texture_ids: [ResourceId; TextureSlot::COUNT],

    meshes: FxHashMap<ResourceId, InstancedMesh>,
    models: FxHashMap<ResourceId, Arc<Mutex<Model>>>,
    owned: FxHashMap<ResourceId, OwnedResources>,
    loaded_paths: FxHashMap<PathBuf, ResourceId>,

    in_flight: FxHashSet<PathBuf>,
    pending: Vec<PendingImport>,
    task_tx: flume::Sender<Task>,
    task_rx: flume::Receiver<Task>,
}

impl ResourceManager {
    /// Builds a manager with the default material at dense index 0 and the
    /// per-slot default textures at bindless-array indices `0..5`. Those
    /// entries are permanent, so the fallback indices stay valid for the
    /// manager's lifetime.
    #[must_use]
    pub fn new(registry: Arc<IdRegistry>, bus: NotificationBus) -> Self {
        let (task_tx, task_rx) = flume::unbounded();
        let default_material_id = registry.generate(ObjectType::Material);
        let mut manager = Self {
            registry,
            bus,
            materials: ResourceTable::new(),
            material_buffer: GpuBuffer::empty(
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                Some("materials"),
            ),
            default_material_id,
            textures: ResourceTable::new(),
            texture_handle_buffer: GpuBuffer::empty(
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                Some("texture_handles"),
            ),
            bindless: BindlessAllocator::new(),
            default_texture_ids: [default_material_id; TextureSlot::COUNT],
            meshes: FxHashMap::default(),
            models: FxHashMap::default(),
            owned: FxHashMap::default(),
            loaded_paths: FxHashMap::default(),
            in_flight: FxHashSet::default(),
            pending: Vec::new(),
            task_tx,
            task_rx,
        };

        for (slot, texture) in TextureSlot::ALL.into_iter().zip(default_textures()) {
            let id = manager
                .create_texture(texture)
                .expect("default texture registration");
            manager.default_texture_ids[slot as usize] = id;
        }
        let index = manager
            .materials
            .insert(default_material_id, Material::new("default"));
        debug_assert_eq!(index, DEFAULT_MATERIAL_INDEX);
        manager.upload_materials();

        manager
    }

    /// Runs queued main-thread tasks, then polls in-flight imports. Called
    /// once per frame.
    pub fn update(&mut self) {
        self.process_tasks();
        self.process_pending_imports();
    }

    /// Handle for queueing work onto this manager's main-thread queue.
    #[must_use]
    pub fn task_sender(&self) -> TaskSender {
        TaskSender(self.task_tx.clone())
    }

    fn process_tasks(&mut self) {
        // FIFO; tasks queued by a running task land in the next update.
        let queued: Vec<Task> = self.task_rx.try_iter().collect();
        for task in queued {
            task(self);
        }
    }

    // ========================================================================
    // Materials
    // ========================================================================

    fn upload_materials(&mut self) {
        let records: Vec<MaterialRecord> = self
            .materials
            .as_slice()
            .iter()
            .map(|material| *material.record())
            .collect();
        self.material_buffer.update(&records);
    }

    /// Registers a material and returns its stable ID.
    pub fn create_material(&mut self, material: Material) -> ResourceId {
        let id = self.registry.generate(ObjectType::Material);
        self.materials.insert(id, material);
        self.upload_materials();
        id
    }

    /// Removes a material, compacting the dense array. Returns the
    /// [`Message::MaterialDeleted`] the caller publishes after unlocking.
    pub fn delete_material(&mut self, id: ResourceId) -> Result<Message> {
        if id == self.default_material_id {
            return Err(AtelierError::DefaultResource("material"));
        }
        let Removal {
            removed_index,
            transfer_index,
            ..
        } = self
            .materials
            .remove(id)
            .ok_or(AtelierError::NotFound {
                object_type: ObjectType::Material,
                id,
            })?;
        self.upload_materials();
        Ok(Message::MaterialDeleted {
            removed_index,
            transfer_index,
        })
    }

    pub fn material_index(&self, id: ResourceId) -> Result<u32> {
        self.materials
            .index_of(id)
            .ok_or(AtelierError::NotFound {
                object_type: ObjectType::Material,
                id,
            })
    }

    pub fn material_mut(&mut self, id: ResourceId) -> Result<&mut Material> {
        self.materials.get_mut(id).ok_or(AtelierError::NotFound {
            object_type: ObjectType::Material,
            id,
        })
    }

    /// Re-uploads one material's record after in-place edits.
    pub fn commit_material(&mut self, id: ResourceId) -> Result<()> {
        let index = self.material_index(id)?;
        if let Some(material) = self.materials.get(id) {
            self.material_buffer
                .write_at(index as usize, material.record());
        }
        Ok(())
    }

    #[must_use]
    pub fn default_material(&self) -> MaterialRef {
        MaterialRef {
            id: self.default_material_id,
            index: DEFAULT_MATERIAL_INDEX,
        }
    }

    #[must_use]
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// The record at dense `index`, as a renderer would read it.
    #[must_use]
    pub fn material_record_at(&self, index: u32) -> Option<MaterialRecord> {
        self.materials.get_by_index(index).map(|m| *m.record())
    }

    /// The material currently backing dense `index`.
    #[must_use]
    pub fn material_id_at(&self, index: u32) -> Option<ResourceId> {
        self.materials.id_at(index)
    }

    /// Every registered material with its name, in dense order.
    pub fn materials(&self) -> impl Iterator<Item = (ResourceId, &str)> {
        self.materials
            .iter()
            .map(|(id, material)| (id, material.name.as_str()))
    }

    #[must_use]
    pub fn material_buffer(&self) -> &GpuBuffer {
        &self.material_buffer
    }

    // ========================================================================
    // Textures
    // ========================================================================

    fn upload_texture_handles(&mut self) {
        let handles: Vec<u64> = self
            .textures
            .as_slice()
            .iter()
            .map(|entry| entry.handle.as_u64())
            .collect();
        self.texture_handle_buffer.update(&handles);
    }

    /// Registers a texture, acquires its bindless handle and makes it
    /// resident.
    pub fn create_texture(&mut self, texture: Texture) -> Result<ResourceId> {
        let handle = self.bindless.acquire();
        self.bindless.make_resident(handle)?;
        let id = self.registry.generate(ObjectType::Texture);
        self.textures.insert(id, TextureEntry { texture, handle });
        self.upload_texture_handles();
        Ok(id)
    }

    /// Removes a texture, retiring its bindless handle and compacting the
    /// handle array. Returns the [`Message::TextureDeleted`] the caller
    /// publishes after unlocking; the manager rewrites its own material
    /// records when that message comes back around.
    pub fn delete_texture(&mut self, id: ResourceId) -> Result<Message> {
        if self.default_texture_ids.contains(&id) {
            return Err(AtelierError::DefaultResource("texture"));
        }
        let Removal {
            value,
            removed_index,
            transfer_index,
        } = self
            .textures
            .remove(id)
            .ok_or(AtelierError::NotFound {
                object_type: ObjectType::Texture,
                id,
            })?;
        self.bindless.make_non_resident(value.handle)?;
        self.upload_texture_handles();
        Ok(Message::TextureDeleted {
            removed_index,
            transfer_index,
        })
    }

    pub fn texture(&self, id: ResourceId) -> Result<&Texture> {
        self.textures
            .get(id)
            .map(|entry| &entry.texture)
            .ok_or(AtelierError::NotFound {
                object_type: ObjectType::Texture,
                id,
            })
    }

    pub fn texture_index(&self, id: ResourceId) -> Result<u32> {
        self.textures
            .index_of(id)
            .ok_or(AtelierError::NotFound {
                object_type: ObjectType::Texture,
                id,
            })
    }

    /// The texture currently backing bindless-array `index`.
    #[must_use]
    pub fn texture_id_at(&self, index: u32) -> Option<ResourceId> {
        self.textures.id_at(index)
    }

    /// Every registered texture with its name, in bindless-array order.
    pub fn textures(&self) -> impl Iterator<Item = (ResourceId, &str)> {
        self.textures
            .iter()
            .map(|(id, entry)| (id, entry.texture.name.as_str()))
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn resident_texture_count(&self) -> usize {
        self.bindless.resident_count()
    }

    fn on_texture_deleted(&mut self, removed_index: u32, transfer_index: Option<u32>) {
        let mut changed = false;
        for material in self.materials.values_mut() {
            changed |= material.on_texture_deleted(removed_index, transfer_index);
        }
        if changed {
            self.upload_materials();
        }
    }

    // ========================================================================
    // Meshes
    // ========================================================================

    /// Registers standalone geometry as an instanced mesh.
    pub fn create_mesh(&mut self, name: &str, geometry: MeshGeometry) -> ResourceId {
        let id = self.registry.generate(ObjectType::Mesh);
        self.meshes.insert(id, InstancedMesh::new(id, name, geometry));
        id
    }

    pub fn mesh(&self, id: ResourceId) -> Result<&InstancedMesh> {
        self.meshes.get(&id).ok_or(AtelierError::NotFound {
            object_type: ObjectType::Mesh,
            id,
        })
    }

    pub fn mesh_mut(&mut self, id: ResourceId) -> Result<&mut InstancedMesh> {
        self.meshes.get_mut(&id).ok_or(AtelierError::NotFound {
            object_type: ObjectType::Mesh,
            id,
        })
    }

    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ========================================================================
    // Models
    // ========================================================================

    pub fn model(&self, id: ResourceId) -> Result<Arc<Mutex<Model>>> {
        self.models.get(&id).cloned().ok_or(AtelierError::NotFound {
            object_type: ObjectType::Model,
            id,
        })
    }

    #[must_use]
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Every loaded model with its name.
    pub fn models(&self) -> impl Iterator<Item = (ResourceId, String)> + '_ {
        self.models
            .iter()
            .map(|(&id, model)| (id, model.lock().name.clone()))
    }

    #[must_use]
    pub fn is_loaded(&self, path: &Path) -> bool {
        self.loaded_paths.contains_key(path) || self.in_flight.contains(path)
    }

    /// Begins a background import. Rejects paths already loaded or in
    /// flight. The payload is ingested during a later [`Self::update`].
    pub fn import_model(
        &mut self,
        path: impl Into<PathBuf>,
        importer: Arc<dyn ModelImporter>,
    ) -> Result<()> {
        let path = path.into();
        if self.is_loaded(&path) {
            return Err(AtelierError::DuplicateImport(path));
        }
        self.in_flight.insert(path.clone());

        let (tx, rx) = flume::bounded(1);
        let worker_path = path.clone();
        runtime().spawn_blocking(move || {
            let result = importer.load(&worker_path);
            let _ = tx.send(result);
        });
        self.pending.push(PendingImport { path, receiver: rx });
        Ok(())
    }

    #[must_use]
    pub fn pending_import_count(&self) -> usize {
        self.pending.len()
    }

    fn process_pending_imports(&mut self) {
        let mut ready: Vec<(PathBuf, Result<LoadedModelData>)> = Vec::new();
        self.pending.retain(|pending| match pending.receiver.try_recv() {
            Ok(result) => {
                ready.push((pending.path.clone(), result));
                false
            }
            Err(flume::TryRecvError::Empty) => true,
            Err(flume::TryRecvError::Disconnected) => {
                ready.push((
                    pending.path.clone(),
                    Err(AtelierError::ImportFailed(
                        "import worker dropped its result".into(),
                    )),
                ));
                false
            }
        });

        for (path, result) in ready {
            self.in_flight.remove(&path);
            match result {
                Ok(data) => match self.ingest_model(data, path.clone()) {
                    Ok(model) => log::info!("imported {} as model {model}", path.display()),
                    Err(err) => log::error!("ingest of {} failed: {err}", path.display()),
                },
                // A failed import is dropped; nothing was registered.
                Err(err) => log::error!("import of {} failed: {err}", path.display()),
            }
        }
    }

    /// Turns an import payload into registered resources. Local indices in
    /// the payload become IDs; the model subscribes to resource events so it
    /// can track material compaction.
    pub fn ingest_model(&mut self, data: LoadedModelData, path: PathBuf) -> Result<ResourceId> {
        let bounds = data.compute_bounds();

        let mut texture_ids = Vec::with_capacity(data.textures.len());
        let mut texture_indices = Vec::with_capacity(data.textures.len());
        for texture in data.textures {
            let id = self.create_texture(texture)?;
            texture_indices.push(self.texture_index(id)?);
            texture_ids.push(id);
        }

        let mut material_ids = Vec::with_capacity(data.materials.len());
        let mut material_refs = Vec::with_capacity(data.materials.len());
        for loaded in &data.materials {
            let mut material = Material::new(loaded.name.as_str());
            {
                let record = material.record_mut();
                record.base_color_factor = loaded.base_color_factor;
                record.metallic_factor = loaded.metallic_factor;
                record.roughness_factor = loaded.roughness_factor;
                record.emission_factor = loaded.emission_factor;
            }
            for slot in TextureSlot::ALL {
                if let Some(local) = loaded.texture_slots[slot as usize] {
                    let index = texture_indices.get(local).copied().ok_or_else(|| {
                        AtelierError::ImportFailed(format!(
                            "material \"{}\" references texture {local} of {}",
                            loaded.name,
                            texture_indices.len()
                        ))
                    })?;
                    material.set_texture(slot, index);
                }
            }
            let id = self.create_material(material);
            material_refs.push(MaterialRef {
                id,
                index: self.material_index(id)?,
            });
            material_ids.push(id);
        }

        let mut mesh_ids = Vec::with_capacity(data.meshes.len());
        for loaded in &data.meshes {
            let geometry = MeshGeometry::from_data(&loaded.vertices, &loaded.indices, &loaded.name);
            mesh_ids.push(self.create_mesh(&loaded.name, geometry));
        }

        let model_id = self.registry.generate(ObjectType::Model);
        let mut model = Model::new(
            model_id,
            data.name.as_str(),
            path.clone(),
            self.default_material(),
        );
        for (local, mesh_id) in mesh_ids.iter().enumerate() {
            let material_name = data.meshes[local]
                .material
                .and_then(|m| data.materials.get(m))
                .map_or_else(|| "default".to_string(), |m| m.name.clone());
            model.add_mesh(*mesh_id, material_name);
        }
        for (loaded, material_ref) in data.materials.iter().zip(&material_refs) {
            model.map_material(&loaded.name, *material_ref);
        }
        model.root = convert_node(&data.root, &mesh_ids);
        model.bounds = bounds;

        let model = Arc::new(Mutex::new(model));
        let shared: SharedSubscriber = model.clone();
        self.bus.subscribe(Topic::Resources, &shared);

        self.models.insert(model_id, model);
        self.owned.insert(
            model_id,
            OwnedResources {
                materials: material_ids,
                textures: texture_ids,
            },
        );
        self.loaded_paths.insert(path, model_id);
        Ok(model_id)
    }

    /// Destroys a model, its meshes, and the materials and textures it
    /// brought in. Returns the messages the caller publishes after
    /// unlocking, [`Message::ModelDeleted`] first so scene consumers drop
    /// their instances before hearing about the compactions.
    pub fn delete_model(&mut self, id: ResourceId) -> Result<Vec<Message>> {
        let model = self.models.remove(&id).ok_or(AtelierError::NotFound {
            object_type: ObjectType::Model,
            id,
        })?;
        let (meshes, path) = {
            let guard = model.lock();
            (guard.meshes.clone(), guard.source_path.clone())
        };
        drop(model);
        self.loaded_paths.remove(&path);
        for mesh in &meshes {
            self.meshes.remove(mesh);
        }

        let mut messages = vec![Message::ModelDeleted { model: id, meshes }];
        if let Some(owned) = self.owned.remove(&id) {
            for material in owned.materials {
                match self.delete_material(material) {
                    Ok(message) => messages.push(message),
                    Err(err) => log::warn!("material cleanup for model {id}: {err}"),
                }
            }
            for texture in owned.textures {
                match self.delete_texture(texture) {
                    Ok(message) => messages.push(message),
                    Err(err) => log::warn!("texture cleanup for model {id}: {err}"),
                }
            }
        }
        Ok(messages)
    }
}

fn convert_node(node: &LoadedNode, mesh_ids: &[ResourceId]) -> ModelNode {
    let mut converted = ModelNode::new(node.name.as_str(), node.transform);
    converted.mesh = node.mesh.and_then(|local| mesh_ids.get(local).copied());
    converted.children = node
        .children
        .iter()
        .map(|child| convert_node(child, mesh_ids))
        .collect();
    converted
}

impl Subscriber for ResourceManager {
    fn notify(&mut self, message: &Message) {
        match message {
            Message::MeshInstanceUpdate {
                mesh,
                object,
                instance,
                material_index,
                transform,
            } => {
                if let Some(instanced) = self.meshes.get_mut(mesh) {
                    if let Err(err) =
                        instanced.update_instance(*instance, *object, *material_index, *transform)
                    {
                        log::warn!("stale instance update: {err}");
                    }
                } else {
                    log::trace!("instance update for unknown mesh {mesh}");
                }
            }
            Message::RemoveMeshInstance { mesh, instance } => {
                if let Some(instanced) = self.meshes.get_mut(mesh) {
                    if let Err(err) = instanced.remove_instance(*instance) {
                        log::warn!("stale instance release: {err}");
                    }
                } else {
                    // Normal after a model deletion: the mesh went away with
                    // its instances.
                    log::trace!("instance release for unknown mesh {mesh}");
                }
            }
            Message::TextureDeleted {
                removed_index,
                transfer_index,
            } => self.on_texture_deleted(*removed_index, *transfer_index),
            Message::ModelDeleted { .. }
            | Message::MaterialDeleted { .. }
            | Message::MaterialRemap { .. } => {}
        }
    }
}
