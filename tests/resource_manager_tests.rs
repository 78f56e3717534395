//! Resource Manager Integration Tests
//!
//! Tests for:
//! - Built-in defaults: fallback material and per-slot textures
//! - ID/index/name query surface over the three collections
//! - Material/texture deletion: compaction messages and guards
//! - Texture deletion fan-out into material records via the bus
//! - Background import lifecycle: duplicates, failures, ingest
//! - Main-thread task queue ordering

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use atelier::assets::importer::{LoadedMaterial, LoadedMesh, LoadedModelData, LoadedNode};
use atelier::assets::ModelImporter;
use atelier::errors::Result;
use atelier::notify::{Message, NotificationBus, SharedSubscriber, Topic};
use atelier::registry::IdRegistry;
use atelier::resources::material::{Material, TextureSlot};
use atelier::resources::mesh::Vertex;
use atelier::resources::texture::Texture;
use atelier::resources::ResourceManager;
use atelier::AtelierError;

fn new_manager() -> ResourceManager {
    ResourceManager::new(Arc::new(IdRegistry::new()), NotificationBus::new())
}

fn shared_manager() -> (Arc<Mutex<ResourceManager>>, NotificationBus) {
    let bus = NotificationBus::new();
    let manager = Arc::new(Mutex::new(ResourceManager::new(
        Arc::new(IdRegistry::new()),
        bus.clone(),
    )));
    let subscriber: SharedSubscriber = manager.clone();
    bus.subscribe(Topic::Resources, &subscriber);
    bus.subscribe(Topic::Scene, &subscriber);
    (manager, bus)
}

fn triangle() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        Vertex {
            position: [0.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
        },
        Vertex {
            position: [1.0, 0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [1.0, 0.0],
        },
        Vertex {
            position: [0.0, 1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 1.0],
        },
    ];
    (vertices, vec![0, 1, 2])
}

fn stub_payload(name: &str) -> LoadedModelData {
    let (vertices, indices) = triangle();
    let mut material = LoadedMaterial::new("stub_material");
    material.base_color_factor = [1.0, 0.0, 0.0, 1.0];
    material.texture_slots[TextureSlot::BaseColor as usize] = Some(0);

    LoadedModelData {
        name: name.to_string(),
        textures: vec![Texture::solid("stub_texture", [10, 20, 30, 255])],
        materials: vec![material],
        meshes: vec![LoadedMesh {
            name: "stub_mesh".to_string(),
            vertices,
            indices,
            material: Some(0),
        }],
        root: LoadedNode {
            name: name.to_string(),
            transform: Mat4::IDENTITY,
            mesh: None,
            children: vec![LoadedNode {
                name: "stub_mesh_node".to_string(),
                transform: Mat4::IDENTITY,
                mesh: Some(0),
                children: Vec::new(),
            }],
        },
    }
}

struct StubImporter;

impl ModelImporter for StubImporter {
    fn load(&self, path: &Path) -> Result<LoadedModelData> {
        Ok(stub_payload(&path.display().to_string()))
    }
}

struct FailingImporter;

impl ModelImporter for FailingImporter {
    fn load(&self, _path: &Path) -> Result<LoadedModelData> {
        Err(AtelierError::ImportFailed("corrupt file".to_string()))
    }
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pump_until(manager: &Arc<Mutex<ResourceManager>>, done: impl Fn(&ResourceManager) -> bool) {
    for _ in 0..500 {
        let mut guard = manager.lock();
        guard.update();
        if done(&guard) {
            return;
        }
        drop(guard);
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("import did not settle in time");
}

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn manager_starts_with_fallback_resources() {
    let manager = new_manager();
    assert_eq!(manager.material_count(), 1);
    assert_eq!(manager.default_material().index, 0);
    assert_eq!(manager.texture_count(), TextureSlot::COUNT);
    assert_eq!(manager.resident_texture_count(), TextureSlot::COUNT);

    // The default material samples the default texture of every slot.
    let record = manager.material_record_at(0).unwrap();
    for slot in TextureSlot::ALL {
        assert_eq!(
            record.texture_indices[slot as usize],
            slot.default_texture_index()
        );
    }
}

#[test]
fn defaults_cannot_be_deleted() {
    let mut manager = new_manager();
    let default_material = manager.default_material().id;
    assert!(matches!(
        manager.delete_material(default_material),
        Err(AtelierError::DefaultResource("material"))
    ));
}

// ============================================================================
// Material Deletion
// ============================================================================

#[test]
fn deleting_last_material_reports_no_transfer() {
    let mut manager = new_manager();
    let id = manager.create_material(Material::new("only"));

    let message = manager.delete_material(id).unwrap();
    assert!(matches!(
        message,
        Message::MaterialDeleted {
            removed_index: 1,
            transfer_index: None,
        }
    ));
    assert_eq!(manager.material_count(), 1);
}

#[test]
fn deleting_middle_material_reports_transfer() {
    let mut manager = new_manager();
    let first = manager.create_material(Material::new("first"));
    let second = manager.create_material(Material::new("second"));

    let message = manager.delete_material(first).unwrap();
    assert!(matches!(
        message,
        Message::MaterialDeleted {
            removed_index: 1,
            transfer_index: Some(2),
        }
    ));
    // The survivor now answers at the vacated index.
    assert_eq!(manager.material_index(second).unwrap(), 1);
    assert_eq!(manager.material_id_at(1), Some(second));
    assert_eq!(manager.material_id_at(2), None);
    assert_eq!(manager.material_record_at(2), None);
}

#[test]
fn deleting_unknown_material_is_an_error() {
    let mut manager = new_manager();
    let id = manager.create_material(Material::new("gone"));
    manager.delete_material(id).unwrap();
    assert!(manager.delete_material(id).is_err());
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn collections_enumerate_ids_and_names() {
    let mut manager = new_manager();
    let material = manager.create_material(Material::new("crate"));
    let texture = manager
        .create_texture(Texture::solid("wood", [1, 2, 3, 255]))
        .unwrap();
    let model = manager
        .ingest_model(stub_payload("crate"), PathBuf::from("models/crate.gltf"))
        .unwrap();

    let materials: Vec<_> = manager.materials().collect();
    assert_eq!(materials.len(), manager.material_count());
    assert!(materials.contains(&(material, "crate")));

    let textures: Vec<_> = manager.textures().collect();
    assert_eq!(textures.len(), manager.texture_count());
    assert!(textures.contains(&(texture, "wood")));

    let models: Vec<_> = manager.models().collect();
    assert_eq!(models, vec![(model, "crate".to_string())]);
}

#[test]
fn texture_lookups_resolve_both_directions() {
    let mut manager = new_manager();
    let id = manager
        .create_texture(Texture::solid("wood", [120, 90, 40, 255]))
        .unwrap();

    let index = manager.texture_index(id).unwrap();
    assert_eq!(manager.texture_id_at(index), Some(id));
    assert_eq!(manager.texture(id).unwrap().pixels(), &[120, 90, 40, 255]);

    manager.delete_texture(id).unwrap();
    assert!(matches!(
        manager.texture(id),
        Err(AtelierError::NotFound { .. })
    ));
    assert_eq!(manager.texture_id_at(index), None);
}

// ============================================================================
// Texture Deletion Fan-out
// ============================================================================

#[test]
fn texture_deletion_rewrites_material_records() {
    let (manager, bus) = shared_manager();

    let (texture_id, material_id) = {
        let mut guard = manager.lock();
        let texture_id = guard
            .create_texture(Texture::solid("wood", [120, 90, 40, 255]))
            .unwrap();
        let texture_index = guard.texture_index(texture_id).unwrap();
        assert_eq!(texture_index, 5);

        let mut material = Material::new("crate");
        material.set_texture(TextureSlot::BaseColor, texture_index);
        (texture_id, guard.create_material(material))
    };

    // Publish after unlocking, exactly like the owning layer does.
    let message = manager.lock().delete_texture(texture_id).unwrap();
    bus.publish(Topic::Resources, &message);

    let guard = manager.lock();
    let index = guard.material_index(material_id).unwrap();
    let record = guard.material_record_at(index).unwrap();
    assert_eq!(
        record.texture_indices[TextureSlot::BaseColor as usize],
        TextureSlot::BaseColor.default_texture_index()
    );
    assert_eq!(guard.resident_texture_count(), TextureSlot::COUNT);
}

// ============================================================================
// Imports
// ============================================================================

#[test]
fn import_ingests_on_a_later_update() {
    init_logs();
    let (manager, _bus) = shared_manager();
    manager
        .lock()
        .import_model("models/crate.gltf", Arc::new(StubImporter))
        .unwrap();
    assert_eq!(manager.lock().pending_import_count(), 1);

    pump_until(&manager, |m| m.model_count() == 1);

    let guard = manager.lock();
    assert_eq!(guard.pending_import_count(), 0);
    assert_eq!(guard.mesh_count(), 1);
    assert_eq!(guard.material_count(), 2);
    assert_eq!(guard.texture_count(), TextureSlot::COUNT + 1);
    assert!(guard.is_loaded(Path::new("models/crate.gltf")));
}

#[test]
fn duplicate_import_is_rejected_while_in_flight() {
    let (manager, _bus) = shared_manager();
    let mut guard = manager.lock();
    guard
        .import_model("models/crate.gltf", Arc::new(StubImporter))
        .unwrap();

    let second = guard.import_model("models/crate.gltf", Arc::new(StubImporter));
    assert!(matches!(second, Err(AtelierError::DuplicateImport(_))));
}

#[test]
fn failed_import_is_dropped_and_retryable() {
    init_logs();
    let (manager, _bus) = shared_manager();
    manager
        .lock()
        .import_model("models/broken.gltf", Arc::new(FailingImporter))
        .unwrap();

    pump_until(&manager, |m| m.pending_import_count() == 0);

    let mut guard = manager.lock();
    assert_eq!(guard.model_count(), 0);
    assert_eq!(guard.mesh_count(), 0);

    // The failed path is free for another attempt.
    assert!(guard
        .import_model("models/broken.gltf", Arc::new(StubImporter))
        .is_ok());
}

// ============================================================================
// Model Deletion Cascade
// ============================================================================

#[test]
fn deleting_a_model_cascades_to_its_resources() {
    let mut manager = new_manager();
    let model = manager
        .ingest_model(stub_payload("crate"), PathBuf::from("models/crate.gltf"))
        .unwrap();
    assert_eq!(manager.model_count(), 1);
    assert_eq!(manager.mesh_count(), 1);
    assert_eq!(manager.material_count(), 2);
    assert_eq!(manager.texture_count(), TextureSlot::COUNT + 1);

    // Template bounds cover the stub triangle.
    let bounds = manager.model(model).unwrap().lock().bounds;
    assert_eq!(bounds.min, Vec3::ZERO);
    assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));

    let messages = manager.delete_model(model).unwrap();

    assert_eq!(manager.model_count(), 0);
    assert_eq!(manager.mesh_count(), 0);
    assert_eq!(manager.material_count(), 1);
    assert_eq!(manager.texture_count(), TextureSlot::COUNT);
    assert_eq!(manager.resident_texture_count(), TextureSlot::COUNT);
    assert!(!manager.is_loaded(Path::new("models/crate.gltf")));

    // The model event leads so scene consumers drop instances first.
    assert!(matches!(
        messages[0],
        Message::ModelDeleted { model: m, ref meshes } if m == model && meshes.len() == 1
    ));
    assert!(messages
        .iter()
        .skip(1)
        .any(|m| matches!(m, Message::MaterialDeleted { .. })));
    assert!(messages
        .iter()
        .skip(1)
        .any(|m| matches!(m, Message::TextureDeleted { .. })));
}

#[test]
fn deleted_model_frees_its_path_for_reimport() {
    let mut manager = new_manager();
    let path = PathBuf::from("models/crate.gltf");
    let model = manager.ingest_model(stub_payload("crate"), path.clone()).unwrap();
    manager.delete_model(model).unwrap();

    assert!(manager.ingest_model(stub_payload("crate"), path).is_ok());
}

// ============================================================================
// Task Queue
// ============================================================================

#[test]
fn tasks_run_in_submission_order() {
    let mut manager = new_manager();
    let order = Arc::new(Mutex::new(Vec::new()));
    let sender = manager.task_sender();

    for step in 0..3 {
        let order = order.clone();
        sender.submit(move |_manager| order.lock().push(step));
    }
    assert!(order.lock().is_empty());

    manager.update();
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn tasks_can_mutate_the_manager() {
    let mut manager = new_manager();
    let sender = manager.task_sender();
    sender.submit(|manager| {
        manager.create_material(Material::new("queued"));
    });

    manager.update();
    assert_eq!(manager.material_count(), 2);
}
