//! Instanced mesh and its per-instance GPU records.
//!
//! Every renderable mesh draws all of its scene instances with one call, so
//! per-instance data (transform, normal matrix, owning object, material)
//! lives densely packed in a single instance buffer. Instance slots compact
//! on release: the last record moves into the vacated slot and the
//! bidirectional ID/slot maps are patched, keeping records `0..count`
//! contiguous at all times.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::{AtelierError, Result};
use crate::gpu::GpuBuffer;
use crate::registry::ResourceId;

/// Per-mesh instance handle, issued by [`InstancedMesh::add_instance`] and
/// never reused within its mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// One element of the instance buffer. Padding-free at 144 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model matrix, widened to 4x4 for stride.
    pub normal: [[f32; 4]; 4],
    /// Owning scene object's ID, for GPU-side picking.
    pub object_id: u64,
    pub material_index: u32,
    pub _pad: u32,
}

impl InstanceRecord {
    const STRIDE: usize = size_of::<InstanceRecord>();

    #[must_use]
    pub fn new(object: ResourceId, material_index: u32, transform: Mat4) -> Self {
        let normal = Mat4::from_mat3(Mat3::from_mat4(transform).inverse().transpose());
        Self {
            model: transform.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
            object_id: object.as_u64(),
            material_index,
            _pad: 0,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    /// Inverted extents, the identity of [`union`](Self::union).
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[must_use]
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        vertices.iter().fold(Self::EMPTY, |bounds, vertex| {
            bounds.including(Vec3::from_array(vertex.position))
        })
    }

    #[must_use]
    pub fn including(mut self, point: Vec3) -> Self {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
        self
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Axis-aligned box enclosing all eight corners under `transform`.
    #[must_use]
    pub fn transformed(self, transform: Mat4) -> Self {
        if self.is_empty() {
            return self;
        }
        let mut out = Self::EMPTY;
        for corner in 0..8u8 {
            let point = Vec3::new(
                if corner & 1 == 0 { self.min.x } else { self.max.x },
                if corner & 2 == 0 { self.min.y } else { self.max.y },
                if corner & 4 == 0 { self.min.z } else { self.max.z },
            );
            out = out.including(transform.transform_point3(point));
        }
        out
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.min.x > self.max.x
    }

    #[must_use]
    pub fn center(self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(self) -> Vec3 {
        self.max - self.min
    }
}

/// Interleaved vertex layout shared by all imported geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Shared geometry buffers, uploaded once at ingest.
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
    pub index_count: u32,
}

impl MeshGeometry {
    #[must_use]
    pub fn from_data(vertices: &[Vertex], indices: &[u32], label: &str) -> Self {
        Self {
            vertex_buffer: GpuBuffer::new(
                vertices,
                wgpu::BufferUsages::VERTEX,
                Some(&format!("{label}_vertices")),
            ),
            index_buffer: GpuBuffer::new(
                indices,
                wgpu::BufferUsages::INDEX,
                Some(&format!("{label}_indices")),
            ),
            index_count: indices.len() as u32,
        }
    }
}

const INITIAL_CAPACITY: u32 = 4;

/// Geometry plus the dense instance array drawn with it.
pub struct InstancedMesh {
    pub id: ResourceId,
    pub name: String,
    pub geometry: MeshGeometry,
    instance_buffer: GpuBuffer,
    next_instance: u32,
    count: u32,
    capacity: u32,
    slot_of: FxHashMap<InstanceId, u32>,
    id_at: FxHashMap<u32, InstanceId>,
}

impl InstancedMesh {
    #[must_use]
    pub fn new(id: ResourceId, name: impl Into<String>, geometry: MeshGeometry) -> Self {
        let name = name.into();
        let instance_buffer = GpuBuffer::zeroed(
            INITIAL_CAPACITY as usize * InstanceRecord::STRIDE,
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            Some(&format!("{name}_instances")),
        );
        Self {
            id,
            name,
            geometry,
            instance_buffer,
            next_instance: 0,
            count: 0,
            capacity: INITIAL_CAPACITY,
            slot_of: FxHashMap::default(),
            id_at: FxHashMap::default(),
        }
    }

    /// Claims the next dense slot, writes its initial record and returns the
    /// instance ID. The record stays live from the moment the slot counts,
    /// so a renderer reading the mirror never sees a zeroed instance;
    /// transform propagation refines it afterwards.
    pub fn add_instance(
        &mut self,
        transform: Mat4,
        object: ResourceId,
        material_index: u32,
    ) -> InstanceId {
        if self.count == self.capacity {
            self.grow();
        }
        let instance = InstanceId(self.next_instance);
        self.next_instance += 1;

        let slot = self.count;
        self.count += 1;
        self.slot_of.insert(instance, slot);
        self.id_at.insert(slot, instance);
        let record = InstanceRecord::new(object, material_index, transform);
        self.instance_buffer.write_at(slot as usize, &record);
        instance
    }

    // Capacity doubles; a linear growth schedule reallocates too often for
    // models instantiated in bulk.
    fn grow(&mut self) {
        self.capacity *= 2;
        self.instance_buffer
            .grow_to(self.capacity as usize * InstanceRecord::STRIDE);
    }

    /// Overwrites the record in `instance`'s slot.
    pub fn update_instance(
        &mut self,
        instance: InstanceId,
        object: ResourceId,
        material_index: u32,
        transform: Mat4,
    ) -> Result<()> {
        let slot = self.slot_of(instance)?;
        let record = InstanceRecord::new(object, material_index, transform);
        self.instance_buffer.write_at(slot as usize, &record);
        Ok(())
    }

    /// Rewrites only the material index of `instance`'s record.
    pub fn set_instance_material(&mut self, instance: InstanceId, material_index: u32) -> Result<()> {
        let slot = self.slot_of(instance)?;
        let mut record: InstanceRecord = self.instance_buffer.read_element(slot as usize);
        record.material_index = material_index;
        self.instance_buffer.write_at(slot as usize, &record);
        Ok(())
    }

    /// Releases `instance`'s slot, compacting the dense array.
    pub fn remove_instance(&mut self, instance: InstanceId) -> Result<()> {
        let slot = self.slot_of(instance)?;
        self.slot_of.remove(&instance);
        self.id_at.remove(&slot);

        let last_slot = self.count - 1;
        if slot != last_slot {
            // Move the last record into the hole and repoint its maps.
            self.instance_buffer
                .copy_element::<InstanceRecord>(last_slot as usize, slot as usize);
            let moved = self.id_at.remove(&last_slot).unwrap();
            self.id_at.insert(slot, moved);
            self.slot_of.insert(moved, slot);
        }
        self.count -= 1;
        Ok(())
    }

    /// Dense slot currently held by `instance`.
    pub fn slot_of(&self, instance: InstanceId) -> Result<u32> {
        self.slot_of
            .get(&instance)
            .copied()
            .ok_or(AtelierError::UnknownInstance {
                mesh: self.id,
                instance,
            })
    }

    #[must_use]
    pub fn instance_count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn instance_buffer(&self) -> &GpuBuffer {
        &self.instance_buffer
    }

    /// Record currently stored at dense `slot`.
    #[must_use]
    pub fn record_at(&self, slot: u32) -> InstanceRecord {
        debug_assert!(slot < self.count);
        self.instance_buffer.read_element(slot as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_record_is_padding_free() {
        assert_eq!(size_of::<InstanceRecord>(), 144);
    }

    #[test]
    fn bounds_union_and_transform() {
        let unit = BoundingBox::EMPTY
            .including(Vec3::ZERO)
            .including(Vec3::ONE);
        assert_eq!(unit.center(), Vec3::splat(0.5));
        assert_eq!(unit.size(), Vec3::ONE);

        let shifted = unit.transformed(Mat4::from_translation(Vec3::X * 2.0));
        assert_eq!(shifted.min, Vec3::new(2.0, 0.0, 0.0));

        let combined = unit.union(shifted);
        assert_eq!(combined.max, Vec3::new(3.0, 1.0, 1.0));
        assert!(combined.union(BoundingBox::EMPTY) == combined);
    }
}
