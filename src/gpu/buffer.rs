use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;
use parking_lot::{RwLock, RwLockReadGuard};

// Process-wide buffer ID generator.
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// CPU-side mirror of a GPU buffer.
///
/// Holds the authoritative byte image of vertex, index, uniform and storage
/// data; a renderer backend uploads whenever [`GpuBuffer::version`] moves
/// past the value it last saw. The version counter is atomic so dirty checks
/// never take the data lock.
#[derive(Debug)]
pub struct BufferData {
    pub id: u64,
    pub label: String,
    version: AtomicU64,
    data: RwLock<Vec<u8>>,
    pub usage: wgpu::BufferUsages,
}

/// Cheap shared handle to a [`BufferData`]. Equality and hashing go by
/// buffer ID.
#[derive(Debug, Clone)]
pub struct GpuBuffer(Arc<BufferData>);

impl PartialEq for GpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for GpuBuffer {}

impl std::hash::Hash for GpuBuffer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl GpuBuffer {
    fn with_bytes(data: Vec<u8>, usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self(Arc::new(BufferData {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            label: label.unwrap_or("Buffer").to_string(),
            version: AtomicU64::new(0),
            data: RwLock::new(data),
            usage,
        }))
    }

    #[must_use]
    pub fn new<T: Pod>(data: &[T], usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self::with_bytes(bytemuck::cast_slice(data).to_vec(), usage, label)
    }

    #[must_use]
    pub fn empty(usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self::with_bytes(Vec::new(), usage, label)
    }

    /// A zero-filled buffer of `capacity` bytes.
    #[must_use]
    pub fn zeroed(capacity: usize, usage: wgpu::BufferUsages, label: Option<&str>) -> Self {
        Self::with_bytes(vec![0u8; capacity], usage, label)
    }

    // Lock-free version read for upload dirty checks.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.0.version.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn usage(&self) -> wgpu::BufferUsages {
        self.0.usage
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Byte length of the current contents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.data.read().is_empty()
    }

    /// Replaces the whole contents and bumps the version.
    pub fn update<T: Pod>(&self, data: &[T]) {
        {
            let mut inner = self.0.data.write();
            *inner = bytemuck::cast_slice(data).to_vec();
        }
        self.0.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrites the bytes of one `T` at element index `index`. The buffer
    /// must already be large enough.
    pub fn write_at<T: Pod>(&self, index: usize, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        let offset = index * size_of::<T>();
        {
            let mut inner = self.0.data.write();
            debug_assert!(offset + bytes.len() <= inner.len());
            inner[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        self.0.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies one `T`-sized element from `src_index` to `dst_index` within
    /// the buffer.
    pub fn copy_element<T: Pod>(&self, src_index: usize, dst_index: usize) {
        if src_index == dst_index {
            return;
        }
        let stride = size_of::<T>();
        {
            let mut inner = self.0.data.write();
            let src = src_index * stride;
            let dst = dst_index * stride;
            debug_assert!(src + stride <= inner.len() && dst + stride <= inner.len());
            inner.copy_within(src..src + stride, dst);
        }
        self.0.version.fetch_add(1, Ordering::Relaxed);
    }

    /// Grows the buffer to `capacity` bytes, preserving existing contents.
    /// No-op if already at least that large.
    pub fn grow_to(&self, capacity: usize) {
        {
            let mut inner = self.0.data.write();
            if inner.len() >= capacity {
                return;
            }
            inner.resize(capacity, 0);
        }
        self.0.version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.0.data.read()
    }

    /// Reads the element at `index` as a `T`.
    #[must_use]
    pub fn read_element<T: Pod>(&self, index: usize) -> T {
        let stride = size_of::<T>();
        let inner = self.0.data.read();
        let offset = index * stride;
        *bytemuck::from_bytes(&inner[offset..offset + stride])
    }
}

impl std::ops::Deref for GpuBuffer {
    type Target = BufferData;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_at_bumps_version() {
        let buf = GpuBuffer::new(&[1u32, 2, 3, 4], wgpu::BufferUsages::STORAGE, None);
        let v0 = buf.version();
        buf.write_at(2, &99u32);
        assert!(buf.version() > v0);
        assert_eq!(buf.read_element::<u32>(2), 99);
    }

    #[test]
    fn copy_element_moves_within_buffer() {
        let buf = GpuBuffer::new(&[10u32, 20, 30], wgpu::BufferUsages::VERTEX, None);
        buf.copy_element::<u32>(2, 0);
        assert_eq!(buf.read_element::<u32>(0), 30);
        assert_eq!(buf.read_element::<u32>(2), 30);
    }

    #[test]
    fn grow_preserves_contents() {
        let buf = GpuBuffer::new(&[7u32], wgpu::BufferUsages::STORAGE, Some("grow"));
        buf.grow_to(16);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.read_element::<u32>(0), 7);
    }
}
