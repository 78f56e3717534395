use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Dense index of the built-in fallback material. It is created before any
/// user material and never deleted, so index 0 is always valid.
pub const DEFAULT_MATERIAL_INDEX: u32 = 0;

/// PBR shading workflow selector, stored as a raw `u32` in the GPU record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Workflow {
    #[default]
    MetallicRoughness = 0,
    SpecularGlossiness = 1,
}

// ============================================================================
// Texture Slots
// ============================================================================

/// The texture inputs a material samples. Each slot has a dedicated 1x1
/// default texture occupying the matching low index of the bindless handle
/// array, so a cleared slot always points at defined data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum TextureSlot {
    BaseColor = 0,
    MetallicRoughness = 1,
    Normal = 2,
    Occlusion = 3,
    Emission = 4,
}

impl TextureSlot {
    pub const COUNT: usize = 5;

    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::BaseColor,
        TextureSlot::MetallicRoughness,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Emission,
    ];

    /// The bindless-array index of this slot's default texture.
    #[inline]
    #[must_use]
    pub fn default_texture_index(self) -> u32 {
        self as u32
    }
}

// ============================================================================
// GPU Record
// ============================================================================

/// One element of the material storage buffer. Field order is padding-free
/// for std430; 80 bytes per material.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialRecord {
    pub base_color_factor: [f32; 4],
    pub emission_factor: [f32; 3],
    pub workflow: u32,
    /// Indices into the bindless texture-handle array, one per
    /// [`TextureSlot`].
    pub texture_indices: [u32; TextureSlot::COUNT],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub occlusion_strength: f32,
    pub tiling: [f32; 2],
    pub offset: [f32; 2],
}

impl Default for MaterialRecord {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE.to_array(),
            emission_factor: Vec3::ZERO.to_array(),
            workflow: Workflow::MetallicRoughness as u32,
            texture_indices: std::array::from_fn(|slot| slot as u32),
            metallic_factor: 0.0,
            roughness_factor: 1.0,
            occlusion_strength: 1.0,
            tiling: Vec2::ONE.to_array(),
            offset: Vec2::ZERO.to_array(),
        }
    }
}

// ============================================================================
// Material
// ============================================================================

/// A named material and its GPU record.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    record: MaterialRecord,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record: MaterialRecord::default(),
        }
    }

    #[must_use]
    pub fn record(&self) -> &MaterialRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut MaterialRecord {
        &mut self.record
    }

    #[must_use]
    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.record.base_color_factor = color.to_array();
        self
    }

    #[must_use]
    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.record.metallic_factor = metallic;
        self.record.roughness_factor = roughness;
        self
    }

    /// Points `slot` at a texture's bindless-array index.
    pub fn set_texture(&mut self, slot: TextureSlot, index: u32) {
        self.record.texture_indices[slot as usize] = index;
    }

    /// Resets `slot` to its default texture.
    pub fn clear_texture(&mut self, slot: TextureSlot) {
        self.record.texture_indices[slot as usize] = slot.default_texture_index();
    }

    #[must_use]
    pub fn texture_index(&self, slot: TextureSlot) -> u32 {
        self.record.texture_indices[slot as usize]
    }

    /// Applies a texture-array compaction to this material's slots.
    ///
    /// Slots holding `removed_index` fall back to their default texture;
    /// when a swap occurred, slots holding `transfer_index` are rewritten to
    /// `removed_index`. Returns whether any slot changed.
    pub fn on_texture_deleted(&mut self, removed_index: u32, transfer_index: Option<u32>) -> bool {
        let mut changed = false;
        for slot in TextureSlot::ALL {
            let held = self.record.texture_indices[slot as usize];
            if held == removed_index {
                self.record.texture_indices[slot as usize] = slot.default_texture_index();
                changed = true;
            } else if transfer_index == Some(held) {
                self.record.texture_indices[slot as usize] = removed_index;
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_padding_free() {
        assert_eq!(size_of::<MaterialRecord>(), 80);
    }

    #[test]
    fn default_slots_point_at_default_textures() {
        let material = Material::new("default");
        for slot in TextureSlot::ALL {
            assert_eq!(material.texture_index(slot), slot.default_texture_index());
        }
    }

    #[test]
    fn texture_deletion_rewrites_slots() {
        let mut material = Material::new("wood");
        material.set_texture(TextureSlot::BaseColor, 9);
        material.set_texture(TextureSlot::Normal, 12);

        // Index 9 removed, former last index 12 swapped into 9.
        let changed = material.on_texture_deleted(9, Some(12));
        assert!(changed);
        assert_eq!(
            material.texture_index(TextureSlot::BaseColor),
            TextureSlot::BaseColor.default_texture_index()
        );
        assert_eq!(material.texture_index(TextureSlot::Normal), 9);
    }

    #[test]
    fn unaffected_material_reports_no_change() {
        let mut material = Material::new("plain");
        assert!(!material.on_texture_deleted(42, Some(43)));
    }
}
