use crate::errors::Result;
use crate::resources::material::TextureSlot;

/// CPU-side texture: decoded RGBA8 pixels plus the descriptor a renderer
/// backend needs to create the GPU object.
#[derive(Debug, Clone)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pixels: Vec<u8>,
}

impl Texture {
    /// Wraps already-decoded RGBA8 pixel data.
    #[must_use]
    pub fn from_pixels(name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            name: name.into(),
            width,
            height,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            pixels,
        }
    }

    /// A 1x1 texture of a single color.
    #[must_use]
    pub fn solid(name: impl Into<String>, rgba: [u8; 4]) -> Self {
        Self::from_pixels(name, 1, 1, rgba.to_vec())
    }

    /// Decodes an encoded image (PNG, JPEG) into RGBA8.
    pub fn decode(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self::from_pixels(name, width, height, image.into_raw()))
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// The per-slot fallback textures, in [`TextureSlot`] order. They are
/// registered first so they occupy bindless-array indices `0..5`.
#[must_use]
pub fn default_textures() -> [Texture; TextureSlot::COUNT] {
    [
        Texture::solid("default_base_color", [255, 255, 255, 255]),
        // G = roughness 1.0, B = metallic 0.0
        Texture::solid("default_metallic_roughness", [255, 255, 0, 255]),
        // Flat +Z tangent-space normal
        Texture::solid("default_normal", [128, 128, 255, 255]),
        Texture::solid("default_occlusion", [255, 255, 255, 255]),
        Texture::solid("default_emission", [0, 0, 0, 255]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_slot() {
        let defaults = default_textures();
        assert_eq!(defaults.len(), TextureSlot::COUNT);
        for texture in &defaults {
            assert_eq!((texture.width, texture.height), (1, 1));
            assert_eq!(texture.pixels().len(), 4);
        }
    }
}
