//! glTF 2.0 importer.
//!
//! Flattens each glTF primitive into its own mesh; a node whose glTF mesh
//! holds several primitives gets identity-transform child nodes for the
//! extras, so the hierarchy stays one-mesh-per-node.

use std::path::Path;

use glam::Mat4;

use crate::assets::importer::{LoadedMaterial, LoadedMesh, LoadedModelData, LoadedNode, ModelImporter};
use crate::errors::{AtelierError, Result};
use crate::resources::material::TextureSlot;
use crate::resources::mesh::Vertex;
use crate::resources::texture::Texture;

pub struct GltfImporter;

impl ModelImporter for GltfImporter {
    fn load(&self, path: &Path) -> Result<LoadedModelData> {
        let (document, buffers, images) = gltf::import(path)?;

        let textures = images
            .iter()
            .zip(document.images())
            .map(|(data, image)| {
                let name = image
                    .name()
                    .map_or_else(|| format!("texture_{}", image.index()), str::to_string);
                decode_image(&name, data)
            })
            .collect::<Result<Vec<_>>>()?;

        let materials = document
            .materials()
            .filter(|material| material.index().is_some())
            .map(convert_material)
            .collect::<Vec<_>>();

        // One entry per glTF mesh, listing the flattened indices of its
        // primitives.
        let mut meshes = Vec::new();
        let mut primitives_of = Vec::with_capacity(document.meshes().len());
        for mesh in document.meshes() {
            let mesh_name = mesh
                .name()
                .map_or_else(|| format!("mesh_{}", mesh.index()), str::to_string);
            let mut locals = Vec::new();
            for primitive in mesh.primitives() {
                locals.push(meshes.len());
                meshes.push(convert_primitive(&mesh_name, &primitive, &buffers)?);
            }
            primitives_of.push(locals);
        }

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| AtelierError::GltfError("file contains no scene".into()))?;

        let name = path
            .file_stem()
            .map_or_else(|| "model".to_string(), |stem| stem.to_string_lossy().into_owned());
        let root = LoadedNode {
            name: name.clone(),
            transform: Mat4::IDENTITY,
            mesh: None,
            children: scene
                .nodes()
                .map(|node| convert_node(&node, &primitives_of))
                .collect(),
        };

        Ok(LoadedModelData {
            name,
            textures,
            materials,
            meshes,
            root,
        })
    }
}

fn decode_image(name: &str, data: &gltf::image::Data) -> Result<Texture> {
    use gltf::image::Format;

    let pixel_count = (data.width * data.height) as usize;
    let rgba = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => {
            let mut out = Vec::with_capacity(pixel_count * 4);
            for rgb in data.pixels.chunks_exact(3) {
                out.extend_from_slice(rgb);
                out.push(255);
            }
            out
        }
        Format::R8G8 => {
            let mut out = Vec::with_capacity(pixel_count * 4);
            for rg in data.pixels.chunks_exact(2) {
                out.extend_from_slice(&[rg[0], rg[1], 0, 255]);
            }
            out
        }
        Format::R8 => {
            let mut out = Vec::with_capacity(pixel_count * 4);
            for &r in &data.pixels {
                out.extend_from_slice(&[r, r, r, 255]);
            }
            out
        }
        other => {
            return Err(AtelierError::GltfError(format!(
                "unsupported image format {other:?} in \"{name}\""
            )));
        }
    };
    Ok(Texture::from_pixels(name, data.width, data.height, rgba))
}

fn convert_material(material: gltf::Material<'_>) -> LoadedMaterial {
    let name = material.name().map_or_else(
        || format!("material_{}", material.index().unwrap_or(0)),
        str::to_string,
    );
    let pbr = material.pbr_metallic_roughness();

    let mut loaded = LoadedMaterial::new(name);
    loaded.base_color_factor = pbr.base_color_factor();
    loaded.metallic_factor = pbr.metallic_factor();
    loaded.roughness_factor = pbr.roughness_factor();
    loaded.emission_factor = material.emissive_factor();

    let slots = &mut loaded.texture_slots;
    if let Some(info) = pbr.base_color_texture() {
        slots[TextureSlot::BaseColor as usize] = Some(info.texture().source().index());
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        slots[TextureSlot::MetallicRoughness as usize] = Some(info.texture().source().index());
    }
    if let Some(normal) = material.normal_texture() {
        slots[TextureSlot::Normal as usize] = Some(normal.texture().source().index());
    }
    if let Some(occlusion) = material.occlusion_texture() {
        slots[TextureSlot::Occlusion as usize] = Some(occlusion.texture().source().index());
    }
    if let Some(info) = material.emissive_texture() {
        slots[TextureSlot::Emission as usize] = Some(info.texture().source().index());
    }
    loaded
}

fn convert_primitive(
    mesh_name: &str,
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<LoadedMesh> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| {
            AtelierError::GltfError(format!("primitive of \"{mesh_name}\" has no positions"))
        })?
        .collect();
    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map_or_else(|| vec![[0.0, 0.0, 1.0]; positions.len()], Iterator::collect);
    let uvs: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map_or_else(|| vec![[0.0, 0.0]; positions.len()], |uv| uv.into_f32().collect());

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, &position)| Vertex {
            position,
            normal: normals.get(i).copied().unwrap_or([0.0, 0.0, 1.0]),
            uv: uvs.get(i).copied().unwrap_or([0.0, 0.0]),
        })
        .collect();
    let indices = reader.read_indices().map_or_else(
        || (0..positions.len() as u32).collect(),
        |indices| indices.into_u32().collect(),
    );

    Ok(LoadedMesh {
        name: format!("{mesh_name}_{}", primitive.index()),
        vertices,
        indices,
        material: primitive.material().index(),
    })
}

fn convert_node(node: &gltf::Node<'_>, primitives_of: &[Vec<usize>]) -> LoadedNode {
    let name = node
        .name()
        .map_or_else(|| format!("node_{}", node.index()), str::to_string);
    let transform = Mat4::from_cols_array_2d(&node.transform().matrix());

    let primitives = node
        .mesh()
        .map(|mesh| primitives_of[mesh.index()].as_slice())
        .unwrap_or_default();

    let mut children: Vec<LoadedNode> = primitives
        .iter()
        .skip(1)
        .enumerate()
        .map(|(extra, &local)| LoadedNode {
            name: format!("{name}_primitive_{}", extra + 1),
            transform: Mat4::IDENTITY,
            mesh: Some(local),
            children: Vec::new(),
        })
        .collect();
    children.extend(node.children().map(|child| convert_node(&child, primitives_of)));

    LoadedNode {
        name,
        transform,
        mesh: primitives.first().copied(),
        children,
    }
}
