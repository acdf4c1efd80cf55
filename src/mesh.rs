// Mesh import - OBJ models via tobj
//
// Loads a model into per-mesh entries that share one vertex/index buffer
// pair on the GPU. The vertex layout is configurable so the pipeline and the
// packed buffer always agree on stride and attribute offsets.

use anyhow::{Context, Result};
use ash::vk;
use glam::{Vec2, Vec3};
use std::path::Path;

/// A single interleaved vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexComponent {
    Position,
    Normal,
    Color,
    Uv,
    Tangent,
    Bitangent,
    /// One float of padding
    DummyFloat,
    /// Four floats of padding
    DummyVec4,
}

impl VertexComponent {
    pub fn float_count(self) -> u32 {
        match self {
            VertexComponent::Uv => 2,
            VertexComponent::DummyFloat => 1,
            VertexComponent::DummyVec4 => 4,
            _ => 3,
        }
    }

    pub fn format(self) -> vk::Format {
        match self.float_count() {
            1 => vk::Format::R32_SFLOAT,
            2 => vk::Format::R32G32_SFLOAT,
            4 => vk::Format::R32G32B32A32_SFLOAT,
            _ => vk::Format::R32G32B32_SFLOAT,
        }
    }
}

/// Ordered list of components making up one packed vertex
#[derive(Debug, Clone)]
pub struct VertexLayout {
    components: Vec<VertexComponent>,
}

impl VertexLayout {
    pub fn new(components: Vec<VertexComponent>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[VertexComponent] {
        &self.components
    }

    /// Size of one packed vertex in bytes
    pub fn stride(&self) -> u32 {
        self.components
            .iter()
            .map(|component| component.float_count() * std::mem::size_of::<f32>() as u32)
            .sum()
    }

    pub fn binding_description(&self, binding: u32) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(binding)
            .stride(self.stride())
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// One attribute per component, locations and offsets in layout order
    pub fn attribute_descriptions(&self, binding: u32) -> Vec<vk::VertexInputAttributeDescription> {
        let mut offset = 0;
        self.components
            .iter()
            .enumerate()
            .map(|(location, component)| {
                let attribute = vk::VertexInputAttributeDescription::builder()
                    .binding(binding)
                    .location(location as u32)
                    .format(component.format())
                    .offset(offset)
                    .build();
                offset += component.float_count() * std::mem::size_of::<f32>() as u32;
                attribute
            })
            .collect()
    }
}

/// Imported vertex with every attribute a layout may ask for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub color: Vec3,
}

/// One mesh of the imported model
#[derive(Debug, Clone)]
pub struct MeshEntry {
    pub name: String,
    pub material_index: Option<usize>,
    /// Running vertex offset of this entry in the shared vertex buffer
    pub vertex_base: u32,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

/// Model-space bounding box over all entries
#[derive(Debug, Clone, Copy)]
pub struct Dimension {
    pub min: Vec3,
    pub max: Vec3,
    pub size: Vec3,
}

impl Default for Dimension {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
            size: Vec3::ZERO,
        }
    }
}

/// Import-time transform applied to every vertex
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub scale: Vec3,
    pub center: Vec3,
    pub uv_scale: Vec2,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            center: Vec3::ZERO,
            uv_scale: Vec2::ONE,
        }
    }
}

/// Parameters for one indexed draw out of the shared buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
}

/// A fully imported model, ready to be packed into GPU buffers
#[derive(Debug, Clone)]
pub struct MeshData {
    pub entries: Vec<MeshEntry>,
    pub dimension: Dimension,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl MeshData {
    /// Load an OBJ file. Faces are triangulated and point/line primitives are
    /// dropped on import.
    pub fn load<P: AsRef<Path>>(path: P, options: &ImportOptions) -> Result<Self> {
        let path = path.as_ref();
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ignore_points: true,
                ignore_lines: true,
                ..Default::default()
            },
        )
        .with_context(|| format!("Failed to load model {:?}", path))?;

        // A missing .mtl is fine, colors just fall back to white
        let materials = materials.unwrap_or_else(|e| {
            log::debug!("No material library for {:?}: {}", path, e);
            Vec::new()
        });

        let mut entries = Vec::with_capacity(models.len());
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut vertex_base = 0u32;
        let mut index_count = 0u32;

        for model in models {
            let mesh = model.mesh;
            let vertex_count = mesh.positions.len() / 3;
            if vertex_count == 0 {
                log::warn!("Skipping empty mesh '{}' in {:?}", model.name, path);
                continue;
            }

            let has_normals = !mesh.normals.is_empty();
            if !has_normals {
                log::warn!("Mesh '{}' has no normals, filling with zeroes", model.name);
            }
            let has_uvs = !mesh.texcoords.is_empty();

            let color = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .and_then(|material| material.diffuse)
                .map(Vec3::from)
                .unwrap_or(Vec3::ONE);

            let mut vertices = Vec::with_capacity(vertex_count);
            for v in 0..vertex_count {
                let source = Vec3::new(
                    mesh.positions[3 * v],
                    mesh.positions[3 * v + 1],
                    mesh.positions[3 * v + 2],
                );

                // Bounds track the source positions, before the Y flip below
                min = min.min(source);
                max = max.max(source);

                let normal = if has_normals {
                    Vec3::new(
                        mesh.normals[3 * v],
                        mesh.normals[3 * v + 1],
                        mesh.normals[3 * v + 2],
                    )
                } else {
                    Vec3::ZERO
                };

                let uv = if has_uvs {
                    Vec2::new(mesh.texcoords[2 * v], 1.0 - mesh.texcoords[2 * v + 1])
                        * options.uv_scale
                } else {
                    Vec2::ZERO
                };

                vertices.push(MeshVertex {
                    // OBJ has Y up, our clip space points it down
                    position: Vec3::new(source.x, -source.y, source.z) * options.scale
                        + options.center,
                    normal,
                    uv,
                    color,
                });
            }

            index_count += mesh.indices.len() as u32;
            entries.push(MeshEntry {
                name: model.name,
                material_index: mesh.material_id,
                vertex_base,
                vertices,
                indices: mesh.indices,
            });
            vertex_base += vertex_count as u32;
        }

        if vertex_base == 0 {
            anyhow::bail!("Model {:?} contains no geometry", path);
        }

        let min = min * options.scale + options.center;
        let max = max * options.scale + options.center;
        let dimension = Dimension {
            min,
            max,
            size: max - min,
        };

        Ok(Self {
            entries,
            dimension,
            vertex_count: vertex_base,
            index_count,
        })
    }

    /// Interleave all entries into one buffer following `layout`
    pub fn pack_vertices(&self, layout: &VertexLayout) -> Vec<f32> {
        let floats_per_vertex = (layout.stride() as usize) / std::mem::size_of::<f32>();
        let mut data = Vec::with_capacity(self.vertex_count as usize * floats_per_vertex);

        for entry in &self.entries {
            for vertex in &entry.vertices {
                for component in layout.components() {
                    match component {
                        VertexComponent::Position => {
                            data.extend_from_slice(&vertex.position.to_array())
                        }
                        VertexComponent::Normal => {
                            data.extend_from_slice(&vertex.normal.to_array())
                        }
                        VertexComponent::Color => data.extend_from_slice(&vertex.color.to_array()),
                        VertexComponent::Uv => data.extend_from_slice(&vertex.uv.to_array()),
                        // OBJ import carries no tangent basis
                        VertexComponent::Tangent | VertexComponent::Bitangent => {
                            data.extend_from_slice(&[0.0; 3])
                        }
                        VertexComponent::DummyFloat => data.push(0.0),
                        VertexComponent::DummyVec4 => data.extend_from_slice(&[0.0; 4]),
                    }
                }
            }
        }
        data
    }

    /// Concatenate entry indices into one buffer plus per-entry draw ranges
    pub fn flatten_indices(&self) -> (Vec<u32>, Vec<DrawRange>) {
        let mut indices = Vec::with_capacity(self.index_count as usize);
        let mut ranges = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            ranges.push(DrawRange {
                first_index: indices.len() as u32,
                index_count: entry.indices.len() as u32,
                vertex_offset: entry.vertex_base as i32,
            });
            indices.extend_from_slice(&entry.indices);
        }
        (indices, ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry(base: u32, positions: &[Vec3], indices: &[u32]) -> MeshEntry {
        MeshEntry {
            name: "test".to_string(),
            material_index: None,
            vertex_base: base,
            vertices: positions
                .iter()
                .map(|&position| MeshVertex {
                    position,
                    normal: Vec3::Z,
                    uv: Vec2::ZERO,
                    color: Vec3::ONE,
                })
                .collect(),
            indices: indices.to_vec(),
        }
    }

    #[test]
    fn component_sizes() {
        assert_eq!(VertexComponent::Position.float_count(), 3);
        assert_eq!(VertexComponent::Uv.float_count(), 2);
        assert_eq!(VertexComponent::DummyFloat.float_count(), 1);
        assert_eq!(VertexComponent::DummyVec4.float_count(), 4);
        assert_eq!(VertexComponent::Uv.format(), vk::Format::R32G32_SFLOAT);
        assert_eq!(VertexComponent::Normal.format(), vk::Format::R32G32B32_SFLOAT);
        assert_eq!(
            VertexComponent::DummyVec4.format(),
            vk::Format::R32G32B32A32_SFLOAT
        );
    }

    #[test]
    fn layout_stride_and_offsets() {
        let layout = VertexLayout::new(vec![
            VertexComponent::Position,
            VertexComponent::Uv,
            VertexComponent::Color,
        ]);
        assert_eq!(layout.stride(), (3 + 2 + 3) * 4);

        let attributes = layout.attribute_descriptions(0);
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[2].offset, 20);
        assert_eq!(attributes[2].location, 2);

        let binding = layout.binding_description(0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn packing_follows_layout_order() {
        let entry = test_entry(0, &[Vec3::new(1.0, 2.0, 3.0)], &[0]);
        let mesh = MeshData {
            entries: vec![entry],
            dimension: Dimension::default(),
            vertex_count: 1,
            index_count: 1,
        };

        let layout = VertexLayout::new(vec![
            VertexComponent::Position,
            VertexComponent::DummyFloat,
            VertexComponent::Color,
        ]);
        let data = mesh.pack_vertices(&layout);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn flatten_offsets_accumulate() {
        let first = test_entry(0, &[Vec3::ZERO; 3], &[0, 1, 2]);
        let second = test_entry(3, &[Vec3::ZERO; 4], &[0, 1, 2, 2, 3, 0]);
        let mesh = MeshData {
            entries: vec![first, second],
            dimension: Dimension::default(),
            vertex_count: 7,
            index_count: 9,
        };

        let (indices, ranges) = mesh.flatten_indices();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 2, 3, 0]);
        assert_eq!(
            ranges,
            vec![
                DrawRange {
                    first_index: 0,
                    index_count: 3,
                    vertex_offset: 0
                },
                DrawRange {
                    first_index: 3,
                    index_count: 6,
                    vertex_offset: 3
                },
            ]
        );
    }

    #[test]
    fn load_cube_obj() {
        let mesh = MeshData::load("models/cube.obj", &ImportOptions::default()).unwrap();
        assert_eq!(mesh.entries.len(), 1);
        // Six faces with per-face normals make 24 unique corners
        assert_eq!(mesh.vertex_count, 24);
        assert_eq!(mesh.index_count, 36);
        assert!(mesh.dimension.min.abs_diff_eq(Vec3::splat(-0.5), 1e-6));
        assert!(mesh.dimension.max.abs_diff_eq(Vec3::splat(0.5), 1e-6));
        assert!(mesh.dimension.size.abs_diff_eq(Vec3::ONE, 1e-6));
        // No material library, colors fall back to white
        assert!(mesh.entries[0].vertices[0].color.abs_diff_eq(Vec3::ONE, 1e-6));
    }

    #[test]
    fn import_options_scale_and_center() {
        let options = ImportOptions {
            scale: Vec3::splat(2.0),
            center: Vec3::new(0.0, 1.0, 0.0),
            uv_scale: Vec2::ONE,
        };
        let mesh = MeshData::load("models/cube.obj", &options).unwrap();
        assert!(mesh.dimension.size.abs_diff_eq(Vec3::splat(2.0), 1e-6));
        assert!(mesh
            .dimension
            .min
            .abs_diff_eq(Vec3::new(-1.0, 0.0, -1.0), 1e-6));
        assert!(mesh
            .dimension
            .max
            .abs_diff_eq(Vec3::new(1.0, 2.0, 1.0), 1e-6));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(MeshData::load("models/nope.obj", &ImportOptions::default()).is_err());
    }
}
