//! Read-only mesh asset model and the providers that load it.

use std::path::{Path, PathBuf};

use drawlist_protocol::{IndexFormat, Topology};
use glam::{Mat4, Vec3};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::device::AttribFormat;
use crate::error::AssetError;

/// Attribute slots a state key (and the emulation mirror) tracks.
pub const TRACKED_ATTRIB_SLOTS: usize = 2;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshFile {
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub diffuse: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub matrix: Mat4,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    #[serde(default)]
    pub name: String,
    pub attributes: Vec<VertexAttribute>,
    pub slots: Vec<VertexSlot>,
    #[serde(default)]
    pub prim_groups: Vec<PrimGroup>,
    /// Object transform shared by every group that has none of its own.
    #[serde(default)]
    pub transform: Option<u32>,
    #[serde(default)]
    pub bounds: Option<Aabb>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexAttribute {
    pub slot: u32,
    pub stride: u32,
    pub components: u32,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn format(&self) -> AttribFormat {
        AttribFormat {
            stride: self.stride,
            components: self.components,
            offset: self.offset,
        }
    }
}

/// Interleaved vertex data of one slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexSlot {
    pub data: Vec<f32>,
}

impl VertexSlot {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn size_bytes(&self) -> u64 {
        (self.data.len() * 4) as u64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimGroup {
    pub topology: Topology,
    #[serde(default)]
    pub index_format: IndexFormat,
    /// Empty for non-indexed groups.
    #[serde(default)]
    pub indices: Vec<u32>,
    /// Vertex count of a non-indexed group.
    #[serde(default)]
    pub vertex_count: u32,
    #[serde(default)]
    pub material: Option<u32>,
    #[serde(default)]
    pub transform: Option<u32>,
    #[serde(default)]
    pub prim_restart_index: Option<u32>,
}

impl Default for PrimGroup {
    fn default() -> Self {
        Self {
            topology: Topology::Triangles,
            index_format: IndexFormat::default(),
            indices: Vec::new(),
            vertex_count: 0,
            material: None,
            transform: None,
            prim_restart_index: None,
        }
    }
}

impl PrimGroup {
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Indices for indexed groups, vertices otherwise.
    pub fn element_count(&self) -> u32 {
        if self.is_indexed() {
            self.indices.len() as u32
        } else {
            self.vertex_count
        }
    }

    /// Little-endian index data in the group's index format. [`MeshFile::validate`] rejects
    /// 16-bit groups whose indices would not fit.
    pub fn index_bytes(&self) -> Vec<u8> {
        match self.index_format {
            IndexFormat::U16 => self
                .indices
                .iter()
                .flat_map(|&i| (i as u16).to_le_bytes())
                .collect(),
            IndexFormat::U32 => self.indices.iter().flat_map(|&i| i.to_le_bytes()).collect(),
        }
    }
}

impl MeshFile {
    /// Reject data the packed buffers cannot represent.
    pub fn validate(&self) -> Result<(), AssetError> {
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            for (group_index, group) in mesh.prim_groups.iter().enumerate() {
                if group.index_format != IndexFormat::U16 {
                    continue;
                }
                // A 32-bit restart value truncates to the 16-bit one.
                let restart = group.prim_restart_index;
                let too_wide = group
                    .indices
                    .iter()
                    .find(|&&i| i > u32::from(u16::MAX) && Some(i) != restart);
                if let Some(&index) = too_wide {
                    return Err(AssetError::IndexOutOfRange {
                        mesh: mesh_index,
                        group: group_index,
                        index,
                        format: group.index_format,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Mesh {
    /// Layout of the tracked attribute slots; untracked or missing slots are zeroed.
    pub fn layout(&self) -> [AttribFormat; TRACKED_ATTRIB_SLOTS] {
        let mut layout = [AttribFormat::default(); TRACKED_ATTRIB_SLOTS];
        for (dst, attr) in layout.iter_mut().zip(&self.attributes) {
            *dst = attr.format();
        }
        layout
    }

    /// Bounds of the first attribute, read as positions.
    pub fn compute_bounds(&self) -> Option<Aabb> {
        let attr = self.attributes.first()?;
        let slot = self.slots.get(attr.slot as usize)?;
        if attr.components < 3 || attr.stride == 0 {
            return None;
        }
        let stride = (attr.stride / 4) as usize;
        let first = (attr.offset / 4) as usize;

        let mut bounds: Option<Aabb> = None;
        let mut at = first;
        while at + 3 <= slot.data.len() {
            let p = Vec3::new(slot.data[at], slot.data[at + 1], slot.data[at + 2]);
            bounds = Some(match bounds {
                Some(b) => Aabb {
                    min: b.min.min(p),
                    max: b.max.max(p),
                },
                None => Aabb { min: p, max: p },
            });
            at += stride.max(1);
        }
        bounds
    }
}

/// Source of parsed mesh files.
pub trait AssetProvider {
    fn load(&self, path: &Path) -> Result<MeshFile, AssetError>;
}

/// Reads mesh files stored as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonAssets;

impl AssetProvider for JsonAssets {
    fn load(&self, path: &Path) -> Result<MeshFile, AssetError> {
        let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| AssetError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Assets registered up front, looked up by exact path.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAssets {
    files: HashMap<PathBuf, MeshFile>,
}

impl InMemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, file: MeshFile) {
        self.files.insert(path.into(), file);
    }
}

impl AssetProvider for InMemoryAssets {
    fn load(&self, path: &Path) -> Result<MeshFile, AssetError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_follow_stride_and_offset() {
        let mesh = Mesh {
            attributes: vec![VertexAttribute {
                slot: 0,
                stride: 24,
                components: 3,
                offset: 0,
            }],
            // position, normal, position, normal
            slots: vec![VertexSlot {
                data: vec![
                    -1.0, 2.0, 0.0, 9.0, 9.0, 9.0, //
                    3.0, -4.0, 5.0, 9.0, 9.0, 9.0,
                ],
            }],
            ..Mesh::default()
        };
        let b = mesh.compute_bounds().unwrap();
        assert_eq!(b.min, Vec3::new(-1.0, -4.0, 0.0));
        assert_eq!(b.max, Vec3::new(3.0, 2.0, 5.0));
    }

    #[test]
    fn index_bytes_follow_format() {
        let mut group = PrimGroup {
            indices: vec![1, 0x0102],
            ..PrimGroup::default()
        };
        assert_eq!(group.index_bytes(), vec![1, 0, 2, 1]);
        group.indices = vec![1, 0x1_0002];
        group.index_format = IndexFormat::U32;
        assert_eq!(group.index_bytes(), vec![1, 0, 0, 0, 2, 0, 1, 0]);
    }

    #[test]
    fn wide_indices_in_a_short_group_are_rejected() {
        let group = |index_format, indices| PrimGroup {
            index_format,
            indices,
            ..PrimGroup::default()
        };
        let file = |group| MeshFile {
            meshes: vec![
                Mesh::default(),
                Mesh {
                    prim_groups: vec![PrimGroup::default(), group],
                    ..Mesh::default()
                },
            ],
            ..MeshFile::default()
        };

        let err = file(group(IndexFormat::U16, vec![0, 0x1_0000]))
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            AssetError::IndexOutOfRange {
                mesh: 1,
                group: 1,
                index: 0x1_0000,
                ..
            }
        ));
        assert!(file(group(IndexFormat::U16, vec![0, 0xFFFF])).validate().is_ok());
        assert!(file(group(IndexFormat::U32, vec![0, 0x1_0000])).validate().is_ok());

        let mut restart = group(IndexFormat::U16, vec![0, 1, u32::MAX, 2]);
        restart.prim_restart_index = Some(u32::MAX);
        assert!(file(restart).validate().is_ok());
    }

    #[test]
    fn mesh_file_parses_from_json() {
        let json = r#"{
            "meshes": [{
                "attributes": [{ "slot": 0, "stride": 12, "components": 3, "offset": 0 }],
                "slots": [{ "data": [0, 0, 0, 1, 0, 0, 0, 1, 0] }],
                "prim_groups": [{ "topology": "triangle_strip", "vertex_count": 3 }]
            }],
            "materials": [{ "diffuse": [1.0, 0.5, 0.25] }]
        }"#;
        let file: MeshFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.meshes[0].prim_groups[0].topology, Topology::TriangleStrip);
        assert_eq!(file.meshes[0].prim_groups[0].element_count(), 3);
        assert_eq!(file.materials[0].diffuse, Vec3::new(1.0, 0.5, 0.25));
    }

    #[test]
    fn in_memory_assets_miss_is_not_found() {
        let assets = InMemoryAssets::new();
        assert!(matches!(
            assets.load(Path::new("missing.json")),
            Err(AssetError::NotFound(_))
        ));
    }
}
