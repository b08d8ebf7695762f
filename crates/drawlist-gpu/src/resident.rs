//! Resident (address-stable) buffers and the packing of mesh geometry into them.

use bitflags::bitflags;

use crate::device::BufferId;
use crate::mesh::Mesh;

/// Alignment of every vertex slot and index range inside a packed buffer.
pub const GEOMETRY_ALIGNMENT: u64 = 256;

bitflags! {
    /// How the device may access a resident buffer after creation.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferAccess: u32 {
        const READ = 1 << 0;
        /// The CPU rewrites (part of) the buffer after creation.
        const WRITE = 1 << 1;
    }
}

/// A GPU allocation whose device address stays valid until it is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResidentBuffer {
    pub id: BufferId,
    pub address: u64,
    pub size: u64,
}

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

/// One vertex buffer and its companion index buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeometryChunk {
    pub vertices: Vec<u8>,
    pub indices: Vec<u8>,
}

/// Where a mesh's data landed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshPlacement {
    /// Index into [`PackedGeometry::chunks`].
    pub chunk: usize,
    /// Byte offset of each vertex slot in the chunk's vertex buffer.
    pub slot_offsets: Vec<u64>,
    /// Byte offset of each primitive group's indices; `None` for non-indexed groups.
    pub group_offsets: Vec<Option<u64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedGeometry {
    pub chunks: Vec<GeometryChunk>,
    pub placements: Vec<MeshPlacement>,
}

/// Pack every mesh's vertex slots and index arrays into as few chunks as possible.
///
/// A new chunk is started before a mesh once the current vertex buffer has grown past
/// `max_vertex_bytes`, so a chunk may exceed the limit by up to one mesh.
pub fn pack_geometry(meshes: &[Mesh], max_vertex_bytes: u64) -> PackedGeometry {
    let mut chunks = vec![GeometryChunk::default()];
    let mut placements = Vec::with_capacity(meshes.len());

    for mesh in meshes {
        if chunks[chunks.len() - 1].vertices.len() as u64 > max_vertex_bytes {
            chunks.push(GeometryChunk::default());
        }
        let chunk_index = chunks.len() - 1;
        let chunk = &mut chunks[chunk_index];

        let slot_offsets = mesh
            .slots
            .iter()
            .map(|slot| append_aligned(&mut chunk.vertices, slot.as_bytes()))
            .collect();
        let group_offsets = mesh
            .prim_groups
            .iter()
            .map(|group| {
                group
                    .is_indexed()
                    .then(|| append_aligned(&mut chunk.indices, &group.index_bytes()))
            })
            .collect();

        placements.push(MeshPlacement {
            chunk: chunk_index,
            slot_offsets,
            group_offsets,
        });
    }

    PackedGeometry { chunks, placements }
}

fn append_aligned(buf: &mut Vec<u8>, data: &[u8]) -> u64 {
    let offset = buf.len() as u64;
    let end = align_up(offset + data.len() as u64, GEOMETRY_ALIGNMENT);
    buf.extend_from_slice(data);
    buf.resize(end as usize, 0);
    offset
}
