//! Uniform buffer layouts. Every table entry is 256 bytes so an entry's address is
//! `table_address + id * 256`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::mesh::{Material, Transform};

pub const UBO_LIGHT: u16 = 0;
pub const UBO_MATRIX: u16 = 1;
pub const UBO_MATERIAL: u16 = 2;
pub const UBO_MATRIXOBJ: u16 = 3;

pub const UNIFORM_ENTRY_BYTES: u64 = 256;

/// Light direction shared by every model.
pub const LIGHT_DIRECTION: Vec3 = Vec3::new(0.4, 0.8, 0.3);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MatrixBufferGlobal {
    pub world: Mat4,
    pub view_projection: Mat4,
    pub _pad: [Vec4; 8],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MatrixBufferObject {
    pub object: Mat4,
    pub _pad: [Vec4; 12],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialBuffer {
    pub diffuse: Vec3,
    pub alpha: f32,
    pub _pad: [Vec4; 15],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightBuffer {
    pub direction: Vec3,
    pub _pad0: f32,
    pub _pad: [Vec4; 15],
}

const _: () = {
    assert!(core::mem::size_of::<MatrixBufferGlobal>() == UNIFORM_ENTRY_BYTES as usize);
    assert!(core::mem::size_of::<MatrixBufferObject>() == UNIFORM_ENTRY_BYTES as usize);
    assert!(core::mem::size_of::<MaterialBuffer>() == UNIFORM_ENTRY_BYTES as usize);
    assert!(core::mem::size_of::<LightBuffer>() == UNIFORM_ENTRY_BYTES as usize);
};

impl MatrixBufferGlobal {
    pub fn new(world: Mat4, view_projection: Mat4) -> Self {
        Self {
            world,
            view_projection,
            ..Zeroable::zeroed()
        }
    }
}

impl LightBuffer {
    pub fn new(direction: Vec3) -> Self {
        Self {
            direction,
            ..Zeroable::zeroed()
        }
    }
}

/// Address of entry `id` in a table starting at `base`.
pub fn entry_address(base: u64, id: u32) -> u64 {
    base + u64::from(id) * UNIFORM_ENTRY_BYTES
}

/// Material table. Near-black diffuse colors are replaced by white so unlit assets stay visible.
pub fn material_table(materials: &[Material]) -> Vec<MaterialBuffer> {
    materials
        .iter()
        .map(|m| {
            let diffuse = if m.diffuse.length() <= 0.1 {
                Vec3::ONE
            } else {
                m.diffuse
            };
            MaterialBuffer {
                diffuse,
                alpha: 1.0,
                ..Zeroable::zeroed()
            }
        })
        .collect()
}

pub fn transform_table(transforms: &[Transform]) -> Vec<MatrixBufferObject> {
    transforms
        .iter()
        .map(|t| MatrixBufferObject {
            object: t.matrix,
            ..Zeroable::zeroed()
        })
        .collect()
}
