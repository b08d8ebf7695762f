//! Shared fixtures for `drawlist-gpu` integration tests.

#![allow(dead_code)]

use drawlist_gpu::device::{ProgramId, SurfaceId};
use drawlist_gpu::mesh::{
    Material, Mesh, MeshFile, PrimGroup, Transform, VertexAttribute, VertexSlot,
};
use drawlist_gpu::{Model, Programs, RecordingDevice, RenderConfig, Scene};
use drawlist_protocol::{IndexFormat, Topology};
use glam::{Mat4, Vec3};

pub const SURFACE: SurfaceId = SurfaceId(7);

pub fn programs() -> Programs {
    Programs {
        mesh: ProgramId(10),
        mesh_line: ProgramId(11),
        grid: ProgramId(12),
    }
}

pub fn position_attribute() -> VertexAttribute {
    VertexAttribute {
        slot: 0,
        stride: 12,
        components: 3,
        offset: 0,
    }
}

/// A quad's four corners in the XY plane, spanning `0..=extent`.
pub fn mesh(extent: f32, prim_groups: Vec<PrimGroup>) -> Mesh {
    Mesh {
        name: String::from("fixture"),
        attributes: vec![position_attribute()],
        slots: vec![VertexSlot {
            data: vec![
                0.0, 0.0, 0.0, //
                extent, 0.0, 0.0, //
                extent, extent, 0.0, //
                0.0, extent, 0.0,
            ],
        }],
        prim_groups,
        ..Mesh::default()
    }
}

/// The same quad with a normal interleaved after each position in one slot.
pub fn interleaved_mesh(prim_groups: Vec<PrimGroup>) -> Mesh {
    let attribute = |offset| VertexAttribute {
        slot: 0,
        stride: 24,
        components: 3,
        offset,
    };
    Mesh {
        name: String::from("interleaved"),
        attributes: vec![attribute(0), attribute(12)],
        slots: vec![VertexSlot {
            data: vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, //
                1.0, 1.0, 0.0, 0.0, 0.0, 1.0, //
                0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
            ],
        }],
        prim_groups,
        ..Mesh::default()
    }
}

pub fn indexed(topology: Topology, indices: Vec<u32>, material: Option<u32>) -> PrimGroup {
    PrimGroup {
        topology,
        index_format: IndexFormat::U32,
        indices,
        material,
        ..PrimGroup::default()
    }
}

pub fn arrays(topology: Topology, vertex_count: u32, material: Option<u32>) -> PrimGroup {
    PrimGroup {
        topology,
        vertex_count,
        material,
        ..PrimGroup::default()
    }
}

pub fn materials() -> Vec<Material> {
    vec![
        Material {
            diffuse: Vec3::new(0.8, 0.2, 0.2),
        },
        Material {
            diffuse: Vec3::new(0.2, 0.8, 0.2),
        },
    ]
}

/// Placeholder mesh 0, a triangle mesh and a line mesh.
pub fn two_mesh_file() -> MeshFile {
    MeshFile {
        meshes: vec![
            Mesh::default(),
            mesh(1.0, vec![indexed(Topology::Triangles, vec![0, 1, 2, 0, 2, 3], Some(0))]),
            mesh(1.0, vec![arrays(Topology::Lines, 4, Some(1))]),
        ],
        materials: materials(),
        transforms: vec![Transform {
            matrix: Mat4::IDENTITY,
        }],
    }
}

pub fn config() -> RenderConfig {
    RenderConfig {
        draw_grid: false,
        ..RenderConfig::default()
    }
}

/// A scene holding `file` as its only model, already reshaped onto [`SURFACE`].
pub fn scene_with(dev: &mut RecordingDevice, config: RenderConfig, file: MeshFile) -> Scene {
    let max_vertex_bytes = config.max_vertex_bytes();
    let mut scene = Scene::init(dev, programs(), config).unwrap();
    let model =
        Model::from_mesh_file(dev, "fixture", file, Vec3::ZERO, 1.0, max_vertex_bytes).unwrap();
    scene.add_model(model);
    scene.reshape(dev, 640, 480, SURFACE).unwrap();
    scene
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
