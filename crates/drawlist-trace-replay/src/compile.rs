//! One headless frame of a scene on the recording device.

use std::fmt::Write as _;
use std::path::Path;

use drawlist_gpu::mesh::{
    JsonAssets, Material, Mesh, MeshFile, PrimGroup, Transform, VertexAttribute, VertexSlot,
};
use drawlist_gpu::{
    DrawListError, FrameView, Model, ProgramId, Programs, RecordingDevice, RenderConfig,
    RenderStats, Scene, SceneManifest, StreamSlot, SurfaceId,
};
use drawlist_protocol::{IndexFormat, Topology};
use glam::{Mat4, Vec3};
use tracing::info;

pub const DEMO_PROGRAMS: Programs = Programs {
    mesh: ProgramId(1),
    mesh_line: ProgramId(2),
    grid: ProgramId(3),
};
pub const TARGET_SURFACE: SurfaceId = SurfaceId(1);
pub const TARGET_WIDTH: u32 = 1280;
pub const TARGET_HEIGHT: u32 = 720;

const DEFAULT_EYE: Vec3 = Vec3::new(0.0, 1.0, 2.0);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchRow {
    pub model: String,
    pub index: usize,
    pub stream: StreamSlot,
    pub offset: usize,
    pub size: usize,
    pub state: u32,
    pub surface: u32,
}

#[derive(Clone, Debug)]
pub struct CompileReport {
    pub stats: RenderStats,
    pub batches: Vec<BatchRow>,
    /// Body stream of the first loaded model.
    pub tokens: Vec<u8>,
    pub draws: usize,
}

impl CompileReport {
    pub fn batch_table(&self) -> String {
        let mut out =
            String::from("model            batch  stream  offset    size  state  surface\n");
        for row in &self.batches {
            let stream = match row.stream {
                StreamSlot::Header => "header",
                StreamSlot::Body => "body",
            };
            let _ = writeln!(
                out,
                "{:<16} {:>5}  {:<6} {:>7} {:>7} {:>6} {:>8}",
                row.model, row.index, stream, row.offset, row.size, row.state, row.surface
            );
        }
        out
    }
}

/// A cube with a wire outline and a strip band. Mesh 0 is the usual empty placeholder.
pub fn demo_mesh_file() -> MeshFile {
    let corners = [
        [-1.0, -1.0, -1.0],
        [1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0],
    ];
    let positions = VertexSlot {
        data: corners.iter().flatten().copied().collect(),
    };
    let normals = VertexSlot {
        data: corners
            .iter()
            .flat_map(|c| Vec3::from_array(*c).normalize().to_array())
            .collect(),
    };
    let attributes = vec![
        VertexAttribute {
            slot: 0,
            stride: 12,
            components: 3,
            offset: 0,
        },
        VertexAttribute {
            slot: 1,
            stride: 12,
            components: 3,
            offset: 0,
        },
    ];

    let faces = PrimGroup {
        topology: Topology::Triangles,
        index_format: IndexFormat::U16,
        indices: vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, //
            3, 6, 2, 3, 7, 6, 1, 2, 6, 1, 6, 5, 0, 4, 7, 0, 7, 3,
        ],
        material: Some(0),
        ..PrimGroup::default()
    };
    let band = PrimGroup {
        topology: Topology::TriangleStrip,
        index_format: IndexFormat::U16,
        indices: vec![0, 4, 1, 5, 2, 6, 3, 7, 0, 4],
        material: Some(1),
        transform: Some(1),
        ..PrimGroup::default()
    };
    let outline = PrimGroup {
        topology: Topology::Lines,
        index_format: IndexFormat::U32,
        indices: vec![
            0, 1, 1, 2, 2, 3, 3, 0, 4, 5, 5, 6, 6, 7, 7, 4, 0, 4, 1, 5, 2, 6, 3, 7,
        ],
        material: Some(2),
        ..PrimGroup::default()
    };
    let solid = Mesh {
        name: String::from("cube"),
        attributes: attributes.clone(),
        slots: vec![positions.clone(), normals.clone()],
        prim_groups: vec![faces, band],
        transform: Some(0),
        ..Mesh::default()
    };
    let wire = Mesh {
        name: String::from("outline"),
        attributes,
        slots: vec![positions, normals],
        prim_groups: vec![outline],
        transform: Some(0),
        ..Mesh::default()
    };

    MeshFile {
        meshes: vec![Mesh::default(), solid, wire],
        materials: vec![
            Material {
                diffuse: Vec3::new(0.7, 0.7, 0.7),
            },
            Material {
                diffuse: Vec3::new(0.9, 0.4, 0.1),
            },
            Material {
                diffuse: Vec3::new(0.1, 0.1, 0.1),
            },
        ],
        transforms: vec![
            Transform {
                matrix: Mat4::IDENTITY,
            },
            Transform {
                matrix: Mat4::from_scale(Vec3::splat(1.01)),
            },
        ],
    }
}

fn frame_for(manifest: Option<&SceneManifest>) -> FrameView {
    let (eye, focus) = manifest
        .and_then(|m| m.camera.first())
        .map_or((DEFAULT_EYE, Vec3::ZERO), |k| (k.eye, k.focus));
    let aspect = TARGET_WIDTH as f32 / TARGET_HEIGHT as f32;
    FrameView {
        view: Mat4::look_at_rh(eye, focus, Vec3::Y),
        projection: Mat4::perspective_rh_gl(45f32.to_radians(), aspect, 0.01, 100.0),
        focus,
    }
}

/// Load `scene` (or the demo scene), run one frame with `config` and collect what was recorded.
pub fn compile_scene(
    mut config: RenderConfig,
    scene: Option<&Path>,
) -> Result<CompileReport, DrawListError> {
    let manifest = match scene {
        Some(path) => {
            if let Some(dir) = path.parent() {
                config.search_paths.push(dir.to_path_buf());
            }
            Some(SceneManifest::load(path)?)
        }
        None => None,
    };

    let mut dev = RecordingDevice::new();
    let mut world = Scene::init(&mut dev, DEMO_PROGRAMS, config.clone())?;
    match &manifest {
        Some(manifest) => world.load_manifest(&mut dev, &JsonAssets, manifest)?,
        None => {
            let model = Model::from_mesh_file(
                &mut dev,
                "demo",
                demo_mesh_file(),
                Vec3::ZERO,
                0.0,
                config.max_vertex_bytes(),
            )?;
            world.add_model(model);
        }
    }
    world.reshape(&mut dev, TARGET_WIDTH, TARGET_HEIGHT, TARGET_SURFACE)?;
    world.display(&mut dev, &frame_for(manifest.as_ref()))?;

    let mut batches = Vec::new();
    for model in world.models() {
        for (index, batch) in model.stream().batches.iter().enumerate() {
            batches.push(BatchRow {
                model: model.name().to_owned(),
                index,
                stream: batch.stream,
                offset: batch.offset,
                size: batch.size,
                state: batch.state.0,
                surface: batch.surface.0,
            });
        }
    }
    let tokens = world
        .models()
        .iter()
        .find(|m| m.is_loaded())
        .map(|m| m.stream().tokens.clone())
        .unwrap_or_default();
    let report = CompileReport {
        stats: world.stats(),
        batches,
        tokens,
        draws: dev.draws().len(),
    };
    info!(
        models = world.models().len(),
        draws = report.draws,
        "frame compiled"
    );
    world.shutdown(&mut dev);
    Ok(report)
}

