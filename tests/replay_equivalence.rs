//! The hardware and emulation paths must issue the same draws for the same recorded stream.

use std::collections::BTreeSet;

use drawlist_gpu::device::{BufferTarget, ProgramId, SurfaceId};
use drawlist_gpu::mesh::{Mesh, MeshFile, PrimGroup, VertexAttribute, VertexSlot};
use drawlist_gpu::recording::{DeviceCall, DrawRecord};
use drawlist_gpu::{
    FrameView, GroupingStrategy, Model, Programs, RecordingDevice, RenderConfig, RenderPath,
    RenderStats, Scene,
};
use drawlist_protocol::{IndexFormat, Topology};
use glam::Vec3;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const PROGRAMS: Programs = Programs {
    mesh: ProgramId(1),
    mesh_line: ProgramId(2),
    grid: ProgramId(3),
};

fn run_frames(
    file: &MeshFile,
    path: RenderPath,
    grouping: GroupingStrategy,
) -> (Vec<DrawRecord>, RenderStats) {
    let mut dev = RecordingDevice::new();
    let config = RenderConfig {
        path,
        grouping,
        draw_grid: false,
        ..RenderConfig::default()
    };
    let mut scene = Scene::init(&mut dev, PROGRAMS, config).unwrap();
    let model =
        Model::from_mesh_file(&mut dev, "prop", file.clone(), Vec3::ZERO, 1.0, u64::MAX).unwrap();
    scene.add_model(model);
    scene.reshape(&mut dev, 320, 240, SurfaceId(5)).unwrap();
    scene.display(&mut dev, &FrameView::default()).unwrap();
    // A resize between frames must not change what is drawn, only where.
    scene.reshape(&mut dev, 640, 480, SurfaceId(6)).unwrap();
    dev.clear_log();
    scene.display(&mut dev, &FrameView::default()).unwrap();
    let stats = scene.stats();
    scene.shutdown(&mut dev);
    (dev.take_draws(), stats)
}

/// Every (attribute, address) pair bound while drawing one frame of `file`.
fn attribute_bindings(file: &MeshFile, path: RenderPath) -> BTreeSet<(u32, u64)> {
    let mut dev = RecordingDevice::new();
    let config = RenderConfig {
        path,
        draw_grid: false,
        ..RenderConfig::default()
    };
    let mut scene = Scene::init(&mut dev, PROGRAMS, config).unwrap();
    let model =
        Model::from_mesh_file(&mut dev, "prop", file.clone(), Vec3::ZERO, 1.0, u64::MAX).unwrap();
    scene.add_model(model);
    scene.reshape(&mut dev, 320, 240, SurfaceId(5)).unwrap();
    dev.clear_log();
    scene.display(&mut dev, &FrameView::default()).unwrap();
    let bindings = dev
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::AddressRange {
                target: BufferTarget::VertexAttrib(index),
                address,
                ..
            } => Some((*index, *address)),
            _ => None,
        })
        .collect();
    scene.shutdown(&mut dev);
    bindings
}

fn topology() -> impl Strategy<Value = Topology> {
    prop::sample::select(vec![
        Topology::Points,
        Topology::Lines,
        Topology::LineStrip,
        Topology::LineLoop,
        Topology::Triangles,
        Topology::TriangleStrip,
        Topology::TriangleFan,
        Topology::Quads,
        Topology::QuadStrip,
    ])
}

fn prim_group() -> impl Strategy<Value = PrimGroup> {
    (
        topology(),
        any::<bool>(),
        any::<bool>(),
        0u32..12,
        prop::option::of(0u32..2),
        prop::option::of(Just(0xFFFF_FFFFu32)),
    )
        .prop_map(|(topology, indexed, wide, count, material, restart)| PrimGroup {
            topology,
            index_format: if wide { IndexFormat::U32 } else { IndexFormat::U16 },
            indices: if indexed { (0..count).map(|i| i % 4).collect() } else { Vec::new() },
            vertex_count: if indexed { 0 } else { count },
            material,
            prim_restart_index: restart,
            ..PrimGroup::default()
        })
}

/// Vertices are 24 bytes apart, so an attribute reads either the first or the second half of a
/// vertex, from any slot the mesh has.
fn vertex_attribute(slots: usize) -> impl Strategy<Value = VertexAttribute> {
    (0..slots as u32, any::<bool>()).prop_map(|(slot, upper)| VertexAttribute {
        slot,
        stride: 24,
        components: 3,
        offset: if upper { 12 } else { 0 },
    })
}

fn mesh() -> impl Strategy<Value = Mesh> {
    (1usize..=2)
        .prop_flat_map(|slots| {
            (
                Just(slots),
                prop::collection::vec(vertex_attribute(slots), 1..=2),
                prop::collection::vec(prim_group(), 0..4),
            )
        })
        .prop_map(|(slots, attributes, prim_groups)| Mesh {
            attributes,
            slots: vec![
                VertexSlot {
                    data: vec![0.0; 24],
                };
                slots
            ],
            prim_groups,
            ..Mesh::default()
        })
}

fn mesh_file() -> impl Strategy<Value = MeshFile> {
    prop::collection::vec(mesh(), 1..4).prop_map(|meshes| MeshFile {
        meshes: std::iter::once(Mesh::default()).chain(meshes).collect(),
        ..MeshFile::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn hardware_and_emulation_draw_alike(file in mesh_file(), sorted in any::<bool>()) {
        let grouping = if sorted {
            GroupingStrategy::SortedByTopology
        } else {
            GroupingStrategy::Unsorted
        };
        let (hardware, hw_stats) = run_frames(&file, RenderPath::AddressIndirect, grouping);
        let (listed, _) = run_frames(&file, RenderPath::CompiledList, grouping);
        let (emulated, emu_stats) = run_frames(&file, RenderPath::Emulation, grouping);

        prop_assert_eq!(&hardware, &emulated);
        prop_assert_eq!(&hardware, &listed);
        prop_assert_eq!(hw_stats, emu_stats);
        prop_assert_eq!(hardware.len() as u64, hw_stats.drawcalls);
        prop_assert!(hardware.iter().all(|d| d.surface == SurfaceId(6)));
    }

    #[test]
    fn emulation_binds_attributes_where_the_baseline_path_does(file in mesh_file()) {
        let emulated = attribute_bindings(&file, RenderPath::Emulation);
        let immediate = attribute_bindings(&file, RenderPath::Immediate);
        prop_assert!(
            emulated.is_subset(&immediate),
            "emulated {:?} not within immediate {:?}",
            emulated,
            immediate
        );
    }
}

#[test]
fn two_mesh_scene_matches_across_paths() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let quad = |prim_groups| Mesh {
        attributes: vec![VertexAttribute {
            slot: 0,
            stride: 12,
            components: 3,
            offset: 0,
        }],
        slots: vec![VertexSlot {
            data: vec![0.0; 12],
        }],
        prim_groups,
        ..Mesh::default()
    };
    let file = MeshFile {
        meshes: vec![
            Mesh::default(),
            quad(vec![
                PrimGroup {
                    topology: Topology::Triangles,
                    indices: vec![0, 1, 2],
                    ..PrimGroup::default()
                },
                PrimGroup {
                    topology: Topology::TriangleStrip,
                    indices: vec![0, 1, 2, 3],
                    ..PrimGroup::default()
                },
                PrimGroup {
                    topology: Topology::Triangles,
                    vertex_count: 3,
                    ..PrimGroup::default()
                },
            ]),
            quad(vec![PrimGroup {
                topology: Topology::Lines,
                vertex_count: 4,
                ..PrimGroup::default()
            }]),
        ],
        ..MeshFile::default()
    };

    for grouping in [GroupingStrategy::Unsorted, GroupingStrategy::SortedByTopology] {
        let (hardware, _) = run_frames(&file, RenderPath::AddressIndirect, grouping);
        let (emulated, _) = run_frames(&file, RenderPath::Emulation, grouping);
        assert_eq!(hardware, emulated);

        let modes: Vec<_> = hardware.iter().map(|d| d.mode).collect();
        let expected = match grouping {
            GroupingStrategy::Unsorted => vec![
                Topology::Triangles,
                Topology::TriangleStrip,
                Topology::Triangles,
                Topology::Lines,
            ],
            GroupingStrategy::SortedByTopology => vec![
                Topology::Lines,
                Topology::Triangles,
                Topology::TriangleStrip,
                Topology::Triangles,
            ],
        };
        assert_eq!(modes, expected);
    }
}
