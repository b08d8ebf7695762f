mod common;

use common::*;
use drawlist_gpu::mesh::{Mesh, MeshFile};
use drawlist_gpu::recording::DeviceCall;
use drawlist_gpu::registry::StateRegistry;
use drawlist_gpu::{
    replay_batches, BatchList, DrawListError, EmulationError, FrameView, RecordingDevice,
    RenderConfig, RenderPath, StreamSlot, SurfaceId, TokenSources,
};
use drawlist_protocol::{HeaderTable, TokenOpcode, TokenWriter, Topology};
use pretty_assertions::assert_eq;

fn single_batch(
    dev: &mut RecordingDevice,
    mode: Topology,
    build: impl FnOnce(&mut TokenWriter),
) -> (Vec<u8>, BatchList, StateRegistry, HeaderTable) {
    let headers = HeaderTable::from_device(&*dev).unwrap();
    let mut registry = StateRegistry::new();
    let state = registry.capture_detached(dev, mode).unwrap();
    let mut w = TokenWriter::new(headers);
    build(&mut w);
    let tokens = w.finish();
    let mut batches = BatchList::new();
    batches.push(StreamSlot::Body, 0, tokens.len(), state, SURFACE);
    (tokens, batches, registry, headers)
}

#[test]
fn emulation_skips_redundant_state_applies() {
    let mut dev = RecordingDevice::new();
    let mut restart = indexed(Topology::Triangles, vec![0, 1, 2], None);
    restart.prim_restart_index = Some(7);
    let file = MeshFile {
        meshes: vec![
            Mesh::default(),
            mesh(1.0, vec![indexed(Topology::Triangles, vec![0, 1, 2], None), restart]),
        ],
        ..two_mesh_file()
    };
    let config = RenderConfig {
        path: RenderPath::Emulation,
        ..config()
    };
    let mut scene = scene_with(&mut dev, config, file);
    scene.display(&mut dev, &FrameView::default()).unwrap();

    let model = &scene.models()[0];
    let shared = scene.shared();
    let sources = TokenSources {
        header: shared.viewport.tokens(),
        body: &model.stream().tokens,
    };
    let report = replay_batches(
        &mut dev,
        &shared.headers,
        sources,
        &model.stream().batches,
        model.registry(),
    )
    .unwrap();
    assert_eq!(model.stream().batches.len(), 3);
    assert_eq!(report.state_applies, 2);
    assert_eq!(report.surface_binds, 1);
    assert_eq!(report.draws, 2);
}

#[test]
fn emulated_draws_follow_the_bound_mode_and_index_width() {
    let mut dev = RecordingDevice::new();
    let (tokens, batches, registry, headers) = single_batch(&mut dev, Topology::Triangles, |w| {
        w.element_address(0x4000, drawlist_protocol::IndexFormat::U16);
        w.draw_elements(Topology::TriangleStrip, 5);
        w.draw_arrays(Topology::Triangles, 3);
    });
    let sources = TokenSources {
        header: &[],
        body: &tokens,
    };
    replay_batches(&mut dev, &headers, sources, &batches, &registry).unwrap();

    let draws = dev.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].mode, Topology::TriangleStrip);
    assert_eq!(draws[0].index_format, Some(drawlist_protocol::IndexFormat::U16));
    assert_eq!(draws[1].mode, Topology::Triangles);
    assert!(draws.iter().all(|d| d.surface == SURFACE));
}

#[test]
fn stencil_and_alpha_tokens_are_not_emulated() {
    for opcode in [TokenOpcode::StencilRef, TokenOpcode::AlphaRef] {
        let mut dev = RecordingDevice::new();
        let (tokens, batches, registry, headers) =
            single_batch(&mut dev, Topology::Triangles, |w| {
                if opcode == TokenOpcode::StencilRef {
                    w.stencil_ref(1, 1);
                } else {
                    w.alpha_ref(0.5);
                }
            });
        let sources = TokenSources {
            header: &[],
            body: &tokens,
        };
        let err = replay_batches(&mut dev, &headers, sources, &batches, &registry).unwrap_err();
        assert_eq!(err, EmulationError::Unimplemented(opcode));
    }
}

#[test]
fn instanced_draws_must_match_the_bound_family() {
    let mut dev = RecordingDevice::new();
    let (tokens, batches, registry, headers) = single_batch(&mut dev, Topology::Triangles, |w| {
        w.draw_arrays_instanced(Topology::TriangleFan, 4, 2, 0, 0);
        w.draw_arrays_instanced(Topology::Lines, 2, 1, 0, 0);
    });
    let sources = TokenSources {
        header: &[],
        body: &tokens,
    };
    let err = replay_batches(&mut dev, &headers, sources, &batches, &registry).unwrap_err();
    assert!(matches!(
        err,
        EmulationError::TopologyMismatch {
            bound: Topology::Triangles,
            found: 0x1,
            ..
        }
    ));
    assert_eq!(dev.draws().len(), 1);
    assert_eq!(dev.draws()[0].instances, 2);
}

#[test]
fn emulation_rejects_the_window_framebuffer() {
    let mut dev = RecordingDevice::new();
    let (tokens, single, registry, headers) = single_batch(&mut dev, Topology::Lines, |w| {
        w.draw_arrays(Topology::Lines, 2);
    });
    let state = single.get(0).unwrap().state;
    let mut batches = BatchList::new();
    batches.push(StreamSlot::Body, 0, tokens.len(), state, SurfaceId(0));
    let sources = TokenSources {
        header: &[],
        body: &tokens,
    };
    let err = replay_batches(&mut dev, &headers, sources, &batches, &registry).unwrap_err();
    assert_eq!(err, EmulationError::MissingSurface { index: 0 });
}

#[test]
fn terminate_sequence_ends_only_its_batch() {
    let mut dev = RecordingDevice::new();
    let (tokens, mut batches, registry, headers) =
        single_batch(&mut dev, Topology::Points, |w| {
            w.draw_arrays(Topology::Points, 1);
            w.terminate_sequence();
            w.draw_arrays(Topology::Points, 9);
        });
    let state = batches.get(0).unwrap().state;
    batches.push(StreamSlot::Body, 0, 12, state, SURFACE);
    let sources = TokenSources {
        header: &[],
        body: &tokens,
    };
    let report = replay_batches(&mut dev, &headers, sources, &batches, &registry).unwrap();
    assert_eq!(report.draws, 2);
    assert!(dev.draws().iter().all(|d| d.count == 1));
}

#[test]
fn immediate_path_draws_without_tokens() {
    let mut dev = RecordingDevice::new();
    let config = RenderConfig {
        path: RenderPath::Immediate,
        ..config()
    };
    let mut scene = scene_with(&mut dev, config, two_mesh_file());
    scene.display(&mut dev, &FrameView::default()).unwrap();

    assert!(!scene.models()[0].is_recorded());
    assert_eq!(dev.live_states(), 0);
    let modes: Vec<_> = dev.draws().iter().map(|d| d.mode).collect();
    assert_eq!(modes, vec![Topology::Triangles, Topology::Lines]);
    assert_eq!(dev.draws()[0].first, 0);
    assert_eq!(dev.draws()[0].count, 6);
}

#[test]
fn compiled_list_and_address_paths_draw_the_same() {
    let mut draws = Vec::new();
    for path in [RenderPath::CompiledList, RenderPath::AddressIndirect] {
        let mut dev = RecordingDevice::new();
        let config = RenderConfig {
            path,
            ..config()
        };
        let mut scene = scene_with(&mut dev, config, two_mesh_file());
        scene.display(&mut dev, &FrameView::default()).unwrap();
        draws.push(dev.take_draws());
    }
    assert_eq!(draws[0].len(), 2);
    assert_eq!(draws[0], draws[1]);
}

#[test]
fn batch_cap_limits_address_submission() {
    let mut dev = RecordingDevice::new();
    let config = RenderConfig {
        max_batches: Some(2),
        ..config()
    };
    let mut scene = scene_with(&mut dev, config, two_mesh_file());
    scene.display(&mut dev, &FrameView::default()).unwrap();

    assert!(dev
        .calls()
        .contains(&DeviceCall::SubmitAddress { batches: 2 }));
    assert_eq!(dev.draws().len(), 1);
}

#[test]
fn token_paths_need_a_viewport_header() {
    let mut dev = RecordingDevice::new();
    let mut scene = drawlist_gpu::Scene::init(&mut dev, programs(), config()).unwrap();
    let err = scene.display(&mut dev, &FrameView::default()).unwrap_err();
    assert!(matches!(err, DrawListError::MissingViewportHeader));
}
