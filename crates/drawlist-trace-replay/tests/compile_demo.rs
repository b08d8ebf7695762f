use drawlist_gpu::{GroupingStrategy, RenderConfig, RenderPath, StreamSlot};
use drawlist_protocol::Token;
use drawlist_trace_replay::{compile_scene, decode_dump, demo_mesh_file};
use pretty_assertions::assert_eq;

fn objects_only() -> RenderConfig {
    RenderConfig {
        draw_grid: false,
        ..RenderConfig::default()
    }
}

#[test]
fn demo_scene_records_one_batch_per_family() {
    let report = compile_scene(objects_only(), None).unwrap();

    let streams: Vec<_> = report.batches.iter().map(|b| b.stream).collect();
    assert_eq!(
        streams,
        vec![StreamSlot::Header, StreamSlot::Body, StreamSlot::Body]
    );
    assert_eq!(report.stats.drawcalls, 3);
    // 12 triangles, 8 strip triangles, 12 edges
    assert_eq!(report.stats.primitives, 32);
    assert_eq!(report.draws, 3);
    assert_eq!(report.batch_table().lines().count(), 4);
}

#[test]
fn every_path_issues_the_same_number_of_draws() {
    let mut draws = Vec::new();
    for path in [
        RenderPath::Immediate,
        RenderPath::Emulation,
        RenderPath::CompiledList,
        RenderPath::AddressIndirect,
    ] {
        let config = RenderConfig {
            path,
            ..objects_only()
        };
        draws.push(compile_scene(config, None).unwrap().draws);
    }
    assert_eq!(draws, vec![3, 3, 3, 3]);
}

#[test]
fn sorted_demo_starts_with_the_outline() {
    let config = RenderConfig {
        grouping: GroupingStrategy::SortedByTopology,
        ..objects_only()
    };
    let report = compile_scene(config, None).unwrap();
    let tokens = decode_dump(&report.tokens).unwrap();

    let first_draw = tokens
        .iter()
        .find(|(_, t)| matches!(t, Token::DrawElements { .. } | Token::DrawElementsStrip { .. }))
        .map(|(_, t)| *t);
    assert_eq!(
        first_draw,
        Some(Token::DrawElements {
            count: 24,
            first_index: 0,
            base_vertex: 0
        })
    );
}

#[test]
fn manifest_models_load_from_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mesh = serde_json::to_string(&demo_mesh_file()).unwrap();
    std::fs::write(dir.path().join("cube.json"), mesh).unwrap();
    std::fs::write(
        dir.path().join("scene.json"),
        r#"{
            "models": [
                { "name": "cube.json", "scale": 1.0 },
                { "name": "absent.json" }
            ],
            "camera": [{ "eye": [0.0, 2.0, 3.0], "focus": [0.0, 0.0, 0.0] }]
        }"#,
    )
    .unwrap();

    let report = compile_scene(objects_only(), Some(&dir.path().join("scene.json"))).unwrap();
    assert_eq!(report.draws, 3);
    assert!(report.batches.iter().all(|b| b.model == "cube.json"));
    assert!(!report.tokens.is_empty());
}
