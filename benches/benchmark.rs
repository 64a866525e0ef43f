//! Benchmarks for the build workflow.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use boardchain::document::DocumentApi;
use boardchain::propagate::PropagateOptions;
use boardchain::{
    find_boards, BuildSession, Bounds, Creative, Device, DocNode, DocumentManager, Matcher,
    PropagationEngine, WorkflowConfig,
};

/// A board tree with `groups` groups of ten artboards each plus the rest boards.
fn board_tree(groups: usize) -> Vec<DocNode> {
    let mut nodes = vec![
        DocNode::artboard("D_Rest_2", Bounds::new(0, 0, 970, 600)),
        DocNode::artboard("M_Rest_2", Bounds::new(0, 4000, 320, 480)),
    ];
    for g in 0..groups {
        let top = 10_000 + g as i64 * 1_000;
        let mut group = DocNode::group(format!("Group {}", g), Bounds::new(0, top, 20_000, 800));
        for i in 0..10 {
            group = group.with_child(DocNode::artboard(
                format!("Scratch_{}_{}", g, i),
                Bounds::new(i * 1_500, top, 970, 600),
            ));
        }
        nodes.push(group);
    }
    nodes
}

fn bench_find_boards(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_boards");
    for groups in [10usize, 100] {
        let nodes = board_tree(groups);
        let pattern = Matcher::exact("M_Rest_2").unwrap();
        let fragments = Matcher::fragments(["Scratch_7_", "Rest"]);
        group.bench_with_input(BenchmarkId::new("pattern", groups), &nodes, |b, nodes| {
            b.iter(|| black_box(find_boards(Some(nodes), None, &pattern)))
        });
        group.bench_with_input(BenchmarkId::new("fragments", groups), &nodes, |b, nodes| {
            b.iter(|| black_box(find_boards(Some(nodes), None, &fragments)))
        });
    }
    group.finish();
}

fn bench_plan_route(c: &mut Criterion) {
    let config = WorkflowConfig::standard();
    let engine = PropagationEngine::new(&config);
    let nodes = board_tree(50);
    let creative = Creative::new();
    c.bench_function("plan_route_rest", |b| {
        b.iter(|| black_box(engine.plan_route(&nodes, &creative, Device::Desktop, "rest").unwrap()))
    });
}

fn bench_propagate_rest(c: &mut Criterion) {
    let config = WorkflowConfig::standard();
    c.bench_function("propagate_rest_both_devices", |b| {
        let sequences = vec!["rest".to_string()];
        b.iter(|| {
            let mut doc = DocumentManager::with_nodes("bench", board_tree(5)).unwrap();
            let mut creative = Creative::new();
            let engine = PropagationEngine::new(&config);
            let result = engine
                .propagate(
                    &mut doc,
                    &mut creative,
                    &Device::ALL,
                    &sequences,
                    &PropagateOptions::default(),
                )
                .unwrap();
            black_box(result);
        })
    });
}

fn bench_intro_growth(c: &mut Criterion) {
    let config = WorkflowConfig::standard();
    c.bench_function("intro_prepend_10", |b| {
        let sequences = vec!["intro".to_string()];
        b.iter(|| {
            let mut doc = DocumentManager::with_nodes("bench", board_tree(0)).unwrap();
            let mut creative = Creative::new();
            let engine = PropagationEngine::new(&config);
            for _ in 0..10 {
                engine
                    .propagate(
                        &mut doc,
                        &mut creative,
                        &[Device::Desktop],
                        &sequences,
                        &PropagateOptions { propagate_only: true },
                    )
                    .unwrap();
            }
            black_box(&creative);
        })
    });
}

fn bench_rename_targeted(c: &mut Criterion) {
    c.bench_function("rename_direct", |b| {
        let mut doc = DocumentManager::with_nodes("bench", board_tree(20)).unwrap();
        let id = doc.nodes().unwrap()[21].children[5].id.clone();
        let mut i = 0u64;
        b.iter(|| {
            doc.rename(&id, &format!("Scratch_{}", i)).unwrap();
            i += 1;
        })
    });
}

fn bench_session_walk(c: &mut Criterion) {
    c.bench_function("session_rest_and_intro", |b| {
        b.iter(|| {
            let doc = DocumentManager::with_nodes("bench", board_tree(5)).unwrap();
            let mut session = BuildSession::init(doc, WorkflowConfig::standard()).unwrap();
            session.next().unwrap();
            session.substep().unwrap();
            session.next().unwrap();
            black_box(session.teardown());
        })
    });
}

criterion_group!(
    benches,
    bench_find_boards,
    bench_plan_route,
    bench_propagate_rest,
    bench_intro_growth,
    bench_rename_targeted,
    bench_session_walk,
);

criterion_main!(benches);
