//! Benchmarks for the linear-scan block ordering pass

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use hir::ir::GraphDescription;
use hir::HirOptions;

/// Loops nested `depth` deep. Each header branches into the next level or
/// to its latch, which jumps back to the enclosing header.
fn generate_nested_loops(depth: usize) -> String {
    let mut blocks = Vec::new();
    blocks.push(r#""entry": { "end": "goto", "successors": ["h0"] }"#.to_string());
    for i in 0..depth {
        let inner = if i + 1 < depth {
            format!("h{}", i + 1)
        } else {
            "body".to_string()
        };
        blocks.push(format!(
            r#""h{i}": {{ "end": "if", "successors": ["{inner}", "latch{i}"], "flags": ["plh"] }}"#
        ));
        if i == 0 {
            blocks.push(r#""latch0": { "end": "return" }"#.to_string());
        } else {
            blocks.push(format!(
                r#""latch{i}": {{ "end": "goto", "successors": ["h{}"] }}"#,
                i - 1
            ));
        }
    }
    blocks.push(format!(
        r#""body": {{ "end": "goto", "successors": ["h{}"] }}"#,
        depth - 1
    ));
    format!(
        r#"{{ "name": "nested{}", "entry": "entry", "split_critical_edges": true, "blocks": {{ {} }} }}"#,
        depth,
        blocks.join(", ")
    )
}

/// A chain of `width` diamonds.
fn generate_diamonds(width: usize) -> String {
    let mut blocks = Vec::new();
    for i in 0..width {
        blocks.push(format!(
            r#""d{i}": {{ "end": "if", "successors": ["l{i}", "r{i}"] }}"#
        ));
        blocks.push(format!(r#""l{i}": {{ "end": "goto", "successors": ["d{}"] }}"#, i + 1));
        blocks.push(format!(r#""r{i}": {{ "end": "goto", "successors": ["d{}"] }}"#, i + 1));
    }
    blocks.push(format!(r#""d{}": {{ "end": "return" }}"#, width));
    format!(
        r#"{{ "name": "diamonds{}", "entry": "d0", "blocks": {{ {} }} }}"#,
        width,
        blocks.join(", ")
    )
}

fn bench_order(c: &mut Criterion, group_name: &str, sizes: &[usize], generate: fn(usize) -> String) {
    let mut group = c.benchmark_group(group_name);
    for &size in sizes {
        let desc = GraphDescription::from_json(&generate(size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &desc, |b, desc| {
            b.iter_batched(
                || desc.build(HirOptions::production()).unwrap().graph,
                |mut graph| {
                    let order = graph.compute_linear_scan_order();
                    black_box(order)
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn benchmark_nested_loops(c: &mut Criterion) {
    bench_order(c, "nested_loops", &[2, 8, 32, 64], generate_nested_loops);
}

fn benchmark_diamonds(c: &mut Criterion) {
    bench_order(c, "diamond_chain", &[10, 100, 1000], generate_diamonds);
}

criterion_group!(benches, benchmark_nested_loops, benchmark_diamonds);
criterion_main!(benches);
