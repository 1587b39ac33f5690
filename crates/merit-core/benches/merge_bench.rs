//! # Merge Benchmarks
//!
//! Performance benchmarks for the listing path: reference query plus merge.
//!
//! Run with: `cargo bench -p merit-core`

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use merit_core::merge::merge_records;
use merit_core::{
    AchievementContent, DetailStore, MemoryDetailStore, MergeEngine, NewDetail, Reference,
    StudentId,
};
use std::hint::black_box;
use std::sync::Arc;

/// Store `size` details and return references to them, every tenth one
/// pointing at a removed document.
fn populate(store: &MemoryDetailStore, size: usize) -> Vec<Reference> {
    let base = Utc::now();
    (0..size)
        .map(|i| {
            let detail = store
                .insert(NewDetail {
                    student_id: StudentId::new(format!("S-{:04}", i % 50)),
                    content: AchievementContent {
                        achievement_type: "competition".to_string(),
                        title: format!("Achievement {}", i),
                        description: String::new(),
                        details: serde_json::json!({"competitionLevel": "national"}),
                        tags: Default::default(),
                        points: 10,
                    },
                    created_at: base,
                })
                .expect("insert");
            if i % 10 == 0 {
                store.remove(detail.id).expect("remove");
            }
            Reference::draft(
                detail.student_id,
                detail.id,
                base + Duration::seconds(i as i64),
            )
        })
        .collect()
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_merge_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_engine");

    for size in [10, 100, 1000] {
        let store = Arc::new(MemoryDetailStore::new());
        let references = populate(&store, size);
        let engine = MergeEngine::new(store);

        group.bench_with_input(BenchmarkId::from_parameter(size), &references, |b, refs| {
            b.iter(|| black_box(engine.merge(refs.clone()).expect("merge")));
        });
    }

    group.finish();
}

fn bench_merge_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_records_reversed");

    for size in [100, 1000] {
        let store = MemoryDetailStore::new();
        let references = populate(&store, size);
        let mut details = store.scan().expect("scan");
        details.reverse();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(merge_records(references.clone(), details.clone())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge_engine, bench_merge_records);
criterion_main!(benches);
