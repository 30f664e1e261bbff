//! Benchmarks for the owning-handle lifecycle.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use tether::{Anchor, Anchored, Strong};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

const TEST_VALUE: usize = 1024;

struct Payload {
    anchor: Anchor,
    value: usize,
}

impl Anchored for Payload {
    fn anchor(&self) -> &Anchor {
        &self.anchor
    }
}

fn payload() -> Payload {
    Payload {
        anchor: Anchor::new(),
        value: TEST_VALUE,
    }
}

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("handle_churn");

    let allocs_op = allocs.operation("create_and_drop");
    group.bench_function("create_and_drop", |b| {
        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(Strong::new(payload())));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("clone_and_drop");
    group.bench_function("clone_and_drop", |b| {
        b.iter_custom(|iters| {
            let handle = Strong::new(payload());

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                drop(black_box(handle.clone()));
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("deref");
    group.bench_function("deref", |b| {
        b.iter_custom(|iters| {
            let handle = Strong::new(payload());

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(handle.value);
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("downgrade");
    group.bench_function("downgrade", |b| {
        b.iter_custom(|iters| {
            let handle = Strong::new(payload());

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                _ = black_box(handle.downgrade());
            }

            start.elapsed()
        });
    });

    group.finish();

    let mut group = c.benchmark_group("handle_churn_slow");

    let allocs_op = allocs.operation("create_10k");
    group.bench_function("create_10k", |b| {
        b.iter_custom(|iters| {
            let mut handle_sets = (0..iters)
                .map(|_| Vec::with_capacity(10_000))
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for handles in &mut handle_sets {
                for _ in 0..10_000 {
                    handles.push(black_box(Strong::new(payload())));
                }
            }

            start.elapsed()
        });
    });

    let allocs_op = allocs.operation("drop_10k");
    group.bench_function("drop_10k", |b| {
        b.iter_custom(|iters| {
            let mut handle_sets = (0..iters)
                .map(|_| {
                    (0..10_000)
                        .map(|_| Strong::new(payload()))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for handles in &mut handle_sets {
                while let Some(handle) = handles.pop() {
                    drop(black_box(handle));
                }
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
