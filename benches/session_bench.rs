use std::{sync::Arc, thread};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use vellum::{
    layout::value::I64, Arena, SegmentAllocator, Session, SlicingAllocator,
};

fn benchmark_native_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("NativeAllocation");

    for size in [16, 256, 4096].iter() {
        group.bench_with_input(
            BenchmarkId::new("allocate_close", size),
            size,
            |b, &size| {
                b.iter(|| {
                    let arena = Arena::of_confined();
                    for _ in 0..100 {
                        arena.allocate(size, 8).unwrap();
                    }
                    arena.close().unwrap();
                });
            },
        );
    }

    group.finish();
}

fn benchmark_slicing_allocator(c: &mut Criterion) {
    let mut group = c.benchmark_group("SlicingAllocator");

    for size in [64, 256, 1024, 4096].iter() {
        group.bench_with_input(BenchmarkId::new("allocate", size), size, |b, &size| {
            let session = Session::shared();
            let allocator = SlicingAllocator::new(session.allocate(1024 * 1024, 64).unwrap());

            b.iter(|| {
                allocator.reset();
                for _ in 0..100 {
                    let _ = allocator.allocate(size, 8);
                }
            });
            session.close().unwrap();
        });
    }

    group.finish();
}

fn benchmark_access_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("AccessGate");

    group.bench_function("confined_acquire", |b| {
        let session = Session::confined();
        b.iter(|| {
            let _guard = session.acquire().unwrap();
        });
        session.close().unwrap();
    });

    group.bench_function("shared_contended_get", |b| {
        let session = Session::shared();
        let segment = session.allocate(8 * 4, 8).unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|index| {
                    let segment = segment.clone();
                    thread::spawn(move || {
                        for round in 0..1000 {
                            segment.set_at_index(&I64, index, round).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
        session.close().unwrap();
    });

    group.bench_function("close_actions", |b| {
        b.iter(|| {
            let session = Session::shared();
            let counter = Arc::new(());
            for _ in 0..64 {
                let held = Arc::clone(&counter);
                session.add_close_action(move || drop(held)).unwrap();
            }
            session.close().unwrap();
        });
    });

    group.finish();
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn benches_with_logging(c: &mut Criterion) {
    init_logging();
    benchmark_native_allocation(c);
    benchmark_slicing_allocator(c);
    benchmark_access_gate(c);
}

criterion_group!(benches, benches_with_logging);
criterion_main!(benches);
