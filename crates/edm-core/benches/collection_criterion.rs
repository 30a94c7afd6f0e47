//! Collection benchmarks using criterion for historical comparison.

use std::hint::black_box;

use bytemuck::{Pod, Zeroable};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use edm_core::{Association, Collection, CollectionBase, RawCollection, Registry};

#[derive(Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
struct HitData {
    energy: f32,
    time: f32,
}

edm_core::record! {
    Hit { data: HitData, name: "Hit", version: 1 }
}

type HitAssociation = Association<Hit, Hit>;

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_record::<Hit>()
        .and_then(|()| registry.register_record::<HitAssociation>())
        .expect("bench records register");
    registry
}

fn hits(count: u64) -> Collection<Hit> {
    let mut hits = Collection::<Hit>::new();
    hits.set_id(1).expect("fresh collection");
    for i in 0..count {
        hits.create().expect("owning collection").set_data(HitData {
            energy: i as f32,
            time: 0.0,
        });
    }
    hits
}

fn chain(hits: &Collection<Hit>) -> Collection<HitAssociation> {
    let mut associations = Collection::<HitAssociation>::new();
    associations.set_id(2).expect("fresh collection");
    for (from, to) in hits.iter().zip(hits.iter().skip(1)) {
        let association = associations.create().expect("owning collection");
        association.set_from(&from);
        association.set_to(&to);
        association.set_weight(0.5);
    }
    associations
}

fn create_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("records", count), &count, |b, &count| {
            b.iter(|| black_box(hits(count)));
        });

        group.bench_with_input(BenchmarkId::new("relations", count), &count, |b, &count| {
            let hits = hits(count);
            b.iter(|| black_box(chain(&hits)));
        });
    }

    group.finish();
}

fn flatten_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare_for_write");

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("records", count), &count, |b, &count| {
            b.iter_batched(
                || hits(count),
                |hits| black_box(hits.prepare_for_write().len()),
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("relations", count), &count, |b, &count| {
            let hits = hits(count);
            b.iter_batched(
                || chain(&hits),
                |associations| black_box(associations.prepare_for_write().len()),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn read_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let registry = registry();

    for count in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(count));

        let hits = hits(count);
        let associations = chain(&hits);
        let stored: Vec<RawCollection> = [&hits as &dyn CollectionBase, &associations]
            .into_iter()
            .map(|collection| registry.write_collection(collection).expect("registered"))
            .collect();

        group.bench_with_input(BenchmarkId::new("rehydrate", count), &stored, |b, stored| {
            b.iter(|| {
                for raw in stored {
                    black_box(registry.read_collection(raw).expect("readable"));
                }
            });
        });

        group.bench_with_input(
            BenchmarkId::new("rehydrate_and_link", count),
            &stored,
            |b, stored| {
                b.iter(|| {
                    let read: Vec<Box<dyn CollectionBase>> = stored
                        .iter()
                        .filter_map(|raw| registry.read_collection(raw).expect("readable"))
                        .collect();
                    for collection in &read {
                        black_box(collection.set_references(&read).expect("linkable"));
                    }
                    read
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, create_benchmarks, flatten_benchmarks, read_benchmarks);
criterion_main!(benches);
