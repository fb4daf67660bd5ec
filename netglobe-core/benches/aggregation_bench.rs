#[macro_use]
extern crate criterion;

use criterion::Criterion;

use netglobe_core::events::{Coordinate, Direction, FlowEvent};
use netglobe_core::store::AggregationStore;

fn bench_enqueue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation_throughput");

    for distinct in [8, 256, 4096] {
        group.throughput(criterion::Throughput::Elements(distinct as u64));
        group.bench_function(format!("distinct_{}", distinct), |b| {
            let store = AggregationStore::new();
            let events: Vec<FlowEvent> = (0..distinct)
                .map(|i| {
                    FlowEvent::new(
                        Coordinate::new(39.78, -104.97),
                        Coordinate::new(i as f64 * 0.01, -(i as f64) * 0.01),
                        Direction::Download,
                        "Benchland".into(),
                    )
                })
                .collect();
            b.iter(|| {
                for event in &events {
                    store.enqueue(event.clone());
                }
                store.drain()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enqueue_drain);
criterion_main!(benches);
