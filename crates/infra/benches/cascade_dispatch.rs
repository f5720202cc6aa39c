use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use cascade_core::{AggregateRoot, Entity, Event, EventBuffer, FieldMap};
use cascade_events::{BusConfig, Dependencies, HandlerTable, MessageBus};
use cascade_infra::{InMemoryRepository, InMemoryTransaction, UnitOfWork, UnitOfWorkBuilder};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
struct Hop {
    remaining: u32,
}

impl Event for Hop {}

/// Aggregate that raises the next hop of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Relay {
    position: u32,
    events: EventBuffer,
}

impl Entity for Relay {
    fn fields(&self) -> FieldMap {
        FieldMap::new().with("position", self.position)
    }
}

impl AggregateRoot for Relay {
    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }
}

type RelayUnitOfWork = UnitOfWork<InMemoryTransaction>;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn relay_bus(config: BusConfig) -> MessageBus {
    let uow = Arc::new(
        UnitOfWorkBuilder::new("RelayUnitOfWork")
            .repository("relays", || InMemoryRepository::new(|r: &Relay| r.position))
            .build(InMemoryTransaction::new())
            .unwrap(),
    );

    let mut handlers = HandlerTable::new();
    handlers.on_fn("relay", &["uow"], |hop: Hop, deps: Dependencies| async move {
        if hop.remaining == 0 {
            return Ok(());
        }
        let uow = deps.require::<RelayUnitOfWork>("uow")?;
        uow.run(|| async {
            let mut relay = Relay {
                position: hop.remaining,
                events: EventBuffer::new(),
            };
            relay.add_event(Hop {
                remaining: hop.remaining - 1,
            });
            uow.add("relays", relay).await?;
            uow.commit().await?;
            Ok(())
        })
        .await
    });

    MessageBus::with_config(
        handlers,
        Dependencies::new().with_unit_of_work("uow", uow),
        config,
    )
}

fn bench_cascade_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade_depth");
    let rt = runtime();

    for depth in [1u32, 10, 100].iter() {
        group.throughput(Throughput::Elements(*depth as u64));
        group.bench_with_input(BenchmarkId::new("relay_chain", depth), depth, |b, &depth| {
            let bus = relay_bus(BusConfig::default());
            b.iter(|| {
                rt.block_on(bus.dispatch(Hop {
                    remaining: black_box(depth),
                }))
                .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_memoized_lookups(c: &mut Criterion) {
    let mut group = c.benchmark_group("memoized_lookups");
    let rt = runtime();

    for cache_size in [0usize, BusConfig::DEFAULT_CACHE_SIZE].iter() {
        group.bench_with_input(
            BenchmarkId::new("single_hop", cache_size),
            cache_size,
            |b, &cache_size| {
                let bus = relay_bus(BusConfig::default().with_cache_size(cache_size));
                b.iter(|| {
                    rt.block_on(bus.dispatch(Hop {
                        remaining: black_box(0),
                    }))
                    .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_cascade_depth, bench_memoized_lookups);
criterion_main!(benches);
