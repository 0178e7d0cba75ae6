use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{DateTime, Duration, TimeZone, Utc};
use eventide_core::{EntityId, EventId, Reducer, fold};
use eventide_events::{Event, RecordedEvent, RevisionMapper};
use eventide_infra::EngineConfig;
use eventide_infra::engine::Engine;
use eventide_infra::event_store::{EventStore, Filter, InMemoryEventStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

const ENTITY: &str = "counter";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventName", content = "body", rename_all = "camelCase")]
enum CounterEvent {
    Opened { at: DateTime<Utc> },
    Added { amount: i64 },
}

impl Event for CounterEvent {
    const REVISION: Option<u32> = Some(2);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Counter {
    total: i64,
    changes: u64,
}

struct CounterReducer;

impl Reducer for CounterReducer {
    type State = Counter;
    type Event = CounterEvent;

    fn reduce(&self, state: Counter, event: &CounterEvent) -> Counter {
        match event {
            CounterEvent::Opened { .. } => Counter::default(),
            CounterEvent::Added { amount } => Counter {
                total: state.total + amount,
                changes: state.changes + 1,
            },
        }
    }
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// A stream of `len` events; `legacy` ones are stored at revision 1 as `increment`.
fn stream(entity_id: EntityId, len: usize, legacy: bool) -> Vec<RecordedEvent> {
    (0..len)
        .map(|i| {
            let (event_name, body, revision) = match (i, legacy) {
                (0, _) => ("opened", json!({ "at": base() }), Some(2)),
                (_, false) => ("added", json!({ "amount": 1 }), Some(2)),
                (_, true) => ("increment", json!({ "by": 1 }), Some(1)),
            };
            RecordedEvent {
                event_id: EventId::new(),
                event_name: event_name.to_string(),
                event_created_at: base() + Duration::milliseconds(i as i64),
                entity_name: ENTITY.to_string(),
                entity_id,
                revision,
                body,
            }
        })
        .collect()
}

fn seeded_store(rt: &Runtime, aggregates: usize, len: usize, legacy: bool) -> (Arc<InMemoryEventStore>, Vec<EntityId>) {
    let store = Arc::new(InMemoryEventStore::new());
    let ids: Vec<EntityId> = (0..aggregates).map(|_| EntityId::new()).collect();
    rt.block_on(async {
        for id in &ids {
            for event in stream(*id, len, legacy) {
                store.append_event(&event).await.unwrap();
            }
        }
    });
    (store, ids)
}

fn legacy_mapper() -> RevisionMapper {
    RevisionMapper::new().upcast("increment", Some(1), |e| {
        let amount = e.body["by"].clone();
        e.with_event_name("added")
            .with_body(json!({ "amount": amount }))
            .with_revision(Some(2))
    })
}

/// Pure fold of pre-decoded events (no storage, no JSON).
fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");
    for len in [10usize, 100, 1000] {
        let events: Vec<CounterEvent> = (0..len)
            .map(|i| match i {
                0 => CounterEvent::Opened { at: base() },
                _ => CounterEvent::Added { amount: 1 },
            })
            .collect();
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &events, |b, events| {
            b.iter(|| black_box(fold(&CounterReducer, events)))
        });
    }
    group.finish();
}

/// `find_one` over the in-memory store: fetch, sort, decode, fold.
fn bench_find_one(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("find_one");
    for len in [10usize, 100, 1000] {
        for legacy in [false, true] {
            let (store, ids) = seeded_store(&rt, 1, len, legacy);
            let engine = Engine::builder(store, CounterReducer, EngineConfig::new(ENTITY))
                .mapper(legacy_mapper())
                .build();
            let label = if legacy { "mapped" } else { "current" };
            group.throughput(Throughput::Elements(len as u64));
            group.bench_with_input(BenchmarkId::new(label, len), &ids[0], |b, id| {
                b.iter(|| rt.block_on(engine.find_one(black_box(*id))).unwrap())
            });
        }
    }
    group.finish();
}

/// Batched replay of many aggregates in one round-trip.
fn bench_find_by_ids(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("find_by_ids");
    for aggregates in [10usize, 100] {
        let (store, ids) = seeded_store(&rt, aggregates, 20, false);
        let engine = Engine::builder(store, CounterReducer, EngineConfig::new(ENTITY)).build();
        group.throughput(Throughput::Elements(aggregates as u64));
        group.bench_with_input(BenchmarkId::from_parameter(aggregates), &ids, |b, ids| {
            b.iter(|| rt.block_on(engine.find_by_ids(black_box(ids))).unwrap())
        });
    }
    group.finish();
}

/// Filtered scan that selects aggregates and replays them.
fn bench_query_events(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, _) = seeded_store(&rt, 100, 20, false);
    let engine = Engine::builder(store, CounterReducer, EngineConfig::new(ENTITY)).build();
    let filter = Filter::all().equals("eventName", "opened");
    c.bench_function("query_events/opened", |b| {
        b.iter(|| rt.block_on(engine.query_events(black_box(&filter), None)).unwrap())
    });
}

criterion_group!(benches, bench_fold, bench_find_one, bench_find_by_ids, bench_query_events);
criterion_main!(benches);
