use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use forgeerp_core::{ProductId, TenantId, UserId, WarehouseId};
use forgeerp_events::{EventEnvelope, InMemoryEventBus};
use forgeerp_infra::command_dispatcher::CommandDispatcher;
use forgeerp_infra::event_store::{EventStore, InMemoryEventStore};
use forgeerp_infra::projections::{ReservationReadModel, ReservationsProjection};
use forgeerp_infra::read_model::InMemoryTenantStore;
use forgeerp_infra::reservations::{
    NewReservation, ReservationService, SequentialNumberGenerator, AGGREGATE_TYPE,
};
use forgeerp_manufacturing::{
    AllocateMaterial, IssueMaterial, ReservationId, ReservationOptions, ReservationType,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Service = ReservationService<Arc<InMemoryEventStore>, Bus, SequentialNumberGenerator>;

struct Bench {
    service: Service,
    store: Arc<InMemoryEventStore>,
    tenant_id: TenantId,
    user: UserId,
    warehouse: WarehouseId,
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn required_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
}

fn setup() -> Bench {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(Arc::clone(&store), bus);
    Bench {
        service: ReservationService::new(dispatcher, SequentialNumberGenerator::new("MR", 9)),
        store,
        tenant_id: TenantId::new(),
        user: UserId::new(),
        warehouse: WarehouseId::new(),
    }
}

impl Bench {
    fn create(&self, required: i64) -> ReservationId {
        self.service
            .create(NewReservation {
                tenant_id: self.tenant_id,
                product_id: ProductId::new(),
                unit: "pcs".to_string(),
                required_quantity: Decimal::from(required),
                required_date: required_date(),
                reservation_type: ReservationType::Manual,
                options: ReservationOptions::default(),
                requested_by: self.user,
                occurred_at: at(),
            })
            .unwrap()
            .id_typed()
    }

    fn allocate(&self, reservation_id: ReservationId, quantity: i64) {
        self.service
            .allocate(AllocateMaterial {
                tenant_id: self.tenant_id,
                reservation_id,
                quantity: Decimal::from(quantity),
                warehouse_id: self.warehouse,
                location_id: None,
                lot_number: None,
                serial_number: None,
                stock_id: None,
                allocated_by: self.user,
                occurred_at: at(),
            })
            .unwrap();
    }

    fn issue(&self, reservation_id: ReservationId, quantity: i64) {
        self.service
            .issue(IssueMaterial {
                tenant_id: self.tenant_id,
                reservation_id,
                allocation_id: None,
                quantity: Decimal::from(quantity),
                warehouse_id: self.warehouse,
                stock_movement_id: None,
                lot_number: None,
                serial_number: None,
                issued_by: self.user,
                occurred_at: at(),
            })
            .unwrap();
    }
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(500);

    group.bench_function("create_reservation_fresh", |b| {
        let bench = setup();
        b.iter(|| black_box(bench.create(10)));
    });

    // Every allocation replays the whole stream first.
    for history in [10usize, 100, 500] {
        group.bench_with_input(
            BenchmarkId::new("allocate_with_history", history),
            &history,
            |b, &history| {
                let bench = setup();
                let id = bench.create(1_000_000);
                for _ in 0..history {
                    bench.allocate(id, 1);
                }
                b.iter(|| bench.allocate(black_box(id), 1));
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for reservations in [10usize, 100, 1000] {
        let bench = setup();
        for _ in 0..reservations {
            let id = bench.create(10);
            bench.allocate(id, 10);
            bench.issue(id, 4);
        }
        let envelopes = bench
            .store
            .load_tenant(bench.tenant_id, AGGREGATE_TYPE)
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect::<Vec<_>>();

        group.throughput(Throughput::Elements(envelopes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(reservations),
            &envelopes,
            |b, envelopes| {
                let projection = ReservationsProjection::new(
                    InMemoryTenantStore::<ReservationId, ReservationReadModel>::new(),
                );
                b.iter(|| {
                    projection.rebuild_from_scratch(envelopes.iter().cloned()).unwrap();
                    black_box(projection.summary(bench.tenant_id))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
