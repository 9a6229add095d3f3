use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use std::sync::Arc;
use stockroute_auth::{Actor, Role};
use stockroute_core::{BatchId, ProductId, SystemClock, UserId, WarehouseId};
use stockroute_inventory::{
    Catalog, InventoryEngine, Ledger, LedgerFilter, NewBatch, Product, Warehouse,
};

struct Setup {
    engine: InventoryEngine,
    actor: Actor,
    w2: WarehouseId,
    batch: BatchId,
}

fn setup(initial: i64) -> Setup {
    let catalog = Arc::new(Catalog::new());
    let product = catalog
        .add_product(Product {
            id: ProductId::new(),
            name: "Bench item".into(),
            unit: "pcs".into(),
            category: "bench".into(),
            description: String::new(),
        })
        .unwrap();
    let warehouse = |name: &str| {
        catalog
            .add_warehouse(Warehouse {
                id: WarehouseId::new(),
                name: name.into(),
                address: String::new(),
                manager: None,
            })
            .unwrap()
    };
    let w1 = warehouse("W1");
    let w2 = warehouse("W2");

    let engine = InventoryEngine::in_memory(catalog, Arc::new(SystemClock));
    let actor = Actor::with_role(UserId::new(), Role::WAREHOUSE);
    let batch = engine
        .create_batch(
            &actor,
            NewBatch {
                product_id: product,
                warehouse_id: w1,
                location_id: None,
                batch_number: "BENCH-1".into(),
                quantity: initial,
                production_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            },
        )
        .unwrap()
        .batch
        .id;

    Setup {
        engine,
        actor,
        w2,
        batch,
    }
}

/// Latency of a single receive + dispense pair (lock, apply, append).
fn bench_receive_dispense(c: &mut Criterion) {
    let s = setup(1_000);
    c.bench_function("receive_then_dispense", |b| {
        b.iter(|| {
            s.engine
                .receive(&s.actor, black_box(s.batch), 5, "")
                .unwrap();
            s.engine
                .dispense(&s.actor, black_box(s.batch), 5, None, "")
                .unwrap();
        })
    });
}

/// Transfer cost: two key locks, two quantity changes, two ledger entries.
fn bench_transfer(c: &mut Criterion) {
    let s = setup(i64::MAX / 2);
    c.bench_function("transfer_one_unit", |b| {
        b.iter(|| {
            s.engine
                .transfer(&s.actor, black_box(s.batch), 1, s.w2, "")
                .unwrap();
        })
    });
}

/// Balance of one batch as the ledger grows.
fn bench_ledger_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_balance");
    for entries in [100usize, 1_000, 10_000] {
        let s = setup(0);
        for _ in 0..entries {
            s.engine.receive(&s.actor, s.batch, 1, "").unwrap();
        }
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &s, |b, s| {
            b.iter(|| black_box(s.engine.ledger().balance(s.batch)))
        });
    }
    group.finish();
}

/// Newest-first scan with a batch filter.
fn bench_ledger_scan(c: &mut Criterion) {
    let s = setup(0);
    for _ in 0..5_000 {
        s.engine.receive(&s.actor, s.batch, 1, "").unwrap();
    }
    c.bench_function("ledger_scan_by_batch", |b| {
        b.iter(|| {
            black_box(
                s.engine
                    .ledger()
                    .scan(LedgerFilter::by_batch(s.batch))
                    .count(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_receive_dispense,
    bench_transfer,
    bench_ledger_balance,
    bench_ledger_scan
);
criterion_main!(benches);
