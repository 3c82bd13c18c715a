use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use shelf_circulation::{
    AGGREGATE_TYPE, BorrowerSnapshot, CheckOutLoan, CirculationCommand, CirculationRules, ItemCirculation,
    ItemId, LoanLifecycle, RegisterItem, ReturnLoan,
};
use shelf_core::{AggregateId, BorrowerId, LoanId};
use shelf_events::{EventEnvelope, InMemoryEventBus};
use shelf_infra::command_dispatcher::CommandDispatcher;
use shelf_infra::event_store::InMemoryEventStore;
use shelf_infra::projections::CirculationProjection;
use shelf_infra::read_model::InMemoryReadModelStore;
use std::sync::Arc;

type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup() -> Dispatcher {
    CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
}

fn make(id: AggregateId) -> LoanLifecycle {
    LoanLifecycle::empty(ItemId::new(id), CirculationRules::default())
}

fn register(dispatcher: &Dispatcher, copies: u32) -> ItemId {
    let item_id = ItemId::new(AggregateId::new());
    let cmd = CirculationCommand::RegisterItem(RegisterItem {
        item_id,
        total_copies: copies,
        occurred_at: Utc::now(),
    });
    dispatcher.dispatch(item_id.0, AGGREGATE_TYPE, &cmd, make).unwrap();
    item_id
}

/// One checkout followed by its on-time return.
fn lend_and_return(dispatcher: &Dispatcher, item_id: ItemId, borrower: BorrowerSnapshot) {
    let loan_id = LoanId::new();
    let now = Utc::now();
    let checkout = CirculationCommand::CheckOutLoan(CheckOutLoan {
        item_id,
        loan_id,
        borrower,
        due_date: now.date_naive(),
        occurred_at: now,
    });
    dispatcher.dispatch(item_id.0, AGGREGATE_TYPE, &checkout, make).unwrap();

    let give_back = CirculationCommand::ReturnLoan(ReturnLoan {
        item_id,
        loan_id,
        occurred_at: now,
    });
    dispatcher.dispatch(item_id.0, AGGREGATE_TYPE, &give_back, make).unwrap();
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("circulation_command_latency");

    group.bench_function("register_item_fresh", |b| {
        let dispatcher = setup();
        b.iter(|| black_box(register(&dispatcher, 3)));
    });

    group.bench_function("checkout_and_return_short_history", |b| {
        let dispatcher = setup();
        let borrower = BorrowerSnapshot::active(BorrowerId::new());
        b.iter_batched(
            || register(&dispatcher, 1),
            |item_id| lend_and_return(&dispatcher, item_id, borrower),
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_rehydration(c: &mut Criterion) {
    let mut group = c.benchmark_group("circulation_rehydration");

    for loans in [10usize, 100, 500] {
        let dispatcher = setup();
        let item_id = register(&dispatcher, 1);
        let borrower = BorrowerSnapshot::active(BorrowerId::new());
        for _ in 0..loans {
            lend_and_return(&dispatcher, item_id, borrower);
        }

        group.throughput(Throughput::Elements((loans * 2 + 1) as u64));
        group.bench_with_input(BenchmarkId::new("load_item", loans), &item_id, |b, item_id| {
            b.iter(|| black_box(dispatcher.load(item_id.0, make).unwrap()));
        });
    }

    group.finish();
}

fn bench_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("circulation_projection_rebuild");
    group.sample_size(20);

    for items in [10usize, 100] {
        let dispatcher = setup();
        let borrower = BorrowerSnapshot::active(BorrowerId::new());
        for _ in 0..items {
            let item_id = register(&dispatcher, 2);
            for _ in 0..5 {
                lend_and_return(&dispatcher, item_id, borrower);
            }
        }

        group.bench_with_input(BenchmarkId::new("rebuild", items), &items, |b, _| {
            let projection: CirculationProjection<InMemoryReadModelStore<ItemId, ItemCirculation>> =
                CirculationProjection::new(InMemoryReadModelStore::new());
            b.iter(|| projection.rebuild(dispatcher.store()).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_command_latency, bench_rehydration, bench_projection_rebuild);
criterion_main!(benches);
