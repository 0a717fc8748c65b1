use common::{PrefixCounter, TaskPool};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    InMemoryOrderRepository, Money, NewOrder, OrderService, OrderStatus, OrderType,
    TracingEventPublisher,
};

type BenchService = OrderService<InMemoryOrderRepository, TracingEventPublisher>;

fn service() -> BenchService {
    OrderService::new(
        InMemoryOrderRepository::new(),
        TracingEventPublisher,
        PrefixCounter::new(),
        TaskPool::new("bench", 16),
    )
}

fn new_order() -> NewOrder {
    NewOrder::new(OrderType::BuyCard, "bench-user", Money::new(10_000))
}

fn bench_transition_table(c: &mut Criterion) {
    let all = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Success,
        OrderStatus::Failed,
        OrderStatus::Verifying,
        OrderStatus::Cancel,
    ];

    c.bench_function("domain/transition_table", |b| {
        b.iter(|| {
            let mut legal = 0;
            for from in all {
                for to in all {
                    if std::hint::black_box(from).can_transition_to(to) {
                        legal += 1;
                    }
                }
            }
            legal
        });
    });
}

fn bench_init_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = rt.block_on(async { service() });

    c.bench_function("domain/init_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.init_order(new_order()).await.unwrap();
            });
        });
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = rt.block_on(async { service() });

    c.bench_function("domain/init_process_succeed", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = service.init_order(new_order()).await.unwrap();
                let order = service.processing_order(&order).await.unwrap();
                service.success_order(&order).await.unwrap();
            });
        });
    });
}

fn bench_rejected_transition(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = rt.block_on(async { service() });
    let order = rt.block_on(async {
        let order = service.init_order(new_order()).await.unwrap();
        let order = service.processing_order(&order).await.unwrap();
        service.failed_order(&order, "bench").await.unwrap()
    });

    c.bench_function("domain/rejected_transition", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.success_order(&order).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_transition_table,
    bench_init_order,
    bench_full_lifecycle,
    bench_rejected_transition,
);
criterion_main!(benches);
