use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    AppendOptions, BalanceKey, EquipmentTypeId, EventQuery, EventStore, EventStoreExt,
    InMemoryEventStore, LedgerEvent, SiteId, Version,
};

fn acquisition(site: SiteId, equipment_type: EquipmentTypeId, minute: i64) -> LedgerEvent {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    LedgerEvent::acquisition(
        site,
        equipment_type,
        1,
        start + Duration::minutes(minute),
        "bench",
    )
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                store
                    .append(
                        acquisition(SiteId::new(), EquipmentTypeId::new(), 0),
                        AppendOptions::new(),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_append_with_version_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_with_version_check", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let site = SiteId::new();
                let rifle = EquipmentTypeId::new();
                store
                    .append(
                        acquisition(site, rifle, 0),
                        AppendOptions::expect_versions([(
                            BalanceKey::new(site, rifle),
                            Version::initial(),
                        )]),
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_load_key_of_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let site = SiteId::new();
    let rifle = EquipmentTypeId::new();

    // Interleave a second key so the filter has work to do
    rt.block_on(async {
        let other = EquipmentTypeId::new();
        for minute in 0..1000 {
            store
                .append(acquisition(site, rifle, minute), AppendOptions::new())
                .await
                .unwrap();
            store
                .append(acquisition(site, other, minute), AppendOptions::new())
                .await
                .unwrap();
        }
    });

    c.bench_function("event_store/load_key_of_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.load_key(BalanceKey::new(site, rifle)).await.unwrap();
            });
        });
    });
}

fn bench_query_window(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let site = SiteId::new();
    let rifle = EquipmentTypeId::new();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    rt.block_on(async {
        for minute in 0..1000 {
            store
                .append(acquisition(site, rifle, minute), AppendOptions::new())
                .await
                .unwrap();
        }
    });

    c.bench_function("event_store/query_window_100_of_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let query = EventQuery::new()
                    .site(site)
                    .from(start + Duration::minutes(450))
                    .until(start + Duration::minutes(549));
                store.collect_events(query).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_with_version_check,
    bench_load_key_of_1000,
    bench_query_window
);
criterion_main!(benches);
