use criterion::{criterion_group, criterion_main, Criterion};
use reception_core::{
    build_view, NewReception, ReceptionId, ReceptionRecord, SortDirection, SortField, SortState,
    StatusFilter, StatusKind, ViewQuery,
};
use time::{Date, Duration, Month, OffsetDateTime};

fn mk_record(index: usize) -> ReceptionRecord {
    let status = match index % 3 {
        0 => StatusKind::Fresh,
        1 => StatusKind::NearExpiry,
        _ => StatusKind::Expired,
    };
    let cartons = u32::try_from(index % 40 + 1).unwrap_or(1);
    let production_date =
        Date::from_calendar_date(2024, Month::January, 1).unwrap_or(Date::MIN);
    let offset = i64::try_from(index).unwrap_or(0);

    ReceptionRecord::from_new(
        ReceptionId::generate(),
        OffsetDateTime::UNIX_EPOCH + Duration::minutes(offset),
        NewReception {
            product_name: format!("Product {}", index % 97),
            pallet_number: (index % 5 != 0).then(|| format!("P-{}", index % 113)),
            cartons,
            units_per_carton: 24,
            total_units: u64::from(cartons) * 24,
            barcode: format!("{:06}", index % 1_000_000),
            production_date,
            expiration_date: production_date + Duration::days(180),
            shelf_life_months: 5,
            status,
        },
    )
}

fn bench_default_view(c: &mut Criterion) {
    let records = (0..1_000).map(mk_record).collect::<Vec<_>>();
    let query = ViewQuery::default();

    c.bench_function("view_default_newest_first_1000", |b| {
        b.iter(|| build_view(&records, &query));
    });
}

fn bench_filtered_view(c: &mut Criterion) {
    let records = (0..1_000).map(mk_record).collect::<Vec<_>>();
    let query = ViewQuery {
        search_term: "p-1".to_string(),
        status_filter: StatusFilter::Only(StatusKind::NearExpiry),
        sort: SortState { field: SortField::PalletNumber, direction: SortDirection::Desc },
    };

    c.bench_function("view_search_status_pallet_sort_1000", |b| {
        b.iter(|| build_view(&records, &query));
    });
}

criterion_group!(benches, bench_default_view, bench_filtered_view);
criterion_main!(benches);
