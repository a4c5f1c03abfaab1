use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livegrid::filter::ConditionType;
use livegrid::*;
use serde_json::json;

fn task_service(size: usize) -> MemoryService {
    let service = MemoryService::new("name");
    let statuses = ["Open", "Working", "Closed"];
    let rows = (0..size)
        .filter_map(|i| {
            json!({
                "name": format!("TASK-{:06}", i),
                "title": format!("Task {}", i),
                "status": statuses[i % statuses.len()],
                "qty": (i * 13) % 100,
                "modified": format!("2024-01-01 {:02}:{:02}:{:02}", (i / 3600) % 24, (i / 60) % 60, i % 60),
            })
            .as_object()
            .cloned()
        })
        .collect();
    service.insert_rows("Task", rows);
    service
}

fn sample_filter_model() -> FilterModel {
    let mut model: FilterModel = serde_json::from_value(json!({
        "qty": {"filterType": "number", "type": "inRange", "filter": 10, "filterTo": 60},
        "status": {"filterType": "set", "values": ["Open", "Working"]},
        "due_date": {"filterType": "date", "type": "greaterThan", "dateFrom": "2024-01-01"}
    }))
    .unwrap_or_default();
    model.set("title", FilterModelEntry::text(ConditionType::Contains, "1"));
    model
}

fn bench_filter_translation(c: &mut Criterion) {
    let model = sample_filter_model();
    let columns = vec![
        ColumnDef::new("qty", FilterKind::Number),
        ColumnDef::new("status", FilterKind::Set),
        ColumnDef::new("due_date", FilterKind::Date),
        ColumnDef::new("title", FilterKind::Text),
    ];

    c.bench_function("filter_model_to_tuples", |b| {
        b.iter(|| black_box(&model).to_tuples());
    });

    let tuples = model.to_tuples();
    c.bench_function("tuples_to_filter_model", |b| {
        b.iter(|| FilterModel::from_tuples(black_box(&tuples), &columns));
    });
}

fn bench_query_build(c: &mut Criterion) {
    let config = GridConfig::default();
    let builder = QueryBuilder::new(&config);
    let model = sample_filter_model();
    let group_cols = vec![ColumnVo::new("status"), ColumnVo::new("owner")];
    let keys = vec!["Open".to_string()];
    let sort = vec![
        SortModelItem::new("qty", SortDirection::Desc),
        SortModelItem::new("ag-Grid-AutoColumn", SortDirection::Asc),
    ];
    let values = vec![ColumnVo::new("qty").with_agg("sum")];

    c.bench_function("query_build_grouped", |b| {
        b.iter(|| builder.build(black_box(&model), &group_cols, &keys, &sort, &values));
    });
}

fn bench_memory_paging(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_list_page");

    for size in [1000, 10000].iter() {
        let service = task_service(*size);
        let request = ListRequest {
            entity: "Task".to_string(),
            fields: vec!["name".to_string(), "title".to_string(), "modified".to_string()],
            filters: vec![FilterTuple::new(
                "qty",
                Operator::Between,
                FilterValue::Range(10.into(), 60.into()),
            )],
            start: 100,
            page_length: 100,
            order_by: "modified desc".to_string(),
            group_by: None,
            aggregate_function: None,
            aggregate_field: None,
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| service.list_matching(black_box(&request)));
        });
    }
    group.finish();
}

fn bench_memory_grouping(c: &mut Criterion) {
    let service = task_service(10000);
    let request = ListRequest {
        entity: "Task".to_string(),
        fields: vec!["status".to_string()],
        filters: Vec::new(),
        start: 0,
        page_length: 100,
        order_by: "status asc".to_string(),
        group_by: Some("status".to_string()),
        aggregate_function: Some("sum".to_string()),
        aggregate_field: Some("qty".to_string()),
    };

    c.bench_function("memory_group_sum_10000", |b| {
        b.iter(|| service.list_matching(black_box(&request)));
    });
}

criterion_group!(
    benches,
    bench_filter_translation,
    bench_query_build,
    bench_memory_paging,
    bench_memory_grouping,
);

criterion_main!(benches);
