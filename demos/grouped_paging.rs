/// Grouped Paging Example
///
/// This example demonstrates:
/// - Fetching group rows with inline counts and an aggregate
/// - Expanding a group to page through its leaf rows
/// - Child-entity filters merged into every request
/// - Failure reporting through the rows callback

use livegrid::*;
use serde_json::json;

struct PrintCallback;

impl RowsCallback for PrintCallback {
    fn success(&mut self, result: LoadSuccess) {
        println!("   loaded {} rows (count {:?})", result.row_data.len(), result.row_count);
    }

    fn fail(&mut self, error: &GridError) {
        println!("   could not load data: {}", error);
    }
}

fn seed(service: &MemoryService) {
    let owners = ["alice", "bob", "carol"];
    let statuses = ["Open", "Closed"];
    for i in 0..30usize {
        let items = if i % 4 == 0 { json!([{"item": "Bolt", "qty": 3}]) } else { json!([]) };
        if let Some(row) = json!({
            "name": format!("T-{:02}", i),
            "owner": owners[i % owners.len()],
            "status": statuses[i % statuses.len()],
            "hours": (i % 5) * 2,
            "modified": format!("2024-02-{:02}", i % 28 + 1),
            "items": items,
        })
        .as_object()
        {
            service.insert_row("Task", row.clone());
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> livegrid::Result<()> {
    println!("=== LiveGrid Grouped Paging Example ===\n");

    let service = MemoryService::new("name");
    seed(&service);
    let source = ServerSideSource::new("Task", service);
    let group_cols = vec![ColumnVo::new("owner"), ColumnVo::new("status")];
    let value_cols = vec![ColumnVo::new("hours").with_agg("sum")];

    // 1. Top level: one row per owner
    println!("1. Grouping by owner with sum(hours)...");
    let request = RowRequest::page(0, 100)
        .with_columns(&["owner", "hours"])
        .with_grouping(group_cols.clone(), vec![])
        .with_value_cols(value_cols.clone());
    let groups = source.fetch_rows(&request).await?;
    for row in &groups.row_data {
        println!("   {} count={} hours={}", row["owner"], row["count"], row["hours"]);
    }
    println!();

    // 2. Expand alice: one row per status
    println!("2. Expanding 'alice'...");
    let request = request.with_grouping(group_cols.clone(), vec!["alice".to_string()]);
    for row in &source.fetch_rows(&request).await?.row_data {
        println!("   {} count={}", row["status"], row["count"]);
    }
    println!();

    // 3. Fully expanded: leaf rows, paged
    println!("3. Expanding 'alice' / 'Open', two pages of 3...");
    for start in [0, 3] {
        let page = RowRequest::page(start, start + 3)
            .with_columns(&["name", "owner", "status"])
            .with_grouping(group_cols.clone(), vec!["alice".to_string(), "Open".to_string()]);
        let loaded = source.fetch_rows(&page).await?;
        let names: Vec<String> = loaded.row_data.iter().map(|r| r["name"].to_string()).collect();
        println!("   rows {}..{}: {}", start, start + 3, names.join(", "));
    }
    println!();

    // 4. Child filter
    println!("4. Only tasks with a 'Bolt' item...");
    source.set_child_filters(vec![FilterTuple::equals("item", "Bolt").with_entity("items")]);
    let mut callback = PrintCallback;
    source
        .get_rows(&RowRequest::page(0, 100).with_columns(&["name"]), &mut callback)
        .await;
    source.set_child_filters(Vec::new());
    println!();

    // 5. Unknown entity
    println!("5. Querying an entity the service does not have...");
    let missing = ServerSideSource::new("Project", MemoryService::new("name"));
    missing.get_rows(&RowRequest::page(0, 10), &mut callback).await;
    println!("   source state: {:?}", missing.state());

    println!("\n=== Example Complete ===");
    Ok(())
}
