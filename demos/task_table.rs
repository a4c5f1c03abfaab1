/// Task Table Example
///
/// This example demonstrates:
/// - Translating a widget filter model into filter tuples
/// - Pulling pages through a server-side row source
/// - Saving the table's layout and filters, then restoring them
/// - Tracking a select-all-except selection

use livegrid::filter::ConditionType;
use livegrid::*;
use serde_json::json;

fn seed(service: &MemoryService) {
    let rows = [
        ("T-1", "alpha launch", "Open", "2024-03-01", "2024-01-01"),
        ("T-2", "beta review", "Closed", "2024-02-11", "2024-01-02"),
        ("T-3", "alpha retro", "Open", "2024-04-20", "2024-01-03"),
        ("T-4", "gamma rollout", "Working", "2024-01-15", "2024-01-04"),
        ("T-5", "alpha docs", "Closed", "2024-05-02", "2024-01-05"),
    ];
    for (name, title, status, due_date, modified) in rows {
        if let Some(row) = json!({
            "name": name,
            "title": title,
            "status": status,
            "due_date": due_date,
            "modified": modified,
        })
        .as_object()
        {
            service.insert_row("Task", row.clone());
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> livegrid::Result<()> {
    println!("=== LiveGrid Task Table Example ===\n");

    let service = MemoryService::new("name");
    seed(&service);
    let source = ServerSideSource::new("Task", service);

    let durable = MemoryStore::new();
    let session = MemoryStore::new();
    let store = TableStateStore::new(&durable, &session);

    let columns = vec![
        ColumnDef::new("name", FilterKind::Text),
        ColumnDef::new("title", FilterKind::Text),
        ColumnDef::new("status", FilterKind::Set),
        ColumnDef::new("due_date", FilterKind::Date),
    ];

    // 1. Restore (nothing stored yet)
    println!("1. Loading state...");
    let loaded = store.load("Task", &columns, None)?;
    println!("   {} columns, {} filters\n", loaded.column_state.len(), loaded.filter_model.len());
    let mut column_state = loaded.column_state;

    // 2. Filter and sort
    println!("2. Filtering title contains 'alpha', sorting by due_date desc...");
    let mut filter_model = FilterModel::new();
    filter_model.set("title", FilterModelEntry::text(ConditionType::Contains, "alpha"));
    for tuple in filter_model.to_tuples() {
        println!("   tuple: {}", serde_json::to_string(&tuple)?);
    }
    if let Some(due) = column_state.iter_mut().find(|c| c.col_id == "due_date") {
        due.sort = Some(SortDirection::Desc);
        due.sort_index = Some(0);
    }

    let request = RowRequest::page(0, 2)
        .with_columns(&["ag-Grid-SelectionColumn", "name", "title", "due_date"])
        .with_filter_model(filter_model.clone())
        .with_sort(vec![SortModelItem::new("due_date", SortDirection::Desc)]);
    let page = source.fetch_rows(&request).await?;
    println!("   {} matching rows, first page:", page.row_count.unwrap_or(0));
    for row in &page.row_data {
        println!("   {} | {} | {}", row["name"], row["title"], row["due_date"]);
    }
    println!();

    // 3. Persist
    println!("3. Saving state...");
    store.save("Task", &column_state, &filter_model)?;
    println!("   Task-layout: {}", durable.get("Task-layout").unwrap_or_default());
    println!("   Task-state:  {}\n", session.get("Task-state").unwrap_or_default());

    // 4. Restore after a schema change dropped due_date
    println!("4. Reloading without the due_date column...");
    let reloaded = store.load("Task", &columns[..3], None)?;
    for state in &reloaded.column_state {
        println!("   {} sort={:?}", state.col_id, state.sort);
    }
    println!("   filter model: {}\n", serde_json::to_string(&reloaded.filter_model)?);

    // 5. Selection
    println!("5. Select all, then deselect T-3...");
    let mut tracker = SelectionTracker::new("Task", "name", &session);
    tracker.attach(SelectionState::new());
    tracker.select_all();
    tracker.toggle("T-3");
    let selected = tracker.sync(&page.row_data)?;
    println!("   {} selected on the loaded page", selected.len());

    println!("\n=== Example Complete ===");
    Ok(())
}
