/// Row Selection Tracking
///
/// The widget reports selection as a base state plus exceptions: with
/// `select_all` set, `toggled_ids` are the rows explicitly deselected;
/// without it they are the rows explicitly selected. This never needs every
/// row id in memory, which matters when most rows were never fetched.
///
/// The tracker resolves that against the rows currently materialized and
/// mirrors the effective selection into session storage under
/// `{tableId}-selected-row` for other views (a bulk-action bar, say).

use crate::error::Result;
use crate::service::Row;
use crate::storage::{read_json, write_json, KeyValueStore, StorageKey};
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Select-all-except selection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    #[serde(default)]
    pub select_all: bool,
    #[serde(default)]
    pub toggled_ids: HashSet<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one row against the base state
    pub fn toggle(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.toggled_ids.remove(&id) {
            self.toggled_ids.insert(id);
        }
    }

    pub fn select_all(&mut self) {
        self.select_all = true;
        self.toggled_ids.clear();
    }

    pub fn deselect_all(&mut self) {
        self.select_all = false;
        self.toggled_ids.clear();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.select_all != self.toggled_ids.contains(id)
    }

    /// Ids selected among `available`, in the order given
    pub fn effective<'a>(&self, available: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        available.into_iter().filter(|id| self.is_selected(id)).collect()
    }
}

/// Tracks one table's selection and keeps its session copy current.
pub struct SelectionTracker<S: KeyValueStore> {
    table_id: String,
    primary_key: String,
    store: S,
    state: Option<SelectionState>,
}

impl<S: KeyValueStore> SelectionTracker<S> {
    /// A tracker with no selection primitive attached yet
    pub fn new(table_id: impl Into<String>, primary_key: impl Into<String>, store: S) -> Self {
        SelectionTracker {
            table_id: table_id.into(),
            primary_key: primary_key.into(),
            store,
            state: None,
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Attach the widget's selection state once the widget is ready
    pub fn attach(&mut self, state: SelectionState) {
        self.state = Some(state);
    }

    pub fn detach(&mut self) -> Option<SelectionState> {
        self.state.take()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&SelectionState> {
        self.state.as_ref()
    }

    /// Flip a row; ignored until the widget is ready
    pub fn toggle(&mut self, id: impl Into<String>) -> bool {
        match self.state.as_mut() {
            Some(state) => {
                state.toggle(id);
                true
            }
            None => {
                log::debug!("selection for '{}' not ready; toggle ignored", self.table_id);
                false
            }
        }
    }

    pub fn select_all(&mut self) -> bool {
        match self.state.as_mut() {
            Some(state) => {
                state.select_all();
                true
            }
            None => false,
        }
    }

    pub fn deselect_all(&mut self) -> bool {
        match self.state.as_mut() {
            Some(state) => {
                state.deselect_all();
                true
            }
            None => false,
        }
    }

    fn row_id(&self, row: &Row) -> Option<String> {
        row.get(&self.primary_key)
            .map(Scalar::from_json)
            .filter(|id| !id.is_null())
            .map(|id| id.to_text())
    }

    /// Effective selection among the materialized `rows`. Empty when the
    /// widget is not ready.
    pub fn selected_rows(&self, rows: &[Row]) -> Vec<Row> {
        let Some(state) = &self.state else {
            return Vec::new();
        };
        rows.iter()
            .filter(|row| self.row_id(row).is_some_and(|id| state.is_selected(&id)))
            .cloned()
            .collect()
    }

    /// Recompute the selection and mirror it to session storage, removing
    /// the entry when nothing is selected.
    pub fn sync(&self, rows: &[Row]) -> Result<Vec<Row>> {
        let selected = self.selected_rows(rows);
        let key = StorageKey::SelectedRows.for_table(&self.table_id);
        if selected.is_empty() {
            self.store.remove(&key)?;
        } else {
            write_json(&self.store, &key, &selected)?;
        }
        log::debug!("'{}' has {} selected rows", self.table_id, selected.len());
        Ok(selected)
    }

    /// The selection last written to session storage
    pub fn stored_rows(&self) -> Vec<Row> {
        read_json(&self.store, &StorageKey::SelectedRows.for_table(&self.table_id)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter()
            .map(|id| json!({"name": id, "title": format!("Task {}", id)}).as_object().unwrap().clone())
            .collect()
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r["name"].as_str().unwrap().to_string()).collect()
    }

    #[test]
    fn test_explicit_selection() {
        let mut state = SelectionState::new();
        state.toggle("T-2");
        assert_eq!(state.effective(["T-1", "T-2", "T-3"]), vec!["T-2"]);
    }

    #[test]
    fn test_select_all_except() {
        let mut state = SelectionState::new();
        state.select_all();
        state.toggle("T-2");
        assert_eq!(state.effective(["T-1", "T-2", "T-3"]), vec!["T-1", "T-3"]);
    }

    #[test]
    fn test_toggle_twice_is_idempotent() {
        let mut state = SelectionState::new();
        state.select_all();
        let before = state.effective(["T-1", "T-2"]);
        state.toggle("T-1");
        state.toggle("T-1");
        assert_eq!(state.effective(["T-1", "T-2"]), before);
        assert!(state.toggled_ids.is_empty());
    }

    #[test]
    fn test_not_ready_returns_empty() {
        let mut tracker = SelectionTracker::new("Task", "name", MemoryStore::new());
        assert!(!tracker.toggle("T-1"));
        assert!(tracker.selected_rows(&rows(&["T-1"])).is_empty());
        assert!(tracker.sync(&rows(&["T-1"])).unwrap().is_empty());
    }

    #[test]
    fn test_sync_pushes_and_clears_storage() {
        let store = MemoryStore::new();
        let mut tracker = SelectionTracker::new("Task", "name", &store);
        tracker.attach(SelectionState::new());
        let page = rows(&["T-1", "T-2", "T-3"]);

        tracker.toggle("T-3");
        let selected = tracker.sync(&page).unwrap();
        assert_eq!(names(&selected), vec!["T-3"]);
        assert!(store.get("Task-selected-row").is_some());
        assert_eq!(names(&tracker.stored_rows()), vec!["T-3"]);

        tracker.select_all();
        assert_eq!(tracker.sync(&page).unwrap().len(), 3);

        tracker.deselect_all();
        assert!(tracker.sync(&page).unwrap().is_empty());
        assert_eq!(store.get("Task-selected-row"), None);
        assert!(tracker.stored_rows().is_empty());
    }

    #[test]
    fn test_numeric_ids() {
        let mut tracker = SelectionTracker::new("Item", "id", MemoryStore::new());
        tracker.attach(SelectionState::new());
        tracker.toggle("7");
        let page: Vec<Row> = vec![
            json!({"id": 7}).as_object().unwrap().clone(),
            json!({"id": 8}).as_object().unwrap().clone(),
            json!({"title": "no id"}).as_object().unwrap().clone(),
        ];
        let selected = tracker.selected_rows(&page);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["id"], json!(7));
    }
}
