/// Table State Persistence
///
/// Saves and restores a table's column layout and query state across
/// sessions. Two scopes are written per table:
///
/// - durable `{tableId}-layout`: `{column_state, sort_model}`
/// - session `{tableId}-state`: `{filters, group_state, aggregate}`
///
/// On load the persisted state is reconciled against the table's current
/// columns. References to columns that no longer exist are dropped without
/// error, and the sort, grouping, aggregation and visibility flags of every
/// column are re-derived from the separately stored lists rather than taken
/// from the column-state snapshot.
///
/// # Example
///
/// ```
/// use livegrid::column::{ColumnDef, ColumnState, SortDirection};
/// use livegrid::filter::{ConditionType, FilterKind, FilterModel, FilterModelEntry};
/// use livegrid::state::TableStateStore;
/// use livegrid::storage::MemoryStore;
///
/// let store = TableStateStore::new(MemoryStore::new(), MemoryStore::new());
///
/// let columns = vec![ColumnState::new("name"), ColumnState::new("due_date").sorted(SortDirection::Desc, 0)];
/// let mut filters = FilterModel::new();
/// filters.set("name", FilterModelEntry::text(ConditionType::Contains, "alpha"));
/// store.save("Task", &columns, &filters).unwrap();
///
/// let current = vec![ColumnDef::new("name", FilterKind::Text), ColumnDef::new("due_date", FilterKind::Date)];
/// let loaded = store.load("Task", &current, None).unwrap();
/// assert_eq!(loaded.column_state[1].sort, Some(SortDirection::Desc));
/// assert!(loaded.filter_model.get("name").is_some());
/// ```

use crate::column::{ColumnDef, ColumnState, SortDirection};
use crate::config::GridConfig;
use crate::error::Result;
use crate::filter::{deserialize_tuples_lenient, FilterModel, FilterTuple};
use crate::storage::{read_json, write_json, KeyValueStore, StorageKey};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// One entry of the persisted sort model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortState {
    pub col_id: String,
    pub sort: SortDirection,
    pub sort_index: usize,
}

/// One grouping level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupState {
    pub col_id: String,
    pub row_group_index: usize,
}

/// One aggregated column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub col_id: String,
    pub agg_func: String,
}

/// Durable layout blob
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableLayout {
    #[serde(default)]
    pub column_state: Vec<ColumnState>,
    #[serde(default)]
    pub sort_model: Vec<SortState>,
}

/// Session query-state blob
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableQueryState {
    #[serde(default, deserialize_with = "deserialize_tuples_lenient")]
    pub filters: Vec<FilterTuple>,
    #[serde(default)]
    pub group_state: Vec<GroupState>,
    #[serde(default)]
    pub aggregate: Vec<AggregateState>,
}

/// Result of [`TableStateStore::load`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadedState {
    pub column_state: Vec<ColumnState>,
    pub filter_model: FilterModel,
}

/// Per-table state persistence over a durable and a session store.
pub struct TableStateStore<D: KeyValueStore, S: KeyValueStore> {
    durable: D,
    session: S,
    config: GridConfig,
}

impl<D: KeyValueStore, S: KeyValueStore> TableStateStore<D, S> {
    pub fn new(durable: D, session: S) -> Self {
        Self::with_config(durable, session, GridConfig::default())
    }

    pub fn with_config(durable: D, session: S, config: GridConfig) -> Self {
        TableStateStore {
            durable,
            session,
            config,
        }
    }

    pub fn durable(&self) -> &D {
        &self.durable
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Persist the widget's column state and filters.
    ///
    /// Sort indexes and group indexes are renumbered densely in their existing
    /// order. Filters on fields that no column carries are dropped unless the
    /// field is always valid.
    pub fn save(&self, table_id: &str, column_state: &[ColumnState], filter_model: &FilterModel) -> Result<()> {
        let mut columns = column_state.to_vec();
        let sort_model = renumber_sorts(&mut columns);
        let group_state = renumber_groups(&mut columns);
        let aggregate = columns
            .iter()
            .filter_map(|c| {
                c.agg_func.as_ref().map(|f| AggregateState {
                    col_id: c.col_id.clone(),
                    agg_func: f.clone(),
                })
            })
            .collect();

        let known: HashSet<&str> = columns.iter().map(|c| c.col_id.as_str()).collect();
        let filters = filter_model
            .to_tuples()
            .into_iter()
            .filter(|t| {
                let keep = known.contains(t.field.as_str()) || self.config.is_always_valid_filter_field(&t.field);
                if !keep {
                    log::debug!("not saving filter on unknown field '{}'", t.field);
                }
                keep
            })
            .collect();

        let layout = TableLayout {
            column_state: columns,
            sort_model,
        };
        let query = TableQueryState {
            filters,
            group_state,
            aggregate,
        };
        write_json(&self.durable, &StorageKey::Layout.for_table(table_id), &layout)?;
        write_json(&self.session, &StorageKey::State.for_table(table_id), &query)?;
        log::debug!(
            "saved state for '{}': {} columns, {} filters",
            table_id,
            layout.column_state.len(),
            query.filters.len()
        );
        Ok(())
    }

    /// Restore state for the table's current columns.
    ///
    /// `default_filters`, when given, replace any persisted filters and are
    /// written back as the new session state.
    pub fn load(
        &self,
        table_id: &str,
        current_columns: &[ColumnDef],
        default_filters: Option<&[FilterTuple]>,
    ) -> Result<LoadedState> {
        let layout = self.layout(table_id).unwrap_or_default();
        let mut query = self.query_state(table_id).unwrap_or_default();

        let current: HashSet<&str> = current_columns.iter().map(|c| c.field.as_str()).collect();

        let mut seen = HashSet::new();
        let mut columns: Vec<ColumnState> = Vec::with_capacity(current_columns.len());
        for state in layout.column_state {
            if !current.contains(state.col_id.as_str()) {
                log::debug!("dropping stale column '{}' from '{}'", state.col_id, table_id);
                continue;
            }
            if seen.insert(state.col_id.clone()) {
                columns.push(state);
            }
        }
        for def in current_columns {
            if !seen.contains(&def.field) {
                let mut state = ColumnState::new(def.field.clone());
                state.hide = def.hide;
                columns.push(state);
            }
        }

        let mut sorts: Vec<&SortState> = layout
            .sort_model
            .iter()
            .filter(|s| current.contains(s.col_id.as_str()))
            .collect();
        sorts.sort_by_key(|s| s.sort_index);
        let mut groups: Vec<&GroupState> = query
            .group_state
            .iter()
            .filter(|g| current.contains(g.col_id.as_str()))
            .collect();
        groups.sort_by_key(|g| g.row_group_index);

        for state in columns.iter_mut() {
            let was_grouped = state.is_grouped();
            state.clear_derived();

            if let Some(pos) = sorts.iter().position(|s| s.col_id == state.col_id) {
                state.sort = Some(sorts[pos].sort);
                state.sort_index = Some(pos);
            }
            if let Some(pos) = groups.iter().position(|g| g.col_id == state.col_id) {
                state.row_group = Some(true);
                state.row_group_index = Some(pos);
                state.hide = true;
            } else if was_grouped {
                state.hide = false;
            }
            if let Some(agg) = query.aggregate.iter().find(|a| a.col_id == state.col_id) {
                state.agg_func = Some(agg.agg_func.clone());
            }
        }

        let filters = match default_filters {
            Some(defaults) => {
                query.filters = defaults.to_vec();
                write_json(&self.session, &StorageKey::State.for_table(table_id), &query)?;
                query.filters
            }
            None => query
                .filters
                .into_iter()
                .filter(|t| current.contains(t.field.as_str()) || self.config.is_always_valid_filter_field(&t.field))
                .collect(),
        };

        Ok(LoadedState {
            column_state: columns,
            filter_model: FilterModel::from_tuples(&filters, current_columns),
        })
    }

    /// Persisted layout, if any can be read
    pub fn layout(&self, table_id: &str) -> Option<TableLayout> {
        read_json(&self.durable, &StorageKey::Layout.for_table(table_id))
    }

    /// Persisted query state, if any can be read
    pub fn query_state(&self, table_id: &str) -> Option<TableQueryState> {
        read_json(&self.session, &StorageKey::State.for_table(table_id))
    }

    /// Forget the durable layout only
    pub fn reset_layout(&self, table_id: &str) -> Result<()> {
        self.durable.remove(&StorageKey::Layout.for_table(table_id))
    }

    /// Forget everything stored for the table in both scopes
    pub fn clear(&self, table_id: &str) -> Result<()> {
        for key in StorageKey::all() {
            let key_name = key.for_table(table_id);
            if *key == StorageKey::Layout {
                self.durable.remove(&key_name)?;
            } else {
                self.session.remove(&key_name)?;
            }
        }
        log::info!("cleared stored state for '{}'", table_id);
        Ok(())
    }

    /// Persist filters on child entities. An empty list removes the key.
    pub fn save_child_table_filters(&self, table_id: &str, filters: &[FilterTuple]) -> Result<()> {
        let key = StorageKey::ChildTableFilters.for_table(table_id);
        if filters.is_empty() {
            return self.session.remove(&key);
        }
        write_json(&self.session, &key, &filters)
    }

    pub fn load_child_table_filters(&self, table_id: &str) -> Vec<FilterTuple> {
        let key = StorageKey::ChildTableFilters.for_table(table_id);
        let raw: Vec<JsonValue> = read_json(&self.session, &key).unwrap_or_default();
        raw.iter().filter_map(FilterTuple::from_json).collect()
    }
}

/// Renumber sorted columns 0.. in their current sort order, returning the
/// sort model.
fn renumber_sorts(columns: &mut [ColumnState]) -> Vec<SortState> {
    let mut order: Vec<usize> = (0..columns.len()).filter(|&i| columns[i].sort.is_some()).collect();
    order.sort_by_key(|&i| (columns[i].sort_index.unwrap_or(usize::MAX), i));

    let mut sort_model = Vec::with_capacity(order.len());
    for (sort_index, i) in order.into_iter().enumerate() {
        let column = &mut columns[i];
        column.sort_index = Some(sort_index);
        if let Some(sort) = column.sort {
            sort_model.push(SortState {
                col_id: column.col_id.clone(),
                sort,
                sort_index,
            });
        }
    }
    for column in columns.iter_mut().filter(|c| c.sort.is_none()) {
        column.sort_index = None;
    }
    sort_model
}

fn renumber_groups(columns: &mut [ColumnState]) -> Vec<GroupState> {
    let mut order: Vec<usize> = (0..columns.len()).filter(|&i| columns[i].is_grouped()).collect();
    order.sort_by_key(|&i| (columns[i].row_group_index.unwrap_or(usize::MAX), i));

    order
        .into_iter()
        .enumerate()
        .map(|(row_group_index, i)| {
            let column = &mut columns[i];
            column.row_group = Some(true);
            column.row_group_index = Some(row_group_index);
            column.hide = true;
            GroupState {
                col_id: column.col_id.clone(),
                row_group_index,
            }
        })
        .collect()
}
