/// Query Request Building
///
/// Folds the widget's filter, grouping, sort and aggregation state into one
/// request descriptor per fetch.
///
/// Grouping works level by level. With group columns `[status, owner]`:
///
/// ```text
/// keys []              -> groupBy "status"
/// keys ["Open"]        -> groupBy "owner",  filters += status = Open
/// keys ["Open", "bob"] -> groupBy none,     filters += status = Open, owner = bob
/// ```

use crate::column::SortDirection;
use crate::config::GridConfig;
use crate::filter::{merge_tuple, FilterModel, FilterTuple};
use serde::{Deserialize, Serialize};

/// Aggregate function that counts rows
pub const COUNT: &str = "count";

/// Group or value column as the widget describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnVo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg_func: Option<String>,
}

impl ColumnVo {
    pub fn new(id: impl Into<String>) -> Self {
        ColumnVo {
            id: id.into(),
            field: None,
            display_name: None,
            agg_func: None,
        }
    }

    pub fn with_agg(mut self, agg_func: impl Into<String>) -> Self {
        self.agg_func = Some(agg_func.into());
        self
    }

    /// Data field backing the column; falls back to the column id
    pub fn field(&self) -> &str {
        self.field.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortModelItem {
    pub col_id: String,
    pub sort: SortDirection,
}

impl SortModelItem {
    pub fn new(col_id: impl Into<String>, sort: SortDirection) -> Self {
        SortModelItem {
            col_id: col_id.into(),
            sort,
        }
    }
}

/// Single aggregation target. The remote service supports at most one per
/// grouped query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.agg_func.is_none()
    }
}

/// Normalized query state, independent of paging
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub filters: Vec<FilterTuple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub order_by: String,
    pub aggregate: Aggregate,
}

impl QueryPlan {
    pub fn into_request(self, start_row: usize, page_size: usize, visible_columns: Vec<String>) -> QueryRequest {
        QueryRequest {
            filters: self.filters,
            group_by: self.group_by,
            order_by: self.order_by,
            aggregate: self.aggregate,
            page_size,
            start_row,
            visible_columns,
        }
    }
}

/// Everything one page fetch needs. Built fresh per fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub filters: Vec<FilterTuple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    pub order_by: String,
    pub aggregate: Aggregate,
    pub page_size: usize,
    pub start_row: usize,
    pub visible_columns: Vec<String>,
}

/// Builds [`QueryPlan`]s from widget state.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    config: &'a GridConfig,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(config: &'a GridConfig) -> Self {
        QueryBuilder { config }
    }

    /// Build the plan for one fetch.
    ///
    /// # Arguments
    ///
    /// * `filter_model` - active column filters
    /// * `row_group_cols` - grouping columns, outermost first
    /// * `group_keys` - keys of the already-expanded group path
    /// * `sort_model` - sort entries in priority order
    /// * `value_cols` - aggregate columns; only the last is honored
    pub fn build(
        &self,
        filter_model: &FilterModel,
        row_group_cols: &[ColumnVo],
        group_keys: &[String],
        sort_model: &[SortModelItem],
        value_cols: &[ColumnVo],
    ) -> QueryPlan {
        let mut filters = Vec::new();
        for tuple in filter_model.to_tuples() {
            merge_tuple(&mut filters, tuple);
        }

        let group_by = self.fold_group_path(&mut filters, row_group_cols, group_keys);
        let order_by = self.order_by(sort_model);
        let aggregate = self.aggregate(value_cols, group_by.as_deref());

        QueryPlan {
            filters,
            group_by,
            order_by,
            aggregate,
        }
    }

    /// Fold expanded group keys into equality filters and return the field to
    /// group the next level by, if any level is still collapsed.
    pub fn fold_group_path(
        &self,
        filters: &mut Vec<FilterTuple>,
        row_group_cols: &[ColumnVo],
        group_keys: &[String],
    ) -> Option<String> {
        if row_group_cols.is_empty() {
            return None;
        }

        for (column, key) in row_group_cols.iter().zip(group_keys) {
            merge_tuple(filters, FilterTuple::equals(column.field(), key.as_str()));
        }

        row_group_cols
            .get(group_keys.len())
            .map(|column| column.field().to_string())
    }

    /// Comma-joined `"field direction"` list; the default ordering when the
    /// sort model is empty or only sorts the synthetic group column.
    pub fn order_by(&self, sort_model: &[SortModelItem]) -> String {
        let joined = sort_model
            .iter()
            .filter(|item| item.col_id != self.config.auto_group_column)
            .map(|item| format!("{} {}", item.col_id, item.sort.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        if joined.is_empty() {
            self.config.default_order_by.clone()
        } else {
            joined
        }
    }

    /// Aggregate for the last value column. A `count` counts the primary key,
    /// since counting a nullable field would skip rows, and is labelled with
    /// the grouping field.
    pub fn aggregate(&self, value_cols: &[ColumnVo], group_by: Option<&str>) -> Aggregate {
        let Some(column) = value_cols.last() else {
            return Aggregate::default();
        };
        let Some(agg_func) = column.agg_func.clone() else {
            return Aggregate::default();
        };

        if agg_func == COUNT {
            Aggregate {
                field: Some(self.config.primary_key.clone()),
                agg_func: Some(agg_func),
                field_name: Some(group_by.unwrap_or(column.field()).to_string()),
            }
        } else {
            Aggregate {
                field: Some(column.field().to_string()),
                agg_func: Some(agg_func),
                field_name: Some(column.field().to_string()),
            }
        }
    }
}

/// Keep only the most recently added value column. Returns the dropped ones.
pub fn trim_value_columns(value_cols: &mut Vec<ColumnVo>) -> Vec<ColumnVo> {
    if value_cols.len() <= 1 {
        return Vec::new();
    }
    let keep = value_cols.split_off(value_cols.len() - 1);
    std::mem::replace(value_cols, keep)
}
