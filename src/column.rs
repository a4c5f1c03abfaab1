/// LiveGrid Column Configuration
///
/// Two views of a column:
///
/// - [`ColumnDef`]: what the table currently offers (field name, filter kind).
///   This is the live schema that persisted state is reconciled against.
/// - [`ColumnState`]: the user's per-column UI state as the widget reports it
///   (visibility, sort, grouping, aggregation, width, pinning).

use crate::filter::FilterKind;
use serde::{Deserialize, Deserializer, Serialize};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// A column the table currently exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub field: String,
    #[serde(default, deserialize_with = "deserialize_filter_kind")]
    pub filter: FilterKind,
    #[serde(default)]
    pub hide: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}

impl ColumnDef {
    pub fn new(field: impl Into<String>, filter: FilterKind) -> Self {
        ColumnDef {
            field: field.into(),
            filter,
            hide: false,
            header_name: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }
}

fn deserialize_filter_kind<'de, D>(deserializer: D) -> Result<FilterKind, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.map(|n| FilterKind::from_widget_name(&n)).unwrap_or_default())
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-column UI state.
///
/// A grouped column is hidden from the flat view, and `sort_index` values are
/// dense among sorted columns only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnState {
    pub col_id: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hide: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_group_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg_func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<String>,
}

impl ColumnState {
    pub fn new(col_id: impl Into<String>) -> Self {
        ColumnState {
            col_id: col_id.into(),
            hide: false,
            sort: None,
            sort_index: None,
            row_group: None,
            row_group_index: None,
            agg_func: None,
            width: None,
            pinned: None,
        }
    }

    pub fn sorted(mut self, sort: SortDirection, sort_index: usize) -> Self {
        self.sort = Some(sort);
        self.sort_index = Some(sort_index);
        self
    }

    pub fn grouped(mut self, row_group_index: usize) -> Self {
        self.row_group = Some(true);
        self.row_group_index = Some(row_group_index);
        self.hide = true;
        self
    }

    pub fn aggregated(mut self, agg_func: impl Into<String>) -> Self {
        self.agg_func = Some(agg_func.into());
        self
    }

    pub fn is_grouped(&self) -> bool {
        self.row_group == Some(true) || self.row_group_index.is_some()
    }

    /// Clear sort, grouping and aggregation flags
    pub fn clear_derived(&mut self) {
        self.sort = None;
        self.sort_index = None;
        self.row_group = None;
        self.row_group_index = None;
        self.agg_func = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_state_json_shape() {
        let state = ColumnState::new("due_date").sorted(SortDirection::Desc, 0);
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"colId": "due_date", "sort": "desc", "sortIndex": 0})
        );

        let parsed: ColumnState =
            serde_json::from_value(json!({"colId": "status", "rowGroup": true, "rowGroupIndex": 0, "width": 120}))
                .unwrap();
        assert!(parsed.is_grouped());
        assert_eq!(parsed.width, Some(120.0));
        assert!(!parsed.hide);
    }

    #[test]
    fn test_grouped_column_is_hidden() {
        let state = ColumnState::new("status").grouped(0);
        assert!(state.hide);
        assert!(state.is_grouped());
    }

    #[test]
    fn test_column_def_filter_names() {
        let defs: Vec<ColumnDef> = serde_json::from_value(json!([
            {"field": "qty", "filter": "agNumberColumnFilter"},
            {"field": "owner", "filter": "link"},
            {"field": "notes", "filter": "somethingCustom"},
            {"field": "title"}
        ]))
        .unwrap();
        assert_eq!(defs[0].filter, FilterKind::Number);
        assert_eq!(defs[1].filter, FilterKind::Link);
        assert_eq!(defs[2].filter, FilterKind::Text);
        assert_eq!(defs[3].filter, FilterKind::Text);
    }
}
