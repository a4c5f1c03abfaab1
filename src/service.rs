/// Remote data service boundary
///
/// The document service the row source pulls from. Two calls are consumed:
/// `count(entity, filters)` and `list(...)`, which answers in a compact
/// `{keys, values}` form rather than one object per row.

use crate::error::Result;
use crate::filter::FilterTuple;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// One row of data as the widget receives it
pub type Row = Map<String, JsonValue>;

/// Column carrying the aggregate value in grouped results
pub const AGGREGATE_COLUMN: &str = "_aggregate_column";

/// Column carrying the number of rows in each group
pub const GROUP_COUNT_COLUMN: &str = "count";

/// Arguments of a `list` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub entity: String,
    pub fields: Vec<String>,
    pub filters: Vec<FilterTuple>,
    pub start: usize,
    pub page_length: usize,
    pub order_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_field: Option<String>,
}

/// Result of a `list` call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub keys: Vec<String>,
    pub values: Vec<Vec<JsonValue>>,
    #[serde(default)]
    pub user_info: JsonValue,
}

impl ListResponse {
    pub fn from_rows(keys: Vec<String>, rows: &[Row]) -> Self {
        let values = rows
            .iter()
            .map(|row| {
                keys.iter()
                    .map(|k| row.get(k).cloned().unwrap_or(JsonValue::Null))
                    .collect()
            })
            .collect();
        ListResponse {
            keys,
            values,
            user_info: JsonValue::Null,
        }
    }

    /// Zip keys with each value row. Short rows are padded with nulls.
    pub fn into_rows(self) -> Vec<Row> {
        let keys = self.keys;
        self.values
            .into_iter()
            .map(|values| {
                let mut values = values.into_iter();
                keys.iter()
                    .map(|k| (k.clone(), values.next().unwrap_or(JsonValue::Null)))
                    .collect()
            })
            .collect()
    }
}

/// The remote document service.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Number of documents matching `filters`
    async fn count(&self, entity: &str, filters: &[FilterTuple]) -> Result<u64>;

    /// One page of documents, or one page of groups when `group_by` is set
    async fn list(&self, request: &ListRequest) -> Result<ListResponse>;
}

#[async_trait]
impl<T: DataService + ?Sized> DataService for Arc<T> {
    async fn count(&self, entity: &str, filters: &[FilterTuple]) -> Result<u64> {
        (**self).count(entity, filters).await
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        (**self).list(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_rows_pads_short_rows() {
        let response = ListResponse {
            keys: vec!["name".to_string(), "title".to_string()],
            values: vec![vec![json!("T-1"), json!("First")], vec![json!("T-2")]],
            user_info: JsonValue::Null,
        };
        let rows = response.into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], json!("First"));
        assert_eq!(rows[1]["title"], JsonValue::Null);
    }

    #[test]
    fn test_list_request_wire_shape() {
        let request = ListRequest {
            entity: "Task".to_string(),
            fields: vec!["name".to_string(), "modified".to_string()],
            filters: vec![FilterTuple::equals("status", "Open")],
            start: 20,
            page_length: 20,
            order_by: "modified desc".to_string(),
            group_by: None,
            aggregate_function: None,
            aggregate_field: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "entity": "Task",
                "fields": ["name", "modified"],
                "filters": [["status", "=", "Open"]],
                "start": 20,
                "pageLength": 20,
                "orderBy": "modified desc"
            })
        );
    }
}
