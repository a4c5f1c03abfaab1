/// In-memory data service
///
/// A [`DataService`] over plain JSON rows held in process. It evaluates filter
/// tuples, multi-key ordering, single-level grouping with aggregation and
/// paging the way the remote document service does, which makes it the
/// backing store for demos, benchmarks, tests and the websocket server.
///
/// # Examples
///
/// ```
/// use livegrid::memory::MemoryService;
/// use livegrid::filter::FilterTuple;
/// use serde_json::json;
///
/// let service = MemoryService::new("name");
/// service.insert_rows("Task", vec![
///     json!({"name": "T-1", "status": "Open"}).as_object().unwrap().clone(),
///     json!({"name": "T-2", "status": "Closed"}).as_object().unwrap().clone(),
/// ]);
/// assert_eq!(service.count_matching("Task", &[FilterTuple::equals("status", "Open")]).unwrap(), 1);
/// ```

use crate::column::SortDirection;
use crate::error::{GridError, Result};
use crate::filter::{FilterTuple, FilterValue, Operator};
use crate::service::{DataService, ListRequest, ListResponse, Row, AGGREGATE_COLUMN, GROUP_COUNT_COLUMN};
use crate::value::Scalar;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct MemoryService {
    primary_key: String,
    entities: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryService {
    pub fn new(primary_key: impl Into<String>) -> Self {
        MemoryService {
            primary_key: primary_key.into(),
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Row>>> {
        self.entities.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Row>>> {
        self.entities.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an entity with no rows
    pub fn create_entity(&self, entity: &str) {
        self.write().entry(entity.to_string()).or_default();
    }

    pub fn insert_rows(&self, entity: &str, rows: Vec<Row>) {
        self.write().entry(entity.to_string()).or_default().extend(rows);
    }

    pub fn insert_row(&self, entity: &str, row: Row) {
        self.insert_rows(entity, vec![row]);
    }

    /// Delete rows by primary key; returns how many were removed
    pub fn delete(&self, entity: &str, keys: &[String]) -> usize {
        let mut entities = self.write();
        let Some(rows) = entities.get_mut(entity) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| {
            let key = row.get(&self.primary_key).map(Scalar::from_json).unwrap_or_default();
            !keys.iter().any(|k| key.to_text() == *k)
        });
        before - rows.len()
    }

    pub fn len(&self, entity: &str) -> usize {
        self.read().get(entity).map(Vec::len).unwrap_or(0)
    }

    pub fn entities(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Synchronous `count`
    pub fn count_matching(&self, entity: &str, filters: &[FilterTuple]) -> Result<usize> {
        let entities = self.read();
        let rows = entities
            .get(entity)
            .ok_or_else(|| GridError::service(format!("no such entity '{}'", entity)))?;
        Ok(rows.iter().filter(|row| row_matches(entity, row, filters)).count())
    }

    /// Synchronous `list`
    pub fn list_matching(&self, request: &ListRequest) -> Result<ListResponse> {
        let entities = self.read();
        let rows = entities
            .get(&request.entity)
            .ok_or_else(|| GridError::service(format!("no such entity '{}'", request.entity)))?;

        let matching: Vec<&Row> = rows
            .iter()
            .filter(|row| row_matches(&request.entity, row, &request.filters))
            .collect();

        let order = parse_order_by(&request.order_by);
        match &request.group_by {
            Some(group_by) => Ok(self.list_groups(request, group_by, &matching, &order)),
            None => Ok(list_flat(request, matching, &order)),
        }
    }

    fn list_groups(
        &self,
        request: &ListRequest,
        group_by: &str,
        rows: &[&Row],
        order: &[(String, SortDirection)],
    ) -> ListResponse {
        // Group in first-seen order, then sort
        let mut groups: Vec<(JsonValue, Vec<&Row>)> = Vec::new();
        for row in rows {
            let key = row.get(group_by).cloned().unwrap_or(JsonValue::Null);
            let key_scalar = Scalar::from_json(&key);
            match groups
                .iter_mut()
                .find(|(k, _)| Scalar::from_json(k).loose_eq(&key_scalar))
            {
                Some((_, members)) => members.push(row),
                None => groups.push((key, vec![row])),
            }
        }

        let mut group_rows: Vec<Row> = groups
            .into_iter()
            .map(|(key, members)| {
                let mut out = Row::new();
                out.insert(group_by.to_string(), key);
                out.insert(GROUP_COUNT_COLUMN.to_string(), JsonValue::from(members.len() as u64));
                if let Some(function) = &request.aggregate_function {
                    let field = request.aggregate_field.as_deref().unwrap_or(&self.primary_key);
                    out.insert(AGGREGATE_COLUMN.to_string(), aggregate(function, field, &members));
                }
                out
            })
            .collect();

        let group_order: Vec<(String, SortDirection)> = order
            .iter()
            .filter(|(field, _)| {
                field == group_by || field == GROUP_COUNT_COLUMN || field == AGGREGATE_COLUMN
            })
            .cloned()
            .collect();
        if group_order.is_empty() {
            group_rows.sort_by(|a, b| compare_rows(a, b, &[(group_by.to_string(), SortDirection::Asc)]));
        } else {
            group_rows.sort_by(|a, b| compare_rows(a, b, &group_order));
        }

        let mut keys = vec![group_by.to_string(), GROUP_COUNT_COLUMN.to_string()];
        if request.aggregate_function.is_some() {
            keys.push(AGGREGATE_COLUMN.to_string());
        }
        let page = paginate(group_rows, request.start, request.page_length);
        ListResponse::from_rows(keys, &page)
    }
}

fn list_flat(request: &ListRequest, mut rows: Vec<&Row>, order: &[(String, SortDirection)]) -> ListResponse {
    if !order.is_empty() {
        rows.sort_by(|a, b| compare_rows(a, b, order));
    }
    let page: Vec<Row> = rows
        .into_iter()
        .skip(request.start)
        .take(request.page_length)
        .cloned()
        .collect();
    ListResponse::from_rows(request.fields.clone(), &page)
}

fn paginate(rows: Vec<Row>, start: usize, page_length: usize) -> Vec<Row> {
    rows.into_iter().skip(start).take(page_length).collect()
}

#[async_trait]
impl DataService for MemoryService {
    async fn count(&self, entity: &str, filters: &[FilterTuple]) -> Result<u64> {
        self.count_matching(entity, filters).map(|n| n as u64)
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        self.list_matching(request)
    }
}

/// True when `row` satisfies every tuple. Tuples scoped to another entity
/// match when any child row stored under that entity's key matches.
pub fn row_matches(entity: &str, row: &Row, filters: &[FilterTuple]) -> bool {
    filters.iter().all(|tuple| match &tuple.entity {
        Some(child) if child != entity => row
            .get(child)
            .and_then(JsonValue::as_array)
            .map(|children| {
                children
                    .iter()
                    .filter_map(JsonValue::as_object)
                    .any(|c| tuple_matches(c, tuple))
            })
            .unwrap_or(false),
        _ => tuple_matches(row, tuple),
    })
}

/// Evaluate one tuple against one row
pub fn tuple_matches(row: &Row, tuple: &FilterTuple) -> bool {
    let cell = row.get(&tuple.field).map(Scalar::from_json).unwrap_or_default();

    match tuple.operator {
        Operator::Equals => cell.loose_eq(&tuple.value.first()),
        Operator::NotEquals => !cell.loose_eq(&tuple.value.first()),
        Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
            like(&cell.to_text(), &tuple.value.first().to_text())
        }
        Operator::NotContains => !like(&cell.to_text(), &tuple.value.first().to_text()),
        Operator::LessThan => compare_non_null(&cell, &tuple.value.first(), |o| o == Ordering::Less),
        Operator::LessOrEqual => compare_non_null(&cell, &tuple.value.first(), |o| o != Ordering::Greater),
        Operator::GreaterThan => compare_non_null(&cell, &tuple.value.first(), |o| o == Ordering::Greater),
        Operator::GreaterOrEqual => compare_non_null(&cell, &tuple.value.first(), |o| o != Ordering::Less),
        Operator::Between => match &tuple.value {
            FilterValue::Range(from, to) => {
                !cell.is_null()
                    && (from.is_null() || cell.loose_cmp(from) != Ordering::Less)
                    && (to.is_null() || cell.loose_cmp(to) != Ordering::Greater)
            }
            other => cell.loose_eq(&other.first()),
        },
        Operator::In => tuple.value.items().iter().any(|v| cell.loose_eq(v)),
        Operator::NotIn => !tuple.value.items().iter().any(|v| cell.loose_eq(v)),
        Operator::IsBlank => cell.is_blank(),
        Operator::IsNotBlank => !cell.is_blank(),
    }
}

fn compare_non_null(cell: &Scalar, value: &Scalar, accept: impl Fn(Ordering) -> bool) -> bool {
    !cell.is_null() && accept(cell.loose_cmp(value))
}

/// Case-insensitive SQL `like` with `%` wildcards
pub fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();

    if parts.len() == 1 {
        return text == pattern;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    text.len() >= pos + last.len() && text[pos..].ends_with(last)
}

/// Parse `"a desc, b asc"`; a missing direction means ascending.
pub fn parse_order_by(order_by: &str) -> Vec<(String, SortDirection)> {
    order_by
        .split(',')
        .filter_map(|part| {
            let mut words = part.split_whitespace();
            let field = words.next()?.to_string();
            let direction = match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("desc") => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            Some((field, direction))
        })
        .collect()
}

fn compare_rows(a: &Row, b: &Row, order: &[(String, SortDirection)]) -> Ordering {
    for (field, direction) in order {
        let val_a = a.get(field).map(Scalar::from_json).unwrap_or_default();
        let val_b = b.get(field).map(Scalar::from_json).unwrap_or_default();
        let cmp = val_a.compare(&val_b);
        let cmp = match direction {
            SortDirection::Asc => cmp,
            SortDirection::Desc => cmp.reverse(),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// Aggregate `field` over `rows`. Nulls are skipped; numeric functions return
/// null when no numeric value exists.
fn aggregate(function: &str, field: &str, rows: &[&Row]) -> JsonValue {
    let values: Vec<Scalar> = rows
        .iter()
        .map(|row| row.get(field).map(Scalar::from_json).unwrap_or_default())
        .filter(|v| !v.is_null())
        .collect();
    let numbers: Vec<f64> = values.iter().filter_map(Scalar::as_f64).collect();

    let result = match function {
        "count" => return JsonValue::from(values.len() as u64),
        "sum" => Some(numbers.iter().sum()),
        "avg" | "average" => {
            if numbers.is_empty() {
                None
            } else {
                Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "min" => numbers.iter().copied().fold(None, |m: Option<f64>, n| Some(m.map_or(n, |m| m.min(n)))),
        "max" => numbers.iter().copied().fold(None, |m: Option<f64>, n| Some(m.map_or(n, |m| m.max(n)))),
        other => {
            log::debug!("unsupported aggregate function '{}'", other);
            None
        }
    };
    result.map(|v| Scalar::Float(v).to_json()).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn service() -> MemoryService {
        let service = MemoryService::new("name");
        service.insert_rows(
            "Task",
            vec![
                row(json!({"name": "T-1", "title": "Alpha launch", "status": "Open", "qty": 3, "modified": "2024-01-03"})),
                row(json!({"name": "T-2", "title": "Beta", "status": "Closed", "qty": 5, "modified": "2024-01-02"})),
                row(json!({"name": "T-3", "title": "alpha fix", "status": "Open", "qty": null, "modified": "2024-01-05",
                    "Task Item": [{"item_code": "X-1"}]})),
                row(json!({"name": "T-4", "title": "Gamma", "status": null, "qty": 9, "modified": "2024-01-01"})),
            ],
        );
        service
    }

    fn list_request(filters: Vec<FilterTuple>, order_by: &str) -> ListRequest {
        ListRequest {
            entity: "Task".to_string(),
            fields: vec!["name".to_string(), "title".to_string()],
            filters,
            start: 0,
            page_length: 10,
            order_by: order_by.to_string(),
            group_by: None,
            aggregate_function: None,
            aggregate_field: None,
        }
    }

    #[test]
    fn test_like() {
        assert!(like("Alpha launch", "%alpha%"));
        assert!(like("Alpha launch", "alpha%"));
        assert!(!like("Alpha launch", "%alpha"));
        assert!(like("Alpha launch", "%launch"));
        assert!(like("abc", "a%c"));
        assert!(!like("ab", "a%b%c"));
        assert!(like("anything", "%%"));
        assert!(like("exact", "exact"));
    }

    #[test]
    fn test_filter_operators() {
        let s = service();
        let count = |filters: Vec<FilterTuple>| s.count_matching("Task", &filters).unwrap();

        assert_eq!(count(vec![FilterTuple::new("title", Operator::Contains, FilterValue::Scalar("%alpha%".into()))]), 2);
        assert_eq!(count(vec![FilterTuple::new("qty", Operator::GreaterThan, FilterValue::Scalar(Scalar::Int(3)))]), 2);
        assert_eq!(
            count(vec![FilterTuple::new("qty", Operator::Between, FilterValue::Range(Scalar::Int(3), Scalar::Int(5)))]),
            2
        );
        assert_eq!(
            count(vec![FilterTuple::new("status", Operator::In, FilterValue::List(vec!["Open".into(), "Closed".into()]))]),
            3
        );
        assert_eq!(count(vec![FilterTuple::new("status", Operator::IsBlank, FilterValue::Scalar(Scalar::Null))]), 1);
        assert_eq!(count(vec![FilterTuple::new("qty", Operator::IsNotBlank, FilterValue::Scalar(Scalar::Null))]), 3);
        assert_eq!(count(vec![FilterTuple::equals("item_code", "X-1").with_entity("Task Item")]), 1);
    }

    #[test]
    fn test_flat_list_ordering_and_paging() {
        let s = service();
        let mut request = list_request(vec![], "modified desc");
        request.page_length = 2;
        let rows = s.list_matching(&request).unwrap().into_rows();
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["T-3", "T-1"]);
        assert_eq!(rows[0].len(), 2);

        request.start = 2;
        let rows = s.list_matching(&request).unwrap().into_rows();
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["T-2", "T-4"]);
    }

    #[test]
    fn test_ordering_mixed_type_column() {
        let s = MemoryService::new("name");
        let rows = (0..64)
            .map(|i| {
                let code = match i % 4 {
                    0 => json!((i * 31) % 50),
                    1 => json!(((i * 17) % 50).to_string()),
                    2 => json!(format!("x{}", (i * 11) % 50)),
                    _ => JsonValue::Null,
                };
                row(json!({"name": format!("R-{}", i), "code": code}))
            })
            .collect();
        s.insert_rows("Task", rows);

        let mut request = list_request(vec![], "code asc");
        request.fields = vec!["name".to_string(), "code".to_string()];
        request.page_length = 100;
        let rows = s.list_matching(&request).unwrap().into_rows();
        assert_eq!(rows.len(), 64);
        assert_eq!(rows[0]["code"], JsonValue::Null);
        // Numbers before strings
        let first_string = rows.iter().position(|r| r["code"].is_string()).unwrap();
        assert!(rows[first_string..].iter().all(|r| r["code"].is_string()));
        assert!(rows[..first_string].iter().all(|r| !r["code"].is_string()));
    }

    #[test]
    fn test_grouped_list_with_aggregate() {
        let s = service();
        let mut request = list_request(vec![], "modified desc");
        request.group_by = Some("status".to_string());
        request.aggregate_function = Some("sum".to_string());
        request.aggregate_field = Some("qty".to_string());

        let rows = s.list_matching(&request).unwrap().into_rows();
        assert_eq!(rows.len(), 3);
        // Null group sorts first
        assert_eq!(rows[0]["status"], JsonValue::Null);
        assert_eq!(rows[1]["status"], json!("Closed"));
        assert_eq!(rows[2]["status"], json!("Open"));
        assert_eq!(rows[2][GROUP_COUNT_COLUMN], json!(2));
        assert_eq!(rows[2][AGGREGATE_COLUMN], json!(3.0));
    }

    #[test]
    fn test_delete_and_unknown_entity() {
        let s = service();
        assert_eq!(s.delete("Task", &["T-1".to_string(), "T-2".to_string()]), 2);
        assert_eq!(s.len("Task"), 2);
        assert!(s.count_matching("Nope", &[]).is_err());
    }

    #[test]
    fn test_parse_order_by() {
        assert_eq!(
            parse_order_by("due_date desc, title"),
            vec![
                ("due_date".to_string(), SortDirection::Desc),
                ("title".to_string(), SortDirection::Asc),
            ]
        );
        assert!(parse_order_by(" ").is_empty());
    }
}
