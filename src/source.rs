/// Server-Side Row Source
///
/// Adapts the widget's pull interface to the remote data service. Each page
/// request goes Idle -> Requesting -> Populated, or -> Failed when the service
/// rejects a call. A failure is always reported back through the callback so
/// the widget never waits on a request that will not complete.
///
/// Requests carry a sequence number. When a newer request has been issued by
/// the time a response arrives, that response is discarded (unless
/// `discard_stale_responses` is off) and the callback is told it was
/// superseded.
///
/// # Example
///
/// ```
/// use livegrid::memory::MemoryService;
/// use livegrid::source::{RowRequest, ServerSideSource};
/// use serde_json::json;
///
/// let service = MemoryService::new("name");
/// service.insert_rows("Task", vec![
///     json!({"name": "T-1", "title": "Alpha", "modified": "2024-01-01"}).as_object().unwrap().clone(),
/// ]);
/// let source = ServerSideSource::new("Task", service);
///
/// let request = RowRequest::page(0, 50).with_columns(&["name", "title"]);
/// let loaded = block_on(source.fetch_rows(&request)).unwrap();
/// assert_eq!(loaded.row_count, Some(1));
/// # fn block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```

use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::filter::{merge_tuple, FilterModel, FilterTuple};
use crate::query::{trim_value_columns, ColumnVo, QueryBuilder, QueryRequest, SortModelItem};
use crate::service::{DataService, ListRequest, Row, AGGREGATE_COLUMN};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One page request from the widget
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowRequest {
    pub start_row: usize,
    pub end_row: Option<usize>,
    pub row_group_cols: Vec<ColumnVo>,
    pub value_cols: Vec<ColumnVo>,
    pub group_keys: Vec<String>,
    pub filter_model: FilterModel,
    pub sort_model: Vec<SortModelItem>,
    /// Displayed column ids, in display order
    pub columns: Vec<String>,
}

impl RowRequest {
    pub fn page(start_row: usize, end_row: usize) -> Self {
        RowRequest {
            start_row,
            end_row: Some(end_row),
            ..Default::default()
        }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_filter_model(mut self, filter_model: FilterModel) -> Self {
        self.filter_model = filter_model;
        self
    }

    pub fn with_sort(mut self, sort_model: Vec<SortModelItem>) -> Self {
        self.sort_model = sort_model;
        self
    }

    pub fn with_grouping(mut self, row_group_cols: Vec<ColumnVo>, group_keys: Vec<String>) -> Self {
        self.row_group_cols = row_group_cols;
        self.group_keys = group_keys;
        self
    }

    pub fn with_value_cols(mut self, value_cols: Vec<ColumnVo>) -> Self {
        self.value_cols = value_cols;
        self
    }

    fn page_size(&self, default: usize) -> usize {
        match self.end_row {
            Some(end) if end > self.start_row => end - self.start_row,
            _ => default,
        }
    }
}

/// Successful page load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSuccess {
    pub row_data: Vec<Row>,
    /// Total matching rows; unknown for group levels
    pub row_count: Option<u64>,
}

/// The widget side of a page request.
pub trait RowsCallback {
    fn success(&mut self, result: LoadSuccess);

    fn fail(&mut self, error: &GridError);

    /// A newer request replaced this one before it resolved
    fn superseded(&mut self, error: &GridError) {
        self.fail(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Requesting,
    Populated,
    Failed,
}

/// Pull-based row source over a [`DataService`].
pub struct ServerSideSource<S: DataService> {
    entity: String,
    service: S,
    config: GridConfig,
    sequence: AtomicU64,
    state: Mutex<SourceState>,
    child_filters: Mutex<Vec<FilterTuple>>,
}

impl<S: DataService> ServerSideSource<S> {
    pub fn new(entity: impl Into<String>, service: S) -> Self {
        Self::with_config(entity, service, GridConfig::default())
    }

    pub fn with_config(entity: impl Into<String>, service: S, config: GridConfig) -> Self {
        ServerSideSource {
            entity: entity.into(),
            service,
            config,
            sequence: AtomicU64::new(0),
            state: Mutex::new(SourceState::Idle),
            child_filters: Mutex::new(Vec::new()),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn state(&self) -> SourceState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SourceState) {
        *self.lock_state() = state;
    }

    /// Filters on child entities merged into every request
    pub fn set_child_filters(&self, filters: Vec<FilterTuple>) {
        *self.child_filters.lock().unwrap_or_else(|e| e.into_inner()) = filters;
    }

    pub fn child_filters(&self) -> Vec<FilterTuple> {
        self.child_filters.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Issue the next sequence number
    pub fn begin_request(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sequence number of the most recently issued request
    pub fn latest_request(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Displayed columns minus the selection and auto-group pseudo-columns
    pub fn visible_columns(&self, request: &RowRequest) -> Vec<String> {
        request
            .columns
            .iter()
            .filter(|c| **c != self.config.selection_column && **c != self.config.auto_group_column)
            .cloned()
            .collect()
    }

    /// Build the query for a page request without fetching it.
    pub fn build_request(&self, request: &RowRequest) -> QueryRequest {
        let mut value_cols = request.value_cols.clone();
        let dropped = trim_value_columns(&mut value_cols);
        if !dropped.is_empty() {
            let ids: Vec<&str> = dropped.iter().map(|c| c.id.as_str()).collect();
            log::debug!("only one aggregate per query; dropping {:?}", ids);
        }

        let mut plan = QueryBuilder::new(&self.config).build(
            &request.filter_model,
            &request.row_group_cols,
            &request.group_keys,
            &request.sort_model,
            &value_cols,
        );
        for tuple in self.child_filters() {
            merge_tuple(&mut plan.filters, tuple);
        }

        plan.into_request(
            request.start_row,
            request.page_size(self.config.page_size),
            self.visible_columns(request),
        )
    }

    fn list_request(&self, query: &QueryRequest) -> ListRequest {
        let mut fields = query.visible_columns.clone();
        for required in [&self.config.primary_key, &self.config.modified_field] {
            if !fields.contains(required) {
                fields.push(required.clone());
            }
        }

        ListRequest {
            entity: self.entity.clone(),
            fields,
            filters: query.filters.clone(),
            start: query.start_row,
            page_length: query.page_size,
            order_by: query.order_by.clone(),
            group_by: query.group_by.clone(),
            aggregate_function: query.aggregate.agg_func.clone(),
            aggregate_field: query.aggregate.field.clone(),
        }
    }

    /// Fetch one page as a fresh request.
    pub async fn fetch_rows(&self, request: &RowRequest) -> Result<LoadSuccess> {
        let seq = self.begin_request();
        self.fetch_sequenced(seq, request).await
    }

    /// Fetch one page under a sequence number from [`begin_request`].
    ///
    /// [`begin_request`]: ServerSideSource::begin_request
    pub async fn fetch_sequenced(&self, seq: u64, request: &RowRequest) -> Result<LoadSuccess> {
        if seq == self.latest_request() {
            self.set_state(SourceState::Requesting);
        }
        let query = self.build_request(request);
        let list = self.list_request(&query);
        log::debug!(
            "request {} for '{}': start {} size {} group_by {:?}",
            seq,
            self.entity,
            list.start,
            list.page_length,
            list.group_by
        );

        match self.fetch(&query, &list).await {
            Ok(loaded) => {
                self.check_current(seq)?;
                self.set_state(SourceState::Populated);
                Ok(loaded)
            }
            Err(err) => {
                self.check_current(seq)?;
                log::warn!("could not load rows for '{}': {}", self.entity, err);
                self.set_state(SourceState::Failed);
                Err(err)
            }
        }
    }

    async fn fetch(&self, query: &QueryRequest, list: &ListRequest) -> Result<LoadSuccess> {
        // Group levels carry their counts inline
        let row_count = match &query.group_by {
            Some(_) => None,
            None => Some(self.service.count(&self.entity, &query.filters).await?),
        };
        let mut row_data = self.service.list(list).await?.into_rows();

        if let (Some(group_by), Some(field_name)) = (&query.group_by, &query.aggregate.field_name) {
            if field_name != group_by {
                for row in row_data.iter_mut() {
                    if let Some(value) = row.get(AGGREGATE_COLUMN).cloned() {
                        row.insert(field_name.clone(), value);
                    }
                }
            }
        }

        Ok(LoadSuccess { row_data, row_count })
    }

    fn check_current(&self, seq: u64) -> Result<()> {
        let latest = self.latest_request();
        if self.config.discard_stale_responses && seq != latest {
            log::debug!("discarding response {} for '{}'; latest is {}", seq, self.entity, latest);
            return Err(GridError::Superseded { seq, latest });
        }
        Ok(())
    }

    /// The widget pull entry point: fetch a page and report the outcome to
    /// `callback`. Never returns an error; every outcome reaches the callback.
    pub async fn get_rows<C: RowsCallback + ?Sized>(&self, request: &RowRequest, callback: &mut C) {
        let seq = self.begin_request();
        self.get_rows_sequenced(seq, request, callback).await
    }

    /// [`get_rows`](ServerSideSource::get_rows) under a sequence number issued
    /// when the request was received
    pub async fn get_rows_sequenced<C: RowsCallback + ?Sized>(&self, seq: u64, request: &RowRequest, callback: &mut C) {
        match self.fetch_sequenced(seq, request).await {
            Ok(loaded) => callback.success(loaded),
            Err(err) if err.is_superseded() => callback.superseded(&err),
            Err(err) => callback.fail(&err),
        }
    }
}
