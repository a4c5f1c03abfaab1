/// WebSocket message types for client-server communication
use serde::{Deserialize, Serialize};

use crate::column::{ColumnDef, ColumnState};
use crate::filter::{FilterModel, FilterTuple};
use crate::service::Row;
use crate::source::RowRequest;

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Pull one page of rows
    GetRows {
        table_id: String,
        /// Entity to query; defaults to the table id
        #[serde(default)]
        entity: Option<String>,
        request: RowRequest,
    },

    /// Persist column state and filters
    SaveState {
        table_id: String,
        column_state: Vec<ColumnState>,
        #[serde(default)]
        filter_model: FilterModel,
    },

    /// Restore state for the table's current columns
    LoadState {
        table_id: String,
        columns: Vec<ColumnDef>,
        #[serde(default)]
        default_filters: Option<Vec<FilterTuple>>,
    },

    /// Forget all stored state for a table
    ClearState { table_id: String },

    /// Replace the child-entity filters applied to every request
    SetChildFilters {
        table_id: String,
        filters: Vec<FilterTuple>,
    },

    /// Flip one row's selection
    ToggleRow { table_id: String, id: String },

    SelectAll { table_id: String },

    DeselectAll { table_id: String },
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A page of rows in response to GetRows
    Rows {
        table_id: String,
        seq: u64,
        start_row: usize,
        row_data: Vec<Row>,
        row_count: Option<u64>,
    },

    /// A GetRows request did not produce rows
    RowsFailed {
        table_id: String,
        seq: u64,
        message: String,
        /// A newer request for the same table replaced this one
        superseded: bool,
    },

    /// Restored state in response to LoadState
    State {
        table_id: String,
        column_state: Vec<ColumnState>,
        filter_model: FilterModel,
    },

    /// Effective selection after a selection change
    Selection { table_id: String, rows: Vec<Row> },

    /// Error occurred
    Error { message: String },
}
