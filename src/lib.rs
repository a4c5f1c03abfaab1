/// LiveGrid - Server-Side Grid Query Adapter
///
/// Connects a pull-based data grid to a remote document service. The widget's
/// filter, sort, grouping and aggregation state is translated into the
/// service's query form one page at a time, and the table's layout, query
/// state and selection are persisted per table so they survive reloads.

pub mod value;
pub mod error;
pub mod config;
pub mod column;
pub mod filter;
pub mod query;
pub mod service;
pub mod memory;
pub mod source;
pub mod storage;
pub mod state;
pub mod selection;

pub use error::{GridError, Result};
pub use config::GridConfig;
pub use value::Scalar;
pub use column::{ColumnDef, ColumnState, SortDirection};
pub use filter::{FilterKind, FilterModel, FilterModelEntry, FilterTuple, FilterValue, Operator};
pub use query::{Aggregate, ColumnVo, QueryBuilder, QueryPlan, QueryRequest, SortModelItem};
pub use service::{DataService, ListRequest, ListResponse, Row};
pub use memory::MemoryService;
pub use source::{LoadSuccess, RowRequest, RowsCallback, ServerSideSource, SourceState};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageKey};
pub use state::{LoadedState, TableLayout, TableQueryState, TableStateStore};
pub use selection::{SelectionState, SelectionTracker};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod messages;
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;
