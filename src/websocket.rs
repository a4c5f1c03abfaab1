/// WebSocket connection actor serving grid page requests and table state
use actix::prelude::*;
use actix_web_actors::ws;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::GridConfig;
use crate::error::GridError;
use crate::memory::MemoryService;
use crate::messages::{ClientMessage, ServerMessage};
use crate::selection::{SelectionState, SelectionTracker};
use crate::service::Row;
use crate::source::{LoadSuccess, RowsCallback, ServerSideSource};
use crate::state::TableStateStore;
use crate::storage::{KeyValueStore, MemoryStore};

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Durable store shared by every connection
pub type SharedStore = Arc<dyn KeyValueStore + Send + Sync>;

type Source = ServerSideSource<Arc<MemoryService>>;

/// Shared state for all WebSocket connections
pub struct AppState {
    pub service: Arc<MemoryService>,
    pub config: GridConfig,
    pub layouts: SharedStore,
}

impl AppState {
    pub fn new(service: Arc<MemoryService>, config: GridConfig, layouts: SharedStore) -> Self {
        Self {
            service,
            config,
            layouts,
        }
    }

    /// State backed by an in-memory store and a small demo `Task` entity
    pub fn with_demo_data(config: GridConfig) -> Self {
        let service = MemoryService::new(config.primary_key.clone());
        let statuses = ["Open", "Working", "Closed"];
        let owners = ["alice", "bob", "carol", "dave"];
        let rows = (1..=250)
            .filter_map(|i| {
                json!({
                    "name": format!("TASK-{:04}", i),
                    "title": format!("Task number {}", i),
                    "status": statuses[i % statuses.len()],
                    "owner": owners[i % owners.len()],
                    "qty": (i * 7) % 40,
                    "due_date": format!("2024-{:02}-{:02}", i % 12 + 1, i % 28 + 1),
                    "modified": format!("2024-01-01 00:{:02}:{:02}", (i / 60) % 60, i % 60),
                })
                .as_object()
                .cloned()
            })
            .collect::<Vec<Row>>();
        service.insert_rows("Task", rows);

        let layouts: SharedStore = Arc::new(MemoryStore::new());
        Self::new(Arc::new(service), config, layouts)
    }
}

/// Collects the outcome of one page request as the reply to send
struct PageReply {
    table_id: String,
    seq: u64,
    start_row: usize,
    message: Option<ServerMessage>,
    rows: Vec<Row>,
}

impl RowsCallback for PageReply {
    fn success(&mut self, result: LoadSuccess) {
        self.rows = result.row_data.clone();
        self.message = Some(ServerMessage::Rows {
            table_id: self.table_id.clone(),
            seq: self.seq,
            start_row: self.start_row,
            row_data: result.row_data,
            row_count: result.row_count,
        });
    }

    fn fail(&mut self, error: &GridError) {
        self.message = Some(ServerMessage::RowsFailed {
            table_id: self.table_id.clone(),
            seq: self.seq,
            message: "could not load data".to_string(),
            superseded: false,
        });
        log::warn!("page {} for '{}' failed: {}", self.seq, self.table_id, error);
    }

    fn superseded(&mut self, error: &GridError) {
        self.message = Some(ServerMessage::RowsFailed {
            table_id: self.table_id.clone(),
            seq: self.seq,
            message: error.to_string(),
            superseded: true,
        });
    }
}

/// Rows materialized on the client, keyed by block start row. A block that
/// is fetched again replaces the earlier copy; a fetch from row 0 starts a
/// new result set.
#[derive(Debug, Default)]
struct LoadedBlocks {
    blocks: BTreeMap<usize, Vec<Row>>,
}

impl LoadedBlocks {
    fn store(&mut self, start_row: usize, rows: Vec<Row>) {
        if start_row == 0 {
            self.blocks.clear();
        }
        self.blocks.insert(start_row, rows);
    }

    fn rows(&self) -> Vec<Row> {
        self.blocks.values().flatten().cloned().collect()
    }
}

/// WebSocket connection actor. Session-scoped state (query state, selection)
/// lives with the connection; layouts go to the shared durable store.
pub struct GridWebSocket {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
    session: Arc<MemoryStore>,
    sources: HashMap<String, Arc<Source>>,
    selections: HashMap<String, SelectionTracker<Arc<MemoryStore>>>,
    loaded_rows: HashMap<String, LoadedBlocks>,
}

impl GridWebSocket {
    pub fn new(state: actix_web::web::Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
            session: Arc::new(MemoryStore::new()),
            sources: HashMap::new(),
            selections: HashMap::new(),
            loaded_rows: HashMap::new(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::info!("websocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => ctx.text(text),
            Err(e) => log::error!("could not encode reply: {}", e),
        }
    }

    fn send_error(ctx: &mut ws::WebsocketContext<Self>, message: impl Into<String>) {
        Self::send(
            ctx,
            &ServerMessage::Error {
                message: message.into(),
            },
        );
    }

    fn table_state(&self) -> TableStateStore<SharedStore, Arc<MemoryStore>> {
        TableStateStore::with_config(self.state.layouts.clone(), self.session.clone(), self.state.config.clone())
    }

    fn source_for(&mut self, table_id: &str, entity: Option<String>) -> Arc<Source> {
        let state = &self.state;
        let session = &self.session;
        self.sources
            .entry(table_id.to_string())
            .or_insert_with(|| {
                let entity = entity.unwrap_or_else(|| table_id.to_string());
                let source = ServerSideSource::with_config(entity, state.service.clone(), state.config.clone());
                let store = TableStateStore::new(state.layouts.clone(), session.clone());
                source.set_child_filters(store.load_child_table_filters(table_id));
                Arc::new(source)
            })
            .clone()
    }

    fn selection_for(&mut self, table_id: &str) -> &mut SelectionTracker<Arc<MemoryStore>> {
        let primary_key = self.state.config.primary_key.clone();
        let session = self.session.clone();
        self.selections.entry(table_id.to_string()).or_insert_with(|| {
            let mut tracker = SelectionTracker::new(table_id, primary_key, session);
            tracker.attach(SelectionState::new());
            tracker
        })
    }

    fn sync_selection(&mut self, table_id: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let rows = self.loaded_rows.get(table_id).map(LoadedBlocks::rows).unwrap_or_default();
        let result = self.selection_for(table_id).sync(&rows);
        match result {
            Ok(rows) => Self::send(
                ctx,
                &ServerMessage::Selection {
                    table_id: table_id.to_string(),
                    rows,
                },
            ),
            Err(e) => Self::send_error(ctx, format!("could not store selection: {}", e)),
        }
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            ClientMessage::GetRows {
                table_id,
                entity,
                request,
            } => {
                let source = self.source_for(&table_id, entity);
                let seq = source.begin_request();
                let mut reply = PageReply {
                    table_id,
                    seq,
                    start_row: request.start_row,
                    message: None,
                    rows: Vec::new(),
                };

                let fetch = async move {
                    source.get_rows_sequenced(seq, &request, &mut reply).await;
                    reply
                };
                ctx.spawn(fetch.into_actor(self).map(|reply, act, ctx| {
                    if let Some(ServerMessage::Rows { .. }) = &reply.message {
                        act.loaded_rows
                            .entry(reply.table_id.clone())
                            .or_default()
                            .store(reply.start_row, reply.rows);
                    }
                    if let Some(message) = &reply.message {
                        Self::send(ctx, message);
                    }
                }));
            }

            ClientMessage::SaveState {
                table_id,
                column_state,
                filter_model,
            } => {
                if let Err(e) = self.table_state().save(&table_id, &column_state, &filter_model) {
                    Self::send_error(ctx, format!("could not save state: {}", e));
                }
            }

            ClientMessage::LoadState {
                table_id,
                columns,
                default_filters,
            } => match self.table_state().load(&table_id, &columns, default_filters.as_deref()) {
                Ok(loaded) => Self::send(
                    ctx,
                    &ServerMessage::State {
                        table_id,
                        column_state: loaded.column_state,
                        filter_model: loaded.filter_model,
                    },
                ),
                Err(e) => Self::send_error(ctx, format!("could not load state: {}", e)),
            },

            ClientMessage::ClearState { table_id } => {
                if let Err(e) = self.table_state().clear(&table_id) {
                    Self::send_error(ctx, format!("could not clear state: {}", e));
                }
                self.selections.remove(&table_id);
                self.loaded_rows.remove(&table_id);
                if let Some(source) = self.sources.get(&table_id) {
                    source.set_child_filters(Vec::new());
                }
            }

            ClientMessage::SetChildFilters { table_id, filters } => {
                if let Err(e) = self.table_state().save_child_table_filters(&table_id, &filters) {
                    Self::send_error(ctx, format!("could not save child filters: {}", e));
                    return;
                }
                self.source_for(&table_id, None).set_child_filters(filters);
            }

            ClientMessage::ToggleRow { table_id, id } => {
                self.selection_for(&table_id).toggle(id);
                self.sync_selection(&table_id, ctx);
            }

            ClientMessage::SelectAll { table_id } => {
                self.selection_for(&table_id).select_all();
                self.sync_selection(&table_id, ctx);
            }

            ClientMessage::DeselectAll { table_id } => {
                self.selection_for(&table_id).deselect_all();
                self.sync_selection(&table_id, ctx);
            }
        }
    }
}

impl Actor for GridWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for GridWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                Err(e) => Self::send_error(ctx, format!("Invalid message format: {}", e)),
            },
            Ok(ws::Message::Binary(_)) => {
                log::debug!("ignoring binary websocket message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}
