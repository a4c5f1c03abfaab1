/// LiveGrid WebSocket Server
///
/// Standalone server that answers grid page requests and stores table state
/// for frontend clients.

use livegrid::config::GridConfig;
use livegrid::server::run_server;
use livegrid::storage::JsonFileStore;
use livegrid::websocket::{AppState, SharedStore};
use std::io::{Error, ErrorKind};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("PORT must be a number: {}", e)))?;

    let config = match std::env::var("LIVEGRID_CONFIG") {
        Ok(path) => GridConfig::from_file(&path)
            .map_err(|e| Error::new(ErrorKind::InvalidInput, format!("{}: {}", path, e)))?,
        Err(_) => GridConfig::default(),
    };

    let mut state = AppState::with_demo_data(config);
    if let Ok(dir) = std::env::var("LIVEGRID_STATE_DIR") {
        log::info!("storing table layouts under {}", dir);
        let layouts: SharedStore = Arc::new(JsonFileStore::new(dir));
        state.layouts = layouts;
    }

    run_server(&host, port, state).await
}
