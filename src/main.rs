use std::sync::Arc;

mod config;
mod cors;
mod dispatch;
mod error;
mod handlers;
mod http;
mod logger;
mod server;
mod store;

use dispatch::{Dispatcher, RouteTable};
use error::StartupError;
use handlers::{
    ApiHandler, PatientDetailHandler, PatientListHandler, PatientNoteHandler, SessionManager,
};
use store::{Datastore, MemoryStore};

fn main() -> Result<(), StartupError> {
    let cfg = config::Config::load_from("config")?;

    // Build the Tokio runtime with the configured worker count
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build().map_err(StartupError::Runtime)?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), StartupError> {
    logger::init(&cfg).map_err(StartupError::Logger)?;
    let addr = cfg.get_socket_addr().map_err(StartupError::ListenAddr)?;

    // Datastore lifecycle is owned here: init before accepting, close after
    let db: Arc<dyn Datastore> = Arc::new(MemoryStore::new());
    db.init().await?;

    let sessions = Arc::new(SessionManager::new(Arc::clone(&db), cfg.auth.session_ttl_secs));
    let routes = RouteTable::new(vec![
        (
            "/api/v1/session",
            Arc::clone(&sessions) as Arc<dyn ApiHandler>,
        ),
        (
            "/api/v1/patients",
            Arc::new(PatientListHandler::new(Arc::clone(&db))) as Arc<dyn ApiHandler>,
        ),
        (
            "/api/v1/patient",
            Arc::new(PatientDetailHandler::new(Arc::clone(&db))) as Arc<dyn ApiHandler>,
        ),
        (
            "/api/v1/patient/note",
            Arc::new(PatientNoteHandler::new(Arc::clone(&db))) as Arc<dyn ApiHandler>,
        ),
    ])?;
    let dispatcher = Dispatcher::new(routes, sessions, cfg.auth.required_role.clone());

    let listener = server::create_reusable_listener(addr).map_err(StartupError::Listen)?;
    let state = Arc::new(config::AppState::new(cfg, dispatcher));

    logger::log_server_start(&addr, &state.config);

    let signals = Arc::new(server::SignalHandler::new());
    server::start_signal_handler(Arc::clone(&signals));

    server::run(listener, state, Arc::clone(&signals.shutdown)).await;

    // Accept loop stopped; release the datastore before exit
    db.close().await;
    logger::log_shutdown_complete();
    Ok(())
}
