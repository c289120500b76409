// Connection handling module
// Accepts and serves a single TCP connection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;

use crate::config::AppState;
use crate::dispatch;
use crate::logger;

/// Accept and process a connection, checking limits and logging.
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
) {
    // Increment counter first, then check limit (prevents race condition)
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            // Exceeded limit: rollback counter and reject
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    if state.config.logging.access_log {
        logger::log_connection_accepted(&peer_addr);
    }

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(state),
        Arc::clone(conn_counter),
    );
}

/// Serve a single connection on its own task.
///
/// Wraps the stream in `TokioIo`, serves HTTP/1.1 with keep-alive, applies
/// the connection timeout, and decrements the active-connection counter
/// when done. With `http.compress` enabled the whole pipeline service is
/// wrapped in transparent gzip compression.
fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let keep_alive_timeout = state.config.performance.keep_alive_timeout;
        let timeout_duration = std::time::Duration::from_secs(std::cmp::max(
            state.config.performance.read_timeout,
            state.config.performance.write_timeout,
        ));

        let mut builder = http1::Builder::new();
        if keep_alive_timeout > 0 {
            builder.keep_alive(true);
        }

        let compress = state.config.http.compress;
        let svc_state = Arc::clone(&state);

        let served = if compress {
            let svc = ServiceBuilder::new()
                .layer(CompressionLayer::new())
                .service(tower::service_fn(move |req: Request<Incoming>| {
                    let state = Arc::clone(&svc_state);
                    async move { dispatch::handle_request(req, state, peer_addr).await }
                }));
            tokio::time::timeout(
                timeout_duration,
                builder.serve_connection(io, TowerToHyperService::new(svc)),
            )
            .await
        } else {
            tokio::time::timeout(
                timeout_duration,
                builder.serve_connection(
                    io,
                    service_fn(move |req| {
                        let state = Arc::clone(&svc_state);
                        async move { dispatch::handle_request(req, state, peer_addr).await }
                    }),
                ),
            )
            .await
        };

        match served {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => {
                logger::log_warning(&format!(
                    "Connection timeout after {} seconds",
                    timeout_duration.as_secs()
                ));
            }
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
