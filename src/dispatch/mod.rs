//! Request dispatch module
//!
//! The front-door pipeline: CORS negotiation, exact-match path dispatch,
//! and the post-dispatch authorization gate. One inbound request produces
//! exactly one response; a preflight terminates before dispatch, every
//! other request is dispatched (or answered 404) and then gated.
//!
//! The gate deliberately runs after the selected handler, for every path
//! including 404s and session issuance: handler side effects precede an
//! authorization rejection. That ordering reproduces the observed behavior
//! of the system this one mirrors.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::{Method, Request, Response, StatusCode, Version};
use thiserror::Error;

use crate::config::AppState;
use crate::cors::{self, OriginPolicy};
use crate::handlers::{ApiHandler, SessionService};
use crate::http::{self, Exchange, RequestParts};
use crate::logger::{self, AccessLogEntry};

/// Route registration conflict: the table holds at most one handler per path
#[derive(Debug, Error)]
#[error("duplicate route registered for path '{0}'")]
pub struct DuplicateRoute(pub String);

/// Immutable exact-match route table, built once at startup
///
/// Paths are a fixed flat set; no wildcards, no parameters. Lookup is a
/// linear scan over a handful of entries.
pub struct RouteTable {
    routes: Vec<(String, Arc<dyn ApiHandler>)>,
}

impl RouteTable {
    pub fn new(entries: Vec<(&str, Arc<dyn ApiHandler>)>) -> Result<Self, DuplicateRoute> {
        let mut routes: Vec<(String, Arc<dyn ApiHandler>)> = Vec::with_capacity(entries.len());
        for (path, handler) in entries {
            if routes.iter().any(|(registered, _)| registered == path) {
                return Err(DuplicateRoute(path.to_string()));
            }
            routes.push((path.to_string(), handler));
        }
        Ok(Self { routes })
    }

    fn lookup(&self, path: &str) -> Option<&dyn ApiHandler> {
        self.routes
            .iter()
            .find(|(registered, _)| registered == path)
            .map(|(_, handler)| handler.as_ref())
    }
}

/// Path dispatch plus the authorization gate
pub struct Dispatcher {
    routes: RouteTable,
    sessions: Arc<dyn SessionService>,
    required_role: String,
}

impl Dispatcher {
    pub fn new(
        routes: RouteTable,
        sessions: Arc<dyn SessionService>,
        required_role: String,
    ) -> Self {
        Self {
            routes,
            sessions,
            required_role,
        }
    }

    /// Invoke the handler registered for the request path, or answer 404
    async fn dispatch(&self, req: &RequestParts, exchange: &mut Exchange) {
        match self.routes.lookup(req.path()) {
            Some(handler) => handler.handle(req, exchange).await,
            None => exchange.set_plain_error(StatusCode::NOT_FOUND, "Unsupported path"),
        }
    }

    /// Post-dispatch authorization gate
    ///
    /// Runs unconditionally for every dispatched request. A rejection
    /// overwrites whatever the handler (or the 404 fallthrough) wrote.
    async fn authorize(&self, req: &RequestParts, exchange: &mut Exchange) {
        let issued = exchange.issued_session().map(ToString::to_string);
        match self
            .sessions
            .verify(req, issued.as_deref(), &self.required_role)
            .await
        {
            Ok(_) => {}
            Err(rejection) => rejection.apply(exchange),
        }
    }
}

/// Run one request through the full pipeline
///
/// Negotiator first (may terminate via preflight), then dispatch, then the
/// gate. The returned exchange is the terminal response.
pub async fn process(
    req: &RequestParts,
    policy: &OriginPolicy,
    dispatcher: &Dispatcher,
) -> Exchange {
    let mut exchange = Exchange::new();
    cors::apply_baseline(req, policy, &mut exchange);

    if *req.method() == Method::OPTIONS {
        cors::apply_preflight(req, &mut exchange);
        return exchange;
    }

    dispatcher.dispatch(req, &mut exchange).await;
    dispatcher.authorize(req, &mut exchange).await;
    exchange
}

/// Main entry point for HTTP request handling
///
/// Bridges one hyper request into the pipeline: admission checks, body
/// collection, processing, access logging.
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (head, body) = req.into_parts();
    logger::log_request(&head.method, head.uri.path());

    if let Some(response) = check_body_size(&head.headers, state.config.http.max_body_size) {
        return Ok(response);
    }

    // A preflight never carries a meaningful body
    let bytes = if head.method == Method::OPTIONS {
        Bytes::new()
    } else {
        match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                logger::log_error(&format!("Failed to read request body: {e}"));
                return Ok(http::build_bad_request_response("failed to read request body"));
            }
        }
    };

    let parts = RequestParts::new(
        head.method,
        head.uri.path().to_string(),
        head.uri.query().map(ToString::to_string),
        head.headers,
        bytes,
    );
    let mut exchange = process(&parts, &state.cors, &state.dispatcher).await;
    exchange.set_header("server", &state.config.http.server_name);

    if state.config.logging.access_log {
        let entry = access_entry(&parts, &exchange, peer_addr, head.version, &started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(exchange.into_response())
}

/// Validate Content-Length before collecting the body, 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = headers.get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_payload_too_large_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

fn access_entry(
    req: &RequestParts,
    exchange: &Exchange,
    peer_addr: SocketAddr,
    version: Version,
    started: &Instant,
) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.path().to_string(),
    );
    entry.http_version = match version {
        Version::HTTP_10 => "1.0".to_string(),
        Version::HTTP_2 => "2".to_string(),
        _ => "1.1".to_string(),
    };
    entry.status = exchange.status().as_u16();
    entry.body_bytes = exchange.body().len();
    entry.referer = non_empty(req.header("referer"));
    entry.user_agent = non_empty(req.header("user-agent"));
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::AuthRejection;
    use crate::store::Session;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use hyper::header::{HeaderName, HeaderValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubHandler {
        calls: AtomicUsize,
    }

    impl StubHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ApiHandler for StubHandler {
        async fn handle(&self, _req: &RequestParts, exchange: &mut Exchange) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            exchange.set_json(StatusCode::OK, &serde_json::json!({ "handled": true }));
        }
    }

    struct AllowAll;

    #[async_trait]
    impl SessionService for AllowAll {
        async fn verify(
            &self,
            _req: &RequestParts,
            _issued: Option<&str>,
            required_role: &str,
        ) -> Result<Session, AuthRejection> {
            Ok(Session {
                token: "stub".to_string(),
                username: "joy".to_string(),
                role: required_role.to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    struct DenyAll;

    #[async_trait]
    impl SessionService for DenyAll {
        async fn verify(
            &self,
            _req: &RequestParts,
            _issued: Option<&str>,
            _required_role: &str,
        ) -> Result<Session, AuthRejection> {
            Err(AuthRejection {
                status: StatusCode::UNAUTHORIZED,
                message: "missing session credential".to_string(),
            })
        }
    }

    fn make_request(method: Method, path: &str, headers: &[(&'static str, &str)]) -> RequestParts {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        RequestParts::new(method, path.to_string(), None, map, Bytes::new())
    }

    fn dispatcher_with(
        handler: Arc<StubHandler>,
        sessions: Arc<dyn SessionService>,
    ) -> Dispatcher {
        let routes = RouteTable::new(vec![
            ("/api/v1/session", Arc::clone(&handler) as Arc<dyn ApiHandler>),
            ("/api/v1/patients", handler as Arc<dyn ApiHandler>),
        ])
        .unwrap();
        Dispatcher::new(routes, sessions, "nurse".to_string())
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(Arc::clone(&handler), Arc::new(AllowAll));
        let req = make_request(Method::GET, "/api/v1/unknown", &[]);

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        assert_eq!(exchange.status(), StatusCode::NOT_FOUND);
        assert_eq!(exchange.body().as_ref(), b"Unsupported path");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

        // method does not matter for an unregistered path
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let req = make_request(method, "/api/v1/unknown", &[]);
            let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
            assert_eq!(exchange.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_registered_path_invokes_handler_once() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(Arc::clone(&handler), Arc::new(AllowAll));
        let req = make_request(Method::GET, "/api/v1/patients", &[("origin", "http://x")]);

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.status(), StatusCode::OK);
        // baseline headers survive dispatch
        assert_eq!(exchange.header("access-control-allow-origin"), Some("http://x"));
        assert_eq!(exchange.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(exchange.header("cache-control"), Some("no-cache"));
    }

    #[tokio::test]
    async fn test_preflight_short_circuits_dispatch() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(Arc::clone(&handler), Arc::new(DenyAll));
        let req = make_request(
            Method::OPTIONS,
            "/api/v1/patients",
            &[
                ("origin", "http://x"),
                ("access-control-request-method", "GET"),
            ],
        );

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        // no dispatch, no gate: DenyAll never ran
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(exchange.status(), StatusCode::OK);
        assert!(exchange.body().is_empty());
        assert_eq!(exchange.header("access-control-allow-origin"), Some("http://x"));
        assert_eq!(exchange.header("access-control-allow-methods"), Some("GET"));
    }

    #[tokio::test]
    async fn test_gate_runs_after_handler() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(Arc::clone(&handler), Arc::new(DenyAll));
        let req = make_request(Method::GET, "/api/v1/patients", &[]);

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        // handler side effects happened, then the rejection overwrote them
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.status(), StatusCode::UNAUTHORIZED);
        assert!(exchange.header("www-authenticate").is_some());
    }

    #[tokio::test]
    async fn test_gate_overrides_404() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(handler, Arc::new(DenyAll));
        let req = make_request(Method::GET, "/api/v1/unknown", &[]);

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        assert_eq!(exchange.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_gate_applies_to_session_path_too() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(Arc::clone(&handler), Arc::new(DenyAll));
        let req = make_request(Method::GET, "/api/v1/session", &[]);

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_gate_pass_keeps_handler_response() {
        let handler = StubHandler::new();
        let dispatcher = dispatcher_with(handler, Arc::new(AllowAll));
        let req = make_request(Method::POST, "/api/v1/patients", &[]);

        let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
        assert_eq!(exchange.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(exchange.body()).unwrap();
        assert_eq!(body["handled"], true);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let handler = StubHandler::new();
        let result = RouteTable::new(vec![
            ("/api/v1/session", Arc::clone(&handler) as Arc<dyn ApiHandler>),
            ("/api/v1/session", handler as Arc<dyn ApiHandler>),
        ]);
        assert!(result.is_err());
    }

    mod end_to_end {
        use super::*;
        use crate::handlers::{PatientListHandler, SessionManager};
        use crate::store::{Datastore, MemoryStore};

        async fn real_dispatcher() -> Dispatcher {
            let store: Arc<dyn Datastore> = Arc::new(MemoryStore::new());
            store.init().await.unwrap();
            let sessions = Arc::new(SessionManager::new(Arc::clone(&store), 3600));
            let routes = RouteTable::new(vec![
                (
                    "/api/v1/session",
                    Arc::clone(&sessions) as Arc<dyn ApiHandler>,
                ),
                (
                    "/api/v1/patients",
                    Arc::new(PatientListHandler::new(store)) as Arc<dyn ApiHandler>,
                ),
            ])
            .unwrap();
            Dispatcher::new(routes, sessions, "nurse".to_string())
        }

        #[tokio::test]
        async fn test_patient_list_without_credential_is_unauthorized() {
            let dispatcher = real_dispatcher().await;
            let req = make_request(Method::GET, "/api/v1/patients", &[]);

            let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
            assert_eq!(exchange.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(exchange.header("access-control-allow-credentials"), Some("true"));
        }

        #[tokio::test]
        async fn test_login_passes_the_gate_via_issued_session() {
            let dispatcher = real_dispatcher().await;
            let mut map = HeaderMap::new();
            map.insert(
                HeaderName::from_static("content-type"),
                HeaderValue::from_static("application/json"),
            );
            let req = RequestParts::new(
                Method::POST,
                "/api/v1/session".to_string(),
                None,
                map,
                Bytes::from_static(br#"{"username":"joy","password":"joy123"}"#),
            );

            let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
            assert_eq!(exchange.status(), StatusCode::OK);
            assert!(exchange.header("set-cookie").is_some());
        }

        #[tokio::test]
        async fn test_cookie_credential_reaches_patient_list() {
            let dispatcher = real_dispatcher().await;
            let login = RequestParts::new(
                Method::POST,
                "/api/v1/session".to_string(),
                None,
                HeaderMap::new(),
                Bytes::from_static(br#"{"username":"joy","password":"joy123"}"#),
            );
            let issued = process(&login, &OriginPolicy::default(), &dispatcher).await;
            let token = issued.issued_session().unwrap().to_string();

            let cookie = format!("sid={token}");
            let req = make_request(Method::GET, "/api/v1/patients", &[("cookie", &cookie)]);
            let exchange = process(&req, &OriginPolicy::default(), &dispatcher).await;
            assert_eq!(exchange.status(), StatusCode::OK);
            let patients: serde_json::Value = serde_json::from_slice(exchange.body()).unwrap();
            assert_eq!(patients.as_array().unwrap().len(), 3);
        }
    }
}
