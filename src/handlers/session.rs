//! Session collaborator
//!
//! Owns the `/api/v1/session` resource (login, inspection, sign-out) and
//! the verification operation the authorization gate delegates to.
//! Credential transport: a `sid` cookie set at login, with an
//! `Authorization: Bearer` fallback for non-browser clients. Verification
//! additionally accepts the token issued during the current exchange, so
//! the unconditional post-dispatch gate does not reject a login that just
//! succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hyper::{Method, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiHandler;
use crate::http::{Exchange, RequestParts};
use crate::logger;
use crate::store::{Datastore, Session};

/// Session cookie name
const SESSION_COOKIE: &str = "sid";

/// Challenge sent with 401 responses; listed in the exposed CORS headers
/// so browser clients can read it
const WWW_AUTHENTICATE: &str = "Bearer realm=\"patient-api\"";

/// Gate rejection: status and message the response is overwritten with
#[derive(Debug)]
pub struct AuthRejection {
    pub status: StatusCode,
    pub message: String,
}

impl AuthRejection {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.to_string(),
        }
    }

    fn forbidden(message: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.to_string(),
        }
    }

    /// Overwrite the exchange with this rejection
    pub fn apply(&self, exchange: &mut Exchange) {
        if self.status == StatusCode::UNAUTHORIZED {
            exchange.set_header("www-authenticate", WWW_AUTHENTICATE);
        }
        exchange.set_json_error(self.status, &self.message);
    }
}

/// Verification operation the authorization gate calls into
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Confirm the request carries a valid session with the required role
    ///
    /// `issued` is the token created while serving the current exchange,
    /// if any; it takes precedence over the request's own credential.
    async fn verify(
        &self,
        req: &RequestParts,
        issued: Option<&str>,
        required_role: &str,
    ) -> Result<Session, AuthRejection>;
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Session issuance, inspection, and verification
pub struct SessionManager {
    store: Arc<dyn Datastore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Datastore>, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Credential presented by the request itself (cookie, then bearer)
    fn request_credential<'a>(req: &'a RequestParts) -> Option<&'a str> {
        if let Some(token) = req.cookie(SESSION_COOKIE) {
            return Some(token);
        }
        req.header("authorization").strip_prefix("Bearer ")
    }

    async fn login(&self, req: &RequestParts, exchange: &mut Exchange) {
        let login: LoginRequest = match req.json() {
            Ok(l) => l,
            Err(e) => {
                exchange.set_json_error(StatusCode::BAD_REQUEST, &format!("invalid login body: {e}"));
                return;
            }
        };

        let user = match self.store.find_user(&login.username).await {
            Ok(Some(user)) if user.password == login.password => user,
            Ok(_) => {
                logger::log_warning(&format!("Failed login for '{}'", login.username));
                exchange.set_json_error(StatusCode::UNAUTHORIZED, "bad credentials");
                return;
            }
            Err(e) => {
                logger::log_error(&format!("User lookup failed: {e}"));
                exchange.set_json_error(StatusCode::INTERNAL_SERVER_ERROR, "session store failure");
                return;
            }
        };

        let session = Session {
            token: Uuid::new_v4().to_string(),
            username: user.username,
            role: user.role,
            expires_at: Utc::now() + self.ttl,
        };
        if let Err(e) = self.store.insert_session(session.clone()).await {
            logger::log_error(&format!("Session insert failed: {e}"));
            exchange.set_json_error(StatusCode::INTERNAL_SERVER_ERROR, "session store failure");
            return;
        }

        exchange.set_header(
            "set-cookie",
            &format!(
                "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Strict",
                session.token
            ),
        );
        exchange.record_issued_session(&session.token);
        exchange.set_json(StatusCode::OK, &session);
    }

    async fn inspect(&self, req: &RequestParts, exchange: &mut Exchange) {
        match self.lookup(Self::request_credential(req)).await {
            Ok(session) => exchange.set_json(StatusCode::OK, &session),
            Err(rejection) => rejection.apply(exchange),
        }
    }

    async fn sign_out(&self, req: &RequestParts, exchange: &mut Exchange) {
        if let Some(token) = Self::request_credential(req) {
            if let Err(e) = self.store.delete_session(token).await {
                logger::log_error(&format!("Session delete failed: {e}"));
            }
        }
        exchange.set_header(
            "set-cookie",
            &format!("{SESSION_COOKIE}=; Path=/; Max-Age=0"),
        );
        exchange.set_json(StatusCode::OK, &serde_json::json!({ "signed_out": true }));
    }

    /// Resolve a credential to a live session
    async fn lookup(&self, token: Option<&str>) -> Result<Session, AuthRejection> {
        let Some(token) = token else {
            return Err(AuthRejection::unauthorized("missing session credential"));
        };

        let session = match self.store.find_session(token).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(AuthRejection::unauthorized("invalid session")),
            Err(e) => {
                logger::log_error(&format!("Session lookup failed: {e}"));
                return Err(AuthRejection {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "session store failure".to_string(),
                });
            }
        };

        if session.is_expired(Utc::now()) {
            let _ = self.store.delete_session(token).await;
            return Err(AuthRejection::unauthorized("session expired"));
        }
        Ok(session)
    }
}

#[async_trait]
impl ApiHandler for SessionManager {
    async fn handle(&self, req: &RequestParts, exchange: &mut Exchange) {
        match *req.method() {
            Method::POST => self.login(req, exchange).await,
            Method::GET => self.inspect(req, exchange).await,
            Method::DELETE => self.sign_out(req, exchange).await,
            _ => exchange.set_json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        }
    }
}

#[async_trait]
impl SessionService for SessionManager {
    async fn verify(
        &self,
        req: &RequestParts,
        issued: Option<&str>,
        required_role: &str,
    ) -> Result<Session, AuthRejection> {
        let token = issued.or_else(|| Self::request_credential(req));
        let session = self.lookup(token).await?;
        if session.role != required_role {
            return Err(AuthRejection::forbidden(&format!(
                "role '{required_role}' required"
            )));
        }
        Ok(session)
    }
}
