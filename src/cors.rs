//! CORS negotiation module
//!
//! Applies the browser-facing access-control headers to every response and
//! fully satisfies `OPTIONS` preflight exchanges before any dispatch
//! happens. Origin resolution is a policy decision: the default
//! configuration echoes the inbound `Origin` verbatim (demo behavior), an
//! allow-list restricts echoing to known origins.

use hyper::StatusCode;

use crate::http::{Exchange, RequestParts};

/// Headers a browser client is allowed to read from responses
const EXPOSED_HEADERS: &str = "WWW-Authenticate,Server-Authorization";

/// Headers accepted on the actual cross-origin request
const ALLOWED_REQUEST_HEADERS: &str = "Accept,Authorization,Content-Type,If-None-Match";

/// Preflight answers may be cached for one day
const MAX_AGE_SECS: &str = "86400";

/// Origin resolution policy
///
/// An empty allow-list echoes whatever `Origin` the client sent, including
/// the empty string when the header is absent. A non-empty allow-list
/// resolves unknown origins to the empty string; the header itself is
/// always present.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Resolve the inbound `Origin` header to the value echoed back
    pub fn resolve<'a>(&self, origin: &'a str) -> &'a str {
        if self.allowed.is_empty() || self.allowed.iter().any(|a| a == origin) {
            origin
        } else {
            ""
        }
    }
}

/// Apply the baseline access-control headers every response carries
///
/// Runs before preflight handling and before dispatch, for every request.
pub fn apply_baseline(req: &RequestParts, policy: &OriginPolicy, exchange: &mut Exchange) {
    exchange.set_header("access-control-allow-credentials", "true");
    exchange.set_header(
        "access-control-allow-origin",
        policy.resolve(req.header("origin")),
    );
    exchange.set_header("access-control-expose-headers", EXPOSED_HEADERS);
    exchange.set_header("cache-control", "no-cache");
    exchange.set_header("connection", "keep-alive");
}

/// Satisfy an `OPTIONS` preflight exchange
///
/// The requested method is echoed back unchecked; a missing
/// `Access-Control-Request-Method` echoes an empty value.
pub fn apply_preflight(req: &RequestParts, exchange: &mut Exchange) {
    exchange.set_header("access-control-allow-headers", ALLOWED_REQUEST_HEADERS);
    exchange.set_header(
        "access-control-allow-methods",
        req.header("access-control-request-method"),
    );
    exchange.set_header("access-control-max-age", MAX_AGE_SECS);
    exchange.set_status(StatusCode::OK);
}
