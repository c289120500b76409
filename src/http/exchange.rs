//! Request/response exchange types
//!
//! `RequestParts` is an immutable snapshot of one inbound request, taken
//! after the body has been collected. `Exchange` is the response under
//! construction: the negotiator, the selected handler, and the
//! authorization gate each mutate it in turn, and it is converted to a
//! wire response exactly once.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::logger;

/// Immutable snapshot of one inbound request
pub struct RequestParts {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestParts {
    pub const fn new(
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            body,
        }
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Header value by name, empty string when absent or not valid UTF-8
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    /// Value of one cookie from the `Cookie` header, if present
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie").split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
    }

    /// Decoded query parameter by name, if present
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Response under construction
///
/// Header writes are last-write-wins per name. The exchange also records
/// the session token issued while serving this request, so the
/// authorization gate can accept a session created moments earlier in the
/// same pipeline pass.
pub struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    issued_session: Option<String>,
}

impl Exchange {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            issued_session: None,
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Set a header, replacing any previous value for the same name
    pub fn set_header(&mut self, name: &'static str, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(HeaderName::from_static(name), v);
            }
            Err(e) => {
                logger::log_warning(&format!("Dropping invalid value for header '{name}': {e}"));
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Serialize a value as the JSON response body with the given status
    pub fn set_json<T: Serialize>(&mut self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(json) => {
                self.status = status;
                self.set_header("content-type", "application/json");
                self.body = Bytes::from(json);
            }
            Err(e) => {
                logger::log_error(&format!("Failed to serialize response body: {e}"));
                self.status = StatusCode::INTERNAL_SERVER_ERROR;
                self.set_header("content-type", "application/json");
                self.body = Bytes::from_static(br#"{"error":"Internal server error"}"#);
            }
        }
    }

    /// JSON error body `{"error": message}` with the given status
    pub fn set_json_error(&mut self, status: StatusCode, message: &str) {
        let body = serde_json::json!({ "error": message });
        self.set_json(status, &body);
    }

    /// Plain-text error body with the given status
    pub fn set_plain_error(&mut self, status: StatusCode, message: &str) {
        self.status = status;
        self.set_header("content-type", "text/plain; charset=utf-8");
        self.body = Bytes::from(message.to_string());
    }

    /// Record the session token issued while serving this request
    pub fn record_issued_session(&mut self, token: &str) {
        self.issued_session = Some(token.to_string());
    }

    pub fn issued_session(&self) -> Option<&str> {
        self.issued_session.as_deref()
    }

    /// Convert into the wire response
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut builder = Response::builder().status(self.status);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        builder.body(Full::new(self.body)).unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build response: {e}"));
            Response::new(Full::new(Bytes::from_static(b"Internal server error")))
        })
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}
