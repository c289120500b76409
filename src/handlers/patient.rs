//! Patient collaborators
//!
//! Handlers for the patient list, single-patient read/update, and patient
//! note resources. Record lookups go through the injected datastore;
//! method filtering and input validation happen here.

use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Method, StatusCode};
use serde::Deserialize;

use super::ApiHandler;
use crate::http::{Exchange, RequestParts};
use crate::logger;
use crate::store::{Datastore, Patient, StoreError};

/// Default note author when the client does not name one
const DEFAULT_AUTHOR: &str = "nurse";

fn store_failure(exchange: &mut Exchange, context: &str, e: &StoreError) {
    logger::log_error(&format!("{context}: {e}"));
    exchange.set_json_error(StatusCode::INTERNAL_SERVER_ERROR, "datastore failure");
}

/// Parse a numeric record id from a query parameter
fn id_param(req: &RequestParts, name: &str) -> Result<i64, String> {
    match req.query_param(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("invalid '{name}' parameter: '{raw}'")),
        None => Err(format!("missing '{name}' parameter")),
    }
}

/// `/api/v1/patients` — ward roster
pub struct PatientListHandler {
    store: Arc<dyn Datastore>,
}

impl PatientListHandler {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApiHandler for PatientListHandler {
    async fn handle(&self, req: &RequestParts, exchange: &mut Exchange) {
        if *req.method() != Method::GET {
            exchange.set_json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            return;
        }
        match self.store.list_patients().await {
            Ok(patients) => exchange.set_json(StatusCode::OK, &patients),
            Err(e) => store_failure(exchange, "Patient list failed", &e),
        }
    }
}

/// `/api/v1/patient` — single patient read/update, keyed by `?id=`
pub struct PatientDetailHandler {
    store: Arc<dyn Datastore>,
}

impl PatientDetailHandler {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    async fn read(&self, req: &RequestParts, exchange: &mut Exchange) {
        let id = match id_param(req, "id") {
            Ok(id) => id,
            Err(message) => {
                exchange.set_json_error(StatusCode::BAD_REQUEST, &message);
                return;
            }
        };
        match self.store.find_patient(id).await {
            Ok(Some(patient)) => exchange.set_json(StatusCode::OK, &patient),
            Ok(None) => exchange.set_json_error(StatusCode::NOT_FOUND, "unknown patient"),
            Err(e) => store_failure(exchange, "Patient lookup failed", &e),
        }
    }

    async fn update(&self, req: &RequestParts, exchange: &mut Exchange) {
        let patient: Patient = match req.json() {
            Ok(p) => p,
            Err(e) => {
                exchange
                    .set_json_error(StatusCode::BAD_REQUEST, &format!("invalid patient body: {e}"));
                return;
            }
        };
        match self.store.update_patient(patient).await {
            Ok(updated) => exchange.set_json(StatusCode::OK, &updated),
            Err(StoreError::NotFound) => {
                exchange.set_json_error(StatusCode::NOT_FOUND, "unknown patient");
            }
            Err(e) => store_failure(exchange, "Patient update failed", &e),
        }
    }
}

#[async_trait]
impl ApiHandler for PatientDetailHandler {
    async fn handle(&self, req: &RequestParts, exchange: &mut Exchange) {
        match *req.method() {
            Method::GET => self.read(req, exchange).await,
            Method::PUT => self.update(req, exchange).await,
            _ => exchange.set_json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        }
    }
}

#[derive(Deserialize)]
struct NoteRequest {
    patient: i64,
    note: String,
    author: Option<String>,
}

/// `/api/v1/patient/note` — care notes, keyed by `?patient=`
pub struct PatientNoteHandler {
    store: Arc<dyn Datastore>,
}

impl PatientNoteHandler {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    async fn list(&self, req: &RequestParts, exchange: &mut Exchange) {
        let patient = match id_param(req, "patient") {
            Ok(id) => id,
            Err(message) => {
                exchange.set_json_error(StatusCode::BAD_REQUEST, &message);
                return;
            }
        };
        match self.store.list_notes(patient).await {
            Ok(notes) => exchange.set_json(StatusCode::OK, &notes),
            Err(e) => store_failure(exchange, "Note list failed", &e),
        }
    }

    async fn create(&self, req: &RequestParts, exchange: &mut Exchange) {
        let request: NoteRequest = match req.json() {
            Ok(r) => r,
            Err(e) => {
                exchange.set_json_error(StatusCode::BAD_REQUEST, &format!("invalid note body: {e}"));
                return;
            }
        };
        let author = request.author.unwrap_or_else(|| DEFAULT_AUTHOR.to_string());
        match self
            .store
            .insert_note(request.patient, request.note, author)
            .await
        {
            Ok(note) => exchange.set_json(StatusCode::OK, &note),
            Err(StoreError::NotFound) => {
                exchange.set_json_error(StatusCode::NOT_FOUND, "unknown patient");
            }
            Err(e) => store_failure(exchange, "Note insert failed", &e),
        }
    }
}

#[async_trait]
impl ApiHandler for PatientNoteHandler {
    async fn handle(&self, req: &RequestParts, exchange: &mut Exchange) {
        match *req.method() {
            Method::GET => self.list(req, exchange).await,
            Method::POST => self.create(req, exchange).await,
            _ => exchange.set_json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PatientNote};
    use hyper::body::Bytes;
    use hyper::header::HeaderMap;

    fn make_request(method: Method, query: Option<&str>, body: &str) -> RequestParts {
        RequestParts::new(
            method,
            "/api/v1/patient".to_string(),
            query.map(String::from),
            HeaderMap::new(),
            Bytes::from(body.to_string()),
        )
    }

    async fn seeded_store() -> Arc<dyn Datastore> {
        let store = Arc::new(MemoryStore::new());
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_list_returns_seeded_patients() {
        let handler = PatientListHandler::new(seeded_store().await);
        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::GET, None, ""), &mut exchange)
            .await;

        assert_eq!(exchange.status(), StatusCode::OK);
        let patients: Vec<Patient> = serde_json::from_slice(exchange.body()).unwrap();
        assert_eq!(patients.len(), 3);
    }

    #[tokio::test]
    async fn test_list_rejects_other_methods() {
        let handler = PatientListHandler::new(seeded_store().await);
        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::DELETE, None, ""), &mut exchange)
            .await;
        assert_eq!(exchange.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_detail_read() {
        let handler = PatientDetailHandler::new(seeded_store().await);
        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::GET, Some("id=1"), ""), &mut exchange)
            .await;

        assert_eq!(exchange.status(), StatusCode::OK);
        let patient: Patient = serde_json::from_slice(exchange.body()).unwrap();
        assert_eq!(patient.first_name, "Ada");
    }

    #[tokio::test]
    async fn test_detail_unknown_id() {
        let handler = PatientDetailHandler::new(seeded_store().await);
        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::GET, Some("id=99"), ""), &mut exchange)
            .await;
        assert_eq!(exchange.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_detail_bad_id_param() {
        let handler = PatientDetailHandler::new(seeded_store().await);

        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::GET, None, ""), &mut exchange)
            .await;
        assert_eq!(exchange.status(), StatusCode::BAD_REQUEST);

        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::GET, Some("id=abc"), ""), &mut exchange)
            .await;
        assert_eq!(exchange.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_detail_update() {
        let store = seeded_store().await;
        let handler = PatientDetailHandler::new(Arc::clone(&store));

        let mut patient = store.find_patient(3).await.unwrap().unwrap();
        patient.room = "ICU-2".to_string();
        let body = serde_json::to_string(&patient).unwrap();

        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::PUT, None, &body), &mut exchange)
            .await;

        assert_eq!(exchange.status(), StatusCode::OK);
        assert_eq!(store.find_patient(3).await.unwrap().unwrap().room, "ICU-2");
    }

    #[tokio::test]
    async fn test_detail_update_unknown_patient() {
        let handler = PatientDetailHandler::new(seeded_store().await);
        let body = r#"{"id":404,"first_name":"No","last_name":"One","date_of_birth":"1990-01-01","sex":"F","room":"1"}"#;

        let mut exchange = Exchange::new();
        handler
            .handle(&make_request(Method::PUT, None, body), &mut exchange)
            .await;
        assert_eq!(exchange.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_note_create_and_list() {
        let store = seeded_store().await;
        let notes = PatientNoteHandler::new(Arc::clone(&store));

        let mut exchange = Exchange::new();
        notes
            .handle(
                &make_request(
                    Method::POST,
                    None,
                    r#"{"patient":2,"note":"sleeping well","author":"joy"}"#,
                ),
                &mut exchange,
            )
            .await;
        assert_eq!(exchange.status(), StatusCode::OK);

        let mut exchange = Exchange::new();
        notes
            .handle(
                &make_request(Method::GET, Some("patient=2"), ""),
                &mut exchange,
            )
            .await;
        assert_eq!(exchange.status(), StatusCode::OK);
        let listed: Vec<PatientNote> = serde_json::from_slice(exchange.body()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].note, "sleeping well");
        assert_eq!(listed[0].author, "joy");
    }

    #[tokio::test]
    async fn test_note_default_author() {
        let store = seeded_store().await;
        let notes = PatientNoteHandler::new(Arc::clone(&store));

        let mut exchange = Exchange::new();
        notes
            .handle(
                &make_request(Method::POST, None, r#"{"patient":1,"note":"admitted"}"#),
                &mut exchange,
            )
            .await;

        let note: PatientNote = serde_json::from_slice(exchange.body()).unwrap();
        assert_eq!(note.author, "nurse");
    }

    #[tokio::test]
    async fn test_note_for_unknown_patient() {
        let notes = PatientNoteHandler::new(seeded_store().await);
        let mut exchange = Exchange::new();
        notes
            .handle(
                &make_request(Method::POST, None, r#"{"patient":77,"note":"x"}"#),
                &mut exchange,
            )
            .await;
        assert_eq!(exchange.status(), StatusCode::NOT_FOUND);
    }
}
