//! Datastore module
//!
//! Trait seam between the resource handlers and whatever persists users,
//! sessions, patients, and notes. The process owns exactly one datastore:
//! `init` runs once before the listener starts accepting (a failure is
//! fatal), `close` runs once during graceful shutdown.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Datastore-level failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Login account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub role: String,
}

/// Issued session record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Patient record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub sex: String,
    pub room: String,
}

/// Care note attached to a patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientNote {
    pub id: i64,
    pub patient: i64,
    pub note: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence operations the handlers depend on
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Prepare the datastore; called once at startup, failure is fatal
    async fn init(&self) -> Result<(), StoreError>;

    /// Release the datastore; called once during shutdown
    async fn close(&self);

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn insert_session(&self, session: Session) -> Result<(), StoreError>;

    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError>;

    async fn delete_session(&self, token: &str) -> Result<(), StoreError>;

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError>;

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, StoreError>;

    /// Replace an existing patient record, keyed by id
    async fn update_patient(&self, patient: Patient) -> Result<Patient, StoreError>;

    /// Notes for one patient, newest first
    async fn list_notes(&self, patient: i64) -> Result<Vec<PatientNote>, StoreError>;

    async fn insert_note(
        &self,
        patient: i64,
        note: String,
        author: String,
    ) -> Result<PatientNote, StoreError>;
}
