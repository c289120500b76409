//! In-memory datastore
//!
//! Self-contained implementation of the `Datastore` seam, seeded with demo
//! ward data on `init`. Everything lives behind one `RwLock`; a SQL-backed
//! implementation would slot in behind the same trait.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;

use super::{Datastore, Patient, PatientNote, Session, StoreError, User};
use crate::logger;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    sessions: HashMap<String, Session>,
    patients: BTreeMap<i64, Patient>,
    notes: Vec<PatientNote>,
    next_note_id: i64,
}

/// Seeded in-memory datastore
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn seed_users() -> Vec<User> {
    vec![
        User {
            username: "joy".to_string(),
            password: "joy123".to_string(),
            role: "nurse".to_string(),
        },
        User {
            username: "sam".to_string(),
            password: "sam123".to_string(),
            role: "clerk".to_string(),
        },
    ]
}

fn seed_patients() -> Vec<Patient> {
    vec![
        Patient {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Morris".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1947, 3, 11).unwrap_or_default(),
            sex: "F".to_string(),
            room: "12A".to_string(),
        },
        Patient {
            id: 2,
            first_name: "Liam".to_string(),
            last_name: "Okafor".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1988, 9, 2).unwrap_or_default(),
            sex: "M".to_string(),
            room: "12B".to_string(),
        },
        Patient {
            id: 3,
            first_name: "Mei".to_string(),
            last_name: "Tanaka".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1963, 12, 30).unwrap_or_default(),
            sex: "F".to_string(),
            room: "14".to_string(),
        },
    ]
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.users = seed_users()
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect();
        tables.patients = seed_patients().into_iter().map(|p| (p.id, p)).collect();
        tables.notes.clear();
        tables.next_note_id = 1;
        logger::log_store_ready(tables.patients.len(), tables.users.len());
        Ok(())
    }

    async fn close(&self) {
        let mut tables = self.tables.write().await;
        tables.sessions.clear();
        logger::log_store_closed();
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(username).cloned())
    }

    async fn insert_session(&self, session: Session) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.sessions.remove(token);
        Ok(())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.patients.values().cloned().collect())
    }

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.patients.get(&id).cloned())
    }

    async fn update_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.patients.contains_key(&patient.id) {
            return Err(StoreError::NotFound);
        }
        tables.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn list_notes(&self, patient: i64) -> Result<Vec<PatientNote>, StoreError> {
        let tables = self.tables.read().await;
        let mut notes: Vec<PatientNote> = tables
            .notes
            .iter()
            .filter(|n| n.patient == patient)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(notes)
    }

    async fn insert_note(
        &self,
        patient: i64,
        note: String,
        author: String,
    ) -> Result<PatientNote, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.patients.contains_key(&patient) {
            return Err(StoreError::NotFound);
        }
        let id = tables.next_note_id;
        tables.next_note_id += 1;
        let record = PatientNote {
            id,
            patient,
            note,
            author,
            created_at: Utc::now(),
        };
        tables.notes.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_init_seeds_demo_data() {
        let store = seeded_store().await;
        let patients = store.list_patients().await.unwrap();
        assert_eq!(patients.len(), 3);
        assert!(store.find_user("joy").await.unwrap().is_some());
        assert!(store.find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let store = seeded_store().await;
        let session = Session {
            token: "tok-1".to_string(),
            username: "joy".to_string(),
            role: "nurse".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        store.insert_session(session).await.unwrap();

        let found = store.find_session("tok-1").await.unwrap().unwrap();
        assert_eq!(found.username, "joy");

        store.delete_session("tok-1").await.unwrap();
        assert!(store.find_session("tok-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_revokes_sessions() {
        let store = seeded_store().await;
        store
            .insert_session(Session {
                token: "tok-2".to_string(),
                username: "joy".to_string(),
                role: "nurse".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        store.close().await;
        assert!(store.find_session("tok-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_patient() {
        let store = seeded_store().await;
        let mut patient = store.find_patient(2).await.unwrap().unwrap();
        patient.room = "7".to_string();

        let updated = store.update_patient(patient).await.unwrap();
        assert_eq!(updated.room, "7");
        assert_eq!(store.find_patient(2).await.unwrap().unwrap().room, "7");
    }

    #[tokio::test]
    async fn test_update_unknown_patient_is_not_found() {
        let store = seeded_store().await;
        let patient = Patient {
            id: 999,
            first_name: "Ghost".to_string(),
            last_name: "Record".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            sex: "M".to_string(),
            room: "0".to_string(),
        };
        assert!(matches!(
            store.update_patient(patient).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_notes_newest_first() {
        let store = seeded_store().await;
        store
            .insert_note(1, "admitted".to_string(), "joy".to_string())
            .await
            .unwrap();
        store
            .insert_note(1, "vitals stable".to_string(), "joy".to_string())
            .await
            .unwrap();
        store
            .insert_note(2, "other patient".to_string(), "joy".to_string())
            .await
            .unwrap();

        let notes = store.list_notes(1).await.unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].note, "vitals stable");
        assert_eq!(notes[1].note, "admitted");
    }

    #[tokio::test]
    async fn test_note_for_unknown_patient_is_not_found() {
        let store = seeded_store().await;
        assert!(matches!(
            store
                .insert_note(999, "note".to_string(), "joy".to_string())
                .await,
            Err(StoreError::NotFound)
        ));
    }
}
