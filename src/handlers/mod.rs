//! Resource handler module
//!
//! The collaborators the dispatcher routes into: session issuance and
//! verification, patient list/detail, and patient notes. Each handler owns
//! its own method filtering and mutates the `Exchange` it is given.

pub mod patient;
pub mod session;

pub use patient::{PatientDetailHandler, PatientListHandler, PatientNoteHandler};
pub use session::{AuthRejection, SessionManager, SessionService};

use async_trait::async_trait;

use crate::http::{Exchange, RequestParts};

/// One resource handler behind one route-table path
#[async_trait]
pub trait ApiHandler: Send + Sync {
    async fn handle(&self, req: &RequestParts, exchange: &mut Exchange);
}
