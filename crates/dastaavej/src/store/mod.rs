//! Persistence for the whole portal.
//!
//! [`SqliteStore`] is the durable store the server runs on; [`MemoryStore`] keeps the
//! same contract in process for the demo and for tests.

mod memory;
mod sqlite;

#[cfg(test)]
mod contract;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::workflows::accounts::AccountStore;
use crate::workflows::applications::{
    ApplicationStatus, ApplicationStore, DocumentType, NewSubmission,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("application status changed concurrently; it is now {current}")]
    StaleStatus { current: ApplicationStatus },
    #[error("{0} is already registered")]
    Constraint(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Persistence required by the whole portal.
pub trait PortalStore: ApplicationStore + AccountStore + 'static {}

impl<T> PortalStore for T where T: ApplicationStore + AccountStore + 'static {}

/// Rejects document sets that do not belong to the submitted application or carry more
/// than one generated form.
fn check_documents(submission: &NewSubmission) -> Result<(), RepositoryError> {
    let application_id = submission.application.id;
    if submission
        .documents
        .iter()
        .any(|document| document.application_id != application_id)
    {
        return Err(RepositoryError::Constraint(
            "document for another application".to_string(),
        ));
    }

    let forms = submission
        .documents
        .iter()
        .filter(|document| document.document_type == DocumentType::ApplicationForm)
        .count();
    if forms > 1 {
        return Err(RepositoryError::Constraint(
            "application_form document".to_string(),
        ));
    }
    Ok(())
}
