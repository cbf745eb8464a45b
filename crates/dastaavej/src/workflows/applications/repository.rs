use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ApplicantDetails, Application, ApplicationId, ApplicationNumber, ApplicationStatus,
    Document, DocumentKind, DocumentType, DraftApplication, DraftId, Notification, StatusUpdate,
};
use crate::store::RepositoryError;
use crate::workflows::accounts::{UserId, UserRepository};

/// Application together with the rows it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub documents: Vec<Document>,
    /// Oldest first.
    pub history: Vec<StatusUpdate>,
}

impl ApplicationRecord {
    pub fn document(&self, document_type: DocumentType) -> Option<&Document> {
        self.documents
            .iter()
            .find(|document| document.document_type == document_type)
    }

    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary::from(&self.application)
    }

    pub fn detail(&self) -> ApplicationDetail {
        ApplicationDetail {
            summary: self.summary(),
            applicant: self.application.applicant.clone(),
            documents: self.documents.iter().map(DocumentSummary::from).collect(),
            history: self.history.clone(),
            allowed_transitions: self.application.status.allowed_transitions().to_vec(),
        }
    }
}

/// Everything one submission writes, committed as a single unit.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub application: Application,
    pub documents: Vec<Document>,
    /// Draft promoted by this submission; removed in the same commit.
    pub consumed_draft: Option<DraftId>,
}

/// Planned effects of one status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommit {
    pub application_id: ApplicationId,
    pub update: StatusUpdate,
    pub notification: Notification,
}

/// Storage abstraction for applications, their documents, history, and notifications.
pub trait ApplicationRepository: Send + Sync {
    /// Fails with [`RepositoryError::Conflict`] when the application number is taken.
    fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<ApplicationRecord, RepositoryError>;

    /// Applies the transition if the stored status still allows it, otherwise fails with
    /// [`RepositoryError::StaleStatus`] and writes nothing.
    fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<ApplicationRecord, RepositoryError>;

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;

    fn fetch_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;

    /// Newest first.
    fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Application>, RepositoryError>;

    /// Newest first.
    fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<Application>, RepositoryError>;

    /// Number of applications currently in each status.
    fn count_by_status(&self) -> Result<StatusCounts, RepositoryError>;

    /// Newest first.
    fn notifications_for(&self, user: &UserId) -> Result<Vec<Notification>, RepositoryError>;

    /// Returns how many notifications changed state.
    fn mark_notifications_read(&self, user: &UserId) -> Result<usize, RepositoryError>;
}

pub trait DraftRepository: Send + Sync {
    fn insert_draft(&self, draft: DraftApplication) -> Result<(), RepositoryError>;
    fn fetch_draft(&self, id: &DraftId) -> Result<Option<DraftApplication>, RepositoryError>;
    /// Removes drafts that expired at or before `now`, returning how many went.
    fn purge_expired_drafts(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

/// Everything the application service needs from persistence.
pub trait ApplicationStore: ApplicationRepository + DraftRepository + UserRepository {}

impl<T> ApplicationStore for T where T: ApplicationRepository + DraftRepository + UserRepository {}

/// Per-status totals for the agency dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub under_review: usize,
    pub approved: usize,
    pub rejected: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: ApplicationStatus, count: usize) {
        let slot = match status {
            ApplicationStatus::Pending => &mut self.pending,
            ApplicationStatus::UnderReview => &mut self.under_review,
            ApplicationStatus::Approved => &mut self.approved,
            ApplicationStatus::Rejected => &mut self.rejected,
        };
        *slot += count;
        self.total += count;
    }

    pub fn get(&self, status: ApplicationStatus) -> usize {
        match status {
            ApplicationStatus::Pending => self.pending,
            ApplicationStatus::UnderReview => self.under_review,
            ApplicationStatus::Approved => self.approved,
            ApplicationStatus::Rejected => self.rejected,
        }
    }
}

impl FromIterator<ApplicationStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = ApplicationStatus>>(statuses: I) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.add(status, 1);
        }
        counts
    }
}

/// List-friendly projection of an application.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub application_number: ApplicationNumber,
    pub document_kind: DocumentKind,
    pub status: ApplicationStatus,
    pub applicant_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Application> for ApplicationSummary {
    fn from(application: &Application) -> Self {
        Self {
            id: application.id,
            application_number: application.number.clone(),
            document_kind: application.kind,
            status: application.status,
            applicant_name: application.applicant.full_name.clone(),
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

/// Full projection returned to the owner or a reviewer. Blob identifiers stay internal.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub summary: ApplicationSummary,
    pub applicant: ApplicantDetails,
    pub documents: Vec<DocumentSummary>,
    pub history: Vec<StatusUpdate>,
    pub allowed_transitions: Vec<ApplicationStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document_type: DocumentType,
    pub filename: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(document: &Document) -> Self {
        Self {
            document_type: document.document_type,
            filename: document.filename.clone(),
            mime_type: document.mime_type.clone(),
            uploaded_at: document.uploaded_at,
        }
    }
}
