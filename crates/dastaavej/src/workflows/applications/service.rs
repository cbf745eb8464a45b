use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::access::{Access, AccessDenied, AccessGuard, Operation};
use super::domain::{
    ApplicantDetails, ApplicantForm, Application, ApplicationId, ApplicationNumber,
    ApplicationStatus, Document, DocumentId, DocumentKind, DocumentType, DraftApplication,
    DraftId, Notification, UploadedFile,
};
use super::lifecycle::{plan_transition, status_mail, InvalidTransition};
use super::render::{FormContent, FormRenderer, PdfFormRenderer, RenderError, APPLICATION_FORM_MIME};
use super::repository::{
    ApplicationRecord, ApplicationStore, NewSubmission, StatusCounts, TransitionCommit,
};
use super::validation::{
    FormValidator, UploadPolicy, ValidatedUpload, ValidationError, DEFAULT_MAX_UPLOAD_BYTES,
};
use crate::config::PortalConfig;
use crate::notify::Notifier;
use crate::storage::{BlobId, StorageError, StorageGateway};
use crate::store::RepositoryError;
use crate::workflows::accounts::{Principal, Role};

#[derive(Debug, Clone)]
pub struct ApplicationSettings {
    pub max_upload_bytes: usize,
    pub draft_ttl: Duration,
    /// Fresh application numbers tried before giving up on collisions.
    pub number_attempts: usize,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            draft_ttl: Duration::minutes(24 * 60),
            number_attempts: 3,
        }
    }
}

impl From<&PortalConfig> for ApplicationSettings {
    fn from(config: &PortalConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            draft_ttl: Duration::minutes(config.draft_ttl_minutes),
            ..Self::default()
        }
    }
}

/// How a stored document is handed to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentView {
    Link { url: String },
    Content(DocumentContent),
}

/// Document bytes fetched from storage for a single response; never kept locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationFeed {
    pub unread: usize,
    pub notifications: Vec<Notification>,
}

/// Submission, review, and retrieval of identity-document applications.
pub struct ApplicationService<R, S, N> {
    repository: Arc<R>,
    storage: Arc<S>,
    notifier: Arc<N>,
    renderer: Arc<dyn FormRenderer>,
    guard: AccessGuard,
    uploads: UploadPolicy,
    settings: ApplicationSettings,
}

impl<R, S, N> ApplicationService<R, S, N>
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        storage: Arc<S>,
        notifier: Arc<N>,
        settings: ApplicationSettings,
    ) -> Self {
        Self {
            repository,
            storage,
            notifier,
            renderer: Arc::new(PdfFormRenderer),
            guard: AccessGuard,
            uploads: UploadPolicy::new(settings.max_upload_bytes),
            settings,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn FormRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.uploads.max_bytes()
    }

    fn validator(&self) -> FormValidator {
        FormValidator::new(Utc::now().date_naive())
    }

    /// Step one of the two-phase flow: validate the form and park it as a draft.
    pub fn start_draft(
        &self,
        principal: &Principal,
        kind: DocumentKind,
        form: ApplicantForm,
    ) -> Result<DraftApplication, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::Submit)?;
        let applicant = self.validator().validate(kind, form)?;
        let now = Utc::now();

        match self.repository.purge_expired_drafts(now) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired drafts removed"),
            Err(err) => warn!(error = %err, "unable to purge expired drafts"),
        }

        let draft = self.park_draft(principal, kind, applicant, now)?;
        info!(draft_id = %draft.id.0, kind = %kind, "application draft started");
        Ok(draft)
    }

    /// Step two: attach the files and promote the draft. The draft survives a failed
    /// promotion so the citizen can retry.
    pub fn submit_draft(
        &self,
        principal: &Principal,
        draft_id: DraftId,
        files: Vec<UploadedFile>,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::Submit)?;
        let draft = self
            .repository
            .fetch_draft(&draft_id)?
            .ok_or(ApplicationServiceError::DraftNotFound)?;
        if draft.owner != principal.user_id {
            return Err(AccessDenied::NotOwner.into());
        }
        if draft.is_expired(Utc::now()) {
            return Err(ApplicationServiceError::DraftExpired);
        }

        self.promote(principal, draft.kind, draft.applicant, files, Some(draft.id))
            .map_err(|err| match err {
                ApplicationServiceError::StorageUnavailable { source, .. } => {
                    ApplicationServiceError::StorageUnavailable {
                        source,
                        retry_draft: Some(draft_id),
                    }
                }
                other => other,
            })
    }

    /// Single-shot submission. Either every document is stored and recorded, or nothing
    /// is. When storage fails the validated form is parked as a draft for one retry.
    pub fn submit(
        &self,
        principal: &Principal,
        kind: DocumentKind,
        form: ApplicantForm,
        files: Vec<UploadedFile>,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::Submit)?;
        let applicant = self.validator().validate(kind, form)?;

        match self.promote(principal, kind, applicant.clone(), files, None) {
            Err(ApplicationServiceError::StorageUnavailable { source, .. }) => {
                let retry_draft = match self.park_draft(principal, kind, applicant, Utc::now()) {
                    Ok(draft) => Some(draft.id),
                    Err(err) => {
                        warn!(error = %err, "unable to keep form for retry");
                        None
                    }
                };
                Err(ApplicationServiceError::StorageUnavailable {
                    source,
                    retry_draft,
                })
            }
            outcome => outcome,
        }
    }

    fn park_draft(
        &self,
        principal: &Principal,
        kind: DocumentKind,
        applicant: ApplicantDetails,
        now: DateTime<Utc>,
    ) -> Result<DraftApplication, ApplicationServiceError> {
        let draft = DraftApplication {
            id: DraftId::new(),
            owner: principal.user_id,
            kind,
            applicant,
            created_at: now,
            expires_at: now + self.settings.draft_ttl,
        };
        self.repository.insert_draft(draft.clone())?;
        Ok(draft)
    }

    fn promote(
        &self,
        principal: &Principal,
        kind: DocumentKind,
        applicant: ApplicantDetails,
        files: Vec<UploadedFile>,
        draft: Option<DraftId>,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let uploads = self.uploads.check(kind, files)?;
        let id = ApplicationId::new();

        for attempt in 1..=self.settings.number_attempts {
            let number = ApplicationNumber::generate(kind);
            if self.repository.fetch_by_number(&number)?.is_some() {
                warn!(attempt, number = %number, "application number already taken");
                continue;
            }

            let now = Utc::now();
            let application = Application {
                id,
                number,
                owner: principal.user_id,
                kind,
                status: ApplicationStatus::Pending,
                applicant: applicant.clone(),
                created_at: now,
                updated_at: now,
            };
            let documents = self.store_documents(&application, &uploads, now)?;

            let submission = NewSubmission {
                application,
                documents,
                consumed_draft: draft,
            };
            let blobs: Vec<BlobId> = submission
                .documents
                .iter()
                .map(|document| document.blob.clone())
                .collect();

            match self.repository.insert_submission(submission) {
                Ok(record) => {
                    info!(
                        application_id = %record.application.id,
                        number = %record.application.number,
                        kind = %kind,
                        documents = record.documents.len(),
                        "application submitted"
                    );
                    return Ok(record);
                }
                Err(RepositoryError::Conflict) => {
                    self.discard_blobs(&blobs);
                    warn!(attempt, "application number collided at commit; retrying");
                }
                Err(RepositoryError::NotFound) if draft.is_some() => {
                    self.discard_blobs(&blobs);
                    return Err(ApplicationServiceError::DraftNotFound);
                }
                Err(err) => {
                    self.discard_blobs(&blobs);
                    return Err(err.into());
                }
            }
        }

        Err(RepositoryError::Conflict.into())
    }

    /// Uploads every file plus the rendered form. On any failure the blobs already
    /// written are discarded before the error is returned.
    fn store_documents(
        &self,
        application: &Application,
        uploads: &[ValidatedUpload],
        now: DateTime<Utc>,
    ) -> Result<Vec<Document>, ApplicationServiceError> {
        let mut documents = Vec::with_capacity(uploads.len() + 1);
        match self.upload_into(&mut documents, application, uploads, now) {
            Ok(()) => Ok(documents),
            Err(err) => {
                warn!(
                    number = %application.number,
                    uploaded = documents.len(),
                    error = %err,
                    "submission upload failed; discarding stored files"
                );
                let blobs: Vec<BlobId> = documents.into_iter().map(|document| document.blob).collect();
                self.discard_blobs(&blobs);
                Err(err)
            }
        }
    }

    fn upload_into(
        &self,
        documents: &mut Vec<Document>,
        application: &Application,
        uploads: &[ValidatedUpload],
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationServiceError> {
        for upload in uploads {
            let name = format!(
                "{}_{}_{}",
                application.number, upload.document_type, upload.filename
            );
            let blob = self
                .storage
                .put(&upload.bytes, &name, &upload.mime_type)
                .map_err(ApplicationServiceError::storage)?;
            documents.push(Document {
                id: DocumentId(Uuid::new_v4()),
                application_id: application.id,
                document_type: upload.document_type,
                blob,
                filename: upload.filename.clone(),
                mime_type: upload.mime_type.clone(),
                uploaded_at: now,
            });
        }

        let photo = uploads
            .iter()
            .find(|upload| upload.document_type == DocumentType::Photo)
            .map(|upload| upload.bytes.as_slice());
        let rendered = self.renderer.render(&FormContent {
            kind: application.kind,
            number: &application.number,
            applicant: &application.applicant,
            photo,
            application_date: now.date_naive(),
        })?;

        let filename = format!("{}_application_form.pdf", application.number);
        let blob = self
            .storage
            .put(&rendered, &filename, APPLICATION_FORM_MIME)
            .map_err(ApplicationServiceError::storage)?;
        documents.push(Document {
            id: DocumentId(Uuid::new_v4()),
            application_id: application.id,
            document_type: DocumentType::ApplicationForm,
            blob,
            filename,
            mime_type: APPLICATION_FORM_MIME.to_string(),
            uploaded_at: now,
        });
        Ok(())
    }

    fn discard_blobs(&self, blobs: &[BlobId]) {
        for blob in blobs {
            if let Err(err) = self.storage.discard(blob) {
                warn!(blob = %blob, error = %err, "orphaned blob left in storage");
            }
        }
    }

    /// Move an application along its lifecycle. The status change, audit entry, and
    /// notification commit together; the status mail afterwards is best-effort.
    pub fn transition(
        &self,
        principal: &Principal,
        id: ApplicationId,
        to: ApplicationStatus,
        comment: Option<String>,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::Transition)?;
        let record = self.fetch(&id)?;
        self.guard
            .authorize_on(principal, Operation::Transition, &record.application)?;

        let commit = plan_transition(
            &record.application,
            to,
            comment,
            principal.user_id,
            Utc::now(),
        )?;

        let updated = match self.repository.commit_transition(commit.clone()) {
            Ok(updated) => updated,
            Err(RepositoryError::StaleStatus { current }) => {
                return Err(ApplicationServiceError::InvalidTransition { from: current, to })
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            application_id = %id,
            number = %updated.application.number,
            from = %record.application.status,
            to = %to,
            actor = %principal.user_id,
            "application status updated"
        );
        self.send_status_mail(&updated.application, &commit);
        Ok(updated)
    }

    fn send_status_mail(&self, application: &Application, commit: &TransitionCommit) {
        let citizen = match self.repository.fetch_user(&application.owner) {
            Ok(Some(citizen)) => citizen,
            Ok(None) => {
                warn!(owner = %application.owner, "applicant account missing; status mail skipped");
                return;
            }
            Err(err) => {
                warn!(error = %err, "applicant lookup failed; status mail skipped");
                return;
            }
        };

        if let Err(err) = self.notifier.send(status_mail(&citizen, commit)) {
            warn!(
                number = %application.number,
                error = %err,
                "status mail not delivered"
            );
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(ApplicationServiceError::NotFound)
    }

    pub fn application(
        &self,
        principal: &Principal,
        id: ApplicationId,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::View)?;
        let record = self.fetch(&id)?;
        self.guard
            .authorize_on(principal, Operation::View, &record.application)?;
        Ok(record)
    }

    /// Status lookup by the externally quoted application number.
    pub fn lookup(
        &self,
        principal: &Principal,
        number: &ApplicationNumber,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::View)?;
        let record = self
            .repository
            .fetch_by_number(number)?
            .ok_or(ApplicationServiceError::NotFound)?;
        self.guard
            .authorize_on(principal, Operation::View, &record.application)?;
        Ok(record)
    }

    pub fn list_for_citizen(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Application>, ApplicationServiceError> {
        match self.guard.authorize(principal, Operation::View)? {
            Access::Owner => Ok(self.repository.list_for_owner(&principal.user_id)?),
            Access::Reviewer => Err(AccessDenied::WrongRole {
                required: Role::Citizen,
                operation: Operation::View,
            }
            .into()),
        }
    }

    /// Agency queue filtered by status, `pending` when unspecified.
    pub fn review_queue(
        &self,
        principal: &Principal,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::ReviewQueue)?;
        Ok(self
            .repository
            .list_by_status(status.unwrap_or(ApplicationStatus::Pending))?)
    }

    /// Dashboard totals across every status.
    pub fn status_counts(
        &self,
        principal: &Principal,
    ) -> Result<StatusCounts, ApplicationServiceError> {
        self.guard.authorize(principal, Operation::ReviewQueue)?;
        Ok(self.repository.count_by_status()?)
    }

    /// Preferred retrieval: a direct link when storage offers one, the bytes otherwise.
    pub fn document_link(
        &self,
        principal: &Principal,
        id: ApplicationId,
        document_type: DocumentType,
    ) -> Result<DocumentView, ApplicationServiceError> {
        let document = self.authorized_document(principal, Operation::View, id, document_type)?;
        match self
            .storage
            .preview_link(&document.blob)
            .map_err(ApplicationServiceError::storage)?
        {
            Some(url) => Ok(DocumentView::Link { url }),
            None => self.content(&document).map(DocumentView::Content),
        }
    }

    pub fn download(
        &self,
        principal: &Principal,
        id: ApplicationId,
        document_type: DocumentType,
    ) -> Result<DocumentContent, ApplicationServiceError> {
        let document =
            self.authorized_document(principal, Operation::Download, id, document_type)?;
        self.content(&document)
    }

    fn authorized_document(
        &self,
        principal: &Principal,
        operation: Operation,
        id: ApplicationId,
        document_type: DocumentType,
    ) -> Result<Document, ApplicationServiceError> {
        self.guard.authorize(principal, operation)?;
        let record = self.fetch(&id)?;
        self.guard
            .authorize_on(principal, operation, &record.application)?;
        record
            .document(document_type)
            .cloned()
            .ok_or(ApplicationServiceError::DocumentNotFound(document_type))
    }

    fn content(&self, document: &Document) -> Result<DocumentContent, ApplicationServiceError> {
        let bytes = self
            .storage
            .get(&document.blob)
            .map_err(ApplicationServiceError::storage)?;
        Ok(DocumentContent {
            filename: document.filename.clone(),
            mime_type: document.mime_type.clone(),
            bytes,
        })
    }

    pub fn notifications(
        &self,
        principal: &Principal,
    ) -> Result<NotificationFeed, ApplicationServiceError> {
        let notifications = self.repository.notifications_for(&principal.user_id)?;
        let unread = notifications
            .iter()
            .filter(|notification| !notification.read)
            .count();
        Ok(NotificationFeed {
            unread,
            notifications,
        })
    }

    pub fn mark_notifications_read(
        &self,
        principal: &Principal,
    ) -> Result<usize, ApplicationServiceError> {
        Ok(self
            .repository
            .mark_notifications_read(&principal.user_id)?)
    }
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AccessDenied),
    #[error("cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("document storage unavailable: {source}")]
    StorageUnavailable {
        #[source]
        source: StorageError,
        /// Draft holding the validated form, when one could be kept for a retry.
        retry_draft: Option<DraftId>,
    },
    #[error("document storage rejected the request: {0}")]
    StorageFailed(#[source] StorageError),
    #[error("stored document {0} is missing")]
    BlobMissing(BlobId),
    #[error("application not found")]
    NotFound,
    #[error("no {0} document on this application")]
    DocumentNotFound(DocumentType),
    #[error("draft not found")]
    DraftNotFound,
    #[error("draft has expired; start the application again")]
    DraftExpired,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ApplicationServiceError {
    /// Only outages are worth retrying; a missing blob or a refused request is not.
    fn storage(source: StorageError) -> Self {
        match source {
            StorageError::NotFound(blob) => Self::BlobMissing(blob),
            StorageError::Backend(_) => Self::StorageFailed(source),
            StorageError::Unavailable(_) => Self::StorageUnavailable {
                source,
                retry_draft: None,
            },
        }
    }
}

impl From<InvalidTransition> for ApplicationServiceError {
    fn from(value: InvalidTransition) -> Self {
        Self::InvalidTransition {
            from: value.from,
            to: value.to,
        }
    }
}
