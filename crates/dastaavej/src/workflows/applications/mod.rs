//! Identity-document applications: intake, review lifecycle, document retrieval, and
//! in-app notifications.

pub mod access;
pub mod domain;
pub mod lifecycle;
pub mod render;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use access::{Access, AccessDenied, AccessGuard, Operation};
pub use domain::{
    AddressBlock, ApplicantDetails, ApplicantForm, Application, ApplicationId, ApplicationNumber,
    ApplicationStatus, Country, Document, DocumentId, DocumentKind, DocumentType,
    DraftApplication, DraftId, Gender, KindDetails, Notification, NotificationId, PanCardDetails,
    PassportDetails, Relation, StatusUpdate, UploadedFile,
};
pub use lifecycle::{plan_transition, InvalidTransition};
pub use render::{FormRenderer, PdfFormRenderer, RenderError};
pub use repository::{
    ApplicationDetail, ApplicationRecord, ApplicationRepository, ApplicationStore,
    ApplicationSummary, DocumentSummary, DraftRepository, NewSubmission, StatusCounts,
    TransitionCommit,
};
pub use router::application_router;
pub use service::{
    ApplicationService, ApplicationServiceError, ApplicationSettings, DocumentContent,
    DocumentView, NotificationFeed,
};
pub use validation::{FieldError, UploadPolicy, ValidationError};
