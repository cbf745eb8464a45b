use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::BlobId;
use crate::workflows::accounts::UserId;

/// Identifier wrapper for stored applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

impl ApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Human-readable number quoted by citizens, e.g. `PASSPORT-1a2b3c4d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationNumber(pub String);

impl ApplicationNumber {
    /// Upper-cased kind prefix plus the first eight hex digits of a random UUID.
    /// Uniqueness is enforced by the store, not here.
    pub fn generate(kind: DocumentKind) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        let suffix: String = random.chars().take(8).collect();
        Self(format!("{}-{suffix}", kind.number_prefix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub Uuid);

/// The identity document a citizen is applying for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Passport,
    PanCard,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::Passport => "passport",
            DocumentKind::PanCard => "pan_card",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw {
            "passport" => Some(Self::Passport),
            "pan_card" => Some(Self::PanCard),
            _ => None,
        }
    }

    pub const fn number_prefix(self) -> &'static str {
        match self {
            DocumentKind::Passport => "PASSPORT",
            DocumentKind::PanCard => "PAN_CARD",
        }
    }

    pub const fn form_title(self) -> &'static str {
        match self {
            DocumentKind::Passport => "PASSPORT APPLICATION FORM",
            DocumentKind::PanCard => "PAN CARD APPLICATION FORM",
        }
    }

    /// Supporting files a citizen must upload for this kind.
    pub const fn required_uploads(self) -> &'static [DocumentType] {
        match self {
            DocumentKind::Passport => &[
                DocumentType::IdProof,
                DocumentType::Photo,
                DocumentType::AddressProof,
                DocumentType::DobProof,
            ],
            DocumentKind::PanCard => &[
                DocumentType::IdProof,
                DocumentType::Photo,
                DocumentType::AddressProof,
                DocumentType::Signature,
            ],
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tag carried by every stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdProof,
    Photo,
    AddressProof,
    DobProof,
    Signature,
    ApplicationForm,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::IdProof,
        DocumentType::Photo,
        DocumentType::AddressProof,
        DocumentType::DobProof,
        DocumentType::Signature,
        DocumentType::ApplicationForm,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::IdProof => "id_proof",
            DocumentType::Photo => "photo",
            DocumentType::AddressProof => "address_proof",
            DocumentType::DobProof => "dob_proof",
            DocumentType::Signature => "signature",
            DocumentType::ApplicationForm => "application_form",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|document_type| document_type.label() == normalized)
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            DocumentType::IdProof => "ID Proof",
            DocumentType::Photo => "Photo",
            DocumentType::AddressProof => "Address Proof",
            DocumentType::DobProof => "Proof of Date of Birth",
            DocumentType::Signature => "Signature",
            DocumentType::ApplicationForm => "Application Form",
        }
    }

    /// Photos and signatures must be images; everything else may also be a PDF.
    pub const fn images_only(self) -> bool {
        matches!(self, DocumentType::Photo | DocumentType::Signature)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::Pending,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Wording used in notifications and mail.
    pub const fn describe(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "pending" => Some(Self::Pending),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Country {
    India,
    Usa,
    Uk,
    Canada,
    Australia,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Parent,
    Spouse,
    Sibling,
    Child,
    Friend,
    Relative,
}

/// One postal address block as entered on the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBlock {
    pub address: String,
    pub state: String,
    pub pincode: String,
    pub country: Country,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportDetails {
    pub next_of_kin: String,
    pub next_of_kin_relation: Relation,
    pub next_of_kin_phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanCardDetails {
    pub father_name: String,
    pub aadhaar_number: String,
}

/// Raw personal details submitted by a citizen, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantForm {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub permanent_address: AddressBlock,
    #[serde(default)]
    pub same_as_permanent: bool,
    #[serde(default)]
    pub current_address: Option<AddressBlock>,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub passport: Option<PassportDetails>,
    #[serde(default)]
    pub pan_card: Option<PanCardDetails>,
}

/// Kind-specific section of validated details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindDetails {
    Passport(PassportDetails),
    PanCard(PanCardDetails),
}

/// Validated, trimmed applicant details stored with the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub permanent_address: AddressBlock,
    pub current_address: AddressBlock,
    pub phone: String,
    pub email: String,
    pub details: KindDetails,
}

/// One file posted alongside a submission, keyed by its form field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Core application row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub number: ApplicationNumber,
    pub owner: UserId,
    pub kind: DocumentKind,
    pub status: ApplicationStatus,
    pub applicant: ApplicantDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Uploaded or generated file reference. Bytes live in the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub application_id: ApplicationId,
    pub document_type: DocumentType,
    pub blob: BlobId,
    pub filename: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Append-only audit entry for one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub comment: Option<String>,
    pub updated_by: UserId,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// First phase of a two-step submission: validated details awaiting their files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftApplication {
    pub id: DraftId,
    pub owner: UserId,
    pub kind: DocumentKind,
    pub applicant: ApplicantDetails,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DraftApplication {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
