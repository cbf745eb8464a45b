//! Applicant form and upload validation.
//!
//! Everything here runs before any storage call or store write.

use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};

use super::domain::{
    AddressBlock, ApplicantDetails, ApplicantForm, DocumentKind, DocumentType, KindDetails,
    PanCardDetails, PassportDetails, UploadedFile,
};

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const MAX_AGE_YEARS: i32 = 120;
/// Longest address a mail transport accepts.
pub const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid form: {}", join_fields(.0))]
    Fields(Vec<FieldError>),
    #[error("file '{filename}' for {field} has an unsupported extension (allowed: pdf, jpg, jpeg, png)")]
    Extension { field: String, filename: String },
    #[error("{0} must be an image (jpg, jpeg, png)")]
    ImageRequired(DocumentType),
    #[error("file for {document_type} is {size} bytes; the limit is {limit}")]
    TooLarge {
        document_type: DocumentType,
        size: usize,
        limit: usize,
    },
    #[error("file for {0} is empty")]
    EmptyUpload(DocumentType),
    #[error("missing required upload: {0}")]
    MissingUpload(DocumentType),
    #[error("{0} is not required for this application")]
    UnexpectedUpload(DocumentType),
    #[error("unknown upload field '{0}'")]
    UnknownUpload(String),
    #[error("more than one file for {0}")]
    DuplicateUpload(DocumentType),
    #[error("the application form is generated by the portal and cannot be uploaded")]
    GeneratedDocument,
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks an [`ApplicantForm`] for the given document kind, collecting every problem.
#[derive(Debug, Clone, Copy)]
pub struct FormValidator {
    today: NaiveDate,
}

impl FormValidator {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn validate(
        &self,
        kind: DocumentKind,
        form: ApplicantForm,
    ) -> Result<ApplicantDetails, ValidationError> {
        let mut errors = Vec::new();

        let full_name = form.full_name.trim().to_string();
        check_length(&mut errors, "full_name", &full_name, 3, 100);
        self.check_birth_date(&mut errors, form.date_of_birth);

        let permanent_address = normalize_address(form.permanent_address);
        check_address(&mut errors, "permanent", &permanent_address);

        let current_address = if form.same_as_permanent {
            permanent_address.clone()
        } else {
            match form.current_address {
                Some(address) => {
                    let address = normalize_address(address);
                    check_address(&mut errors, "current", &address);
                    address
                }
                None => {
                    errors.push(FieldError::new(
                        "current_address",
                        "required unless same_as_permanent is set",
                    ));
                    permanent_address.clone()
                }
            }
        };

        let phone = form.phone.trim().to_string();
        check_digits(&mut errors, "phone", &phone, 10);
        let email = form.email.trim().to_string();
        if !looks_like_email(&email) {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }

        let details = match kind {
            DocumentKind::Passport => {
                self.passport_details(&mut errors, form.passport, &phone)
            }
            DocumentKind::PanCard => self.pan_card_details(&mut errors, form.pan_card),
        };

        match details {
            Some(details) if errors.is_empty() => Ok(ApplicantDetails {
                full_name,
                date_of_birth: form.date_of_birth,
                gender: form.gender,
                permanent_address,
                current_address,
                phone,
                email,
                details,
            }),
            _ => Err(ValidationError::Fields(errors)),
        }
    }

    fn check_birth_date(&self, errors: &mut Vec<FieldError>, date_of_birth: NaiveDate) {
        if date_of_birth > self.today {
            errors.push(FieldError::new(
                "date_of_birth",
                "cannot be in the future",
            ));
            return;
        }

        let mut age = self.today.year() - date_of_birth.year();
        if (self.today.month(), self.today.day()) < (date_of_birth.month(), date_of_birth.day())
        {
            age -= 1;
        }
        if age > MAX_AGE_YEARS {
            errors.push(FieldError::new(
                "date_of_birth",
                format!("age cannot exceed {MAX_AGE_YEARS} years"),
            ));
        }
    }

    fn passport_details(
        &self,
        errors: &mut Vec<FieldError>,
        details: Option<PassportDetails>,
        applicant_phone: &str,
    ) -> Option<KindDetails> {
        let Some(details) = details else {
            errors.push(FieldError::new("passport", "passport details are required"));
            return None;
        };

        let next_of_kin = details.next_of_kin.trim().to_string();
        check_length(errors, "next_of_kin", &next_of_kin, 3, 100);
        let next_of_kin_phone = details.next_of_kin_phone.trim().to_string();
        check_digits(errors, "next_of_kin_phone", &next_of_kin_phone, 10);
        if next_of_kin_phone == applicant_phone {
            errors.push(FieldError::new(
                "next_of_kin_phone",
                "must differ from the applicant's phone number",
            ));
        }

        Some(KindDetails::Passport(PassportDetails {
            next_of_kin,
            next_of_kin_relation: details.next_of_kin_relation,
            next_of_kin_phone,
        }))
    }

    fn pan_card_details(
        &self,
        errors: &mut Vec<FieldError>,
        details: Option<PanCardDetails>,
    ) -> Option<KindDetails> {
        let Some(details) = details else {
            errors.push(FieldError::new("pan_card", "PAN card details are required"));
            return None;
        };

        let father_name = details.father_name.trim().to_string();
        check_length(errors, "father_name", &father_name, 3, 100);
        let aadhaar_number = details.aadhaar_number.trim().to_string();
        check_digits(errors, "aadhaar_number", &aadhaar_number, 12);

        Some(KindDetails::PanCard(PanCardDetails {
            father_name,
            aadhaar_number,
        }))
    }
}

fn normalize_address(address: AddressBlock) -> AddressBlock {
    AddressBlock {
        address: address.address.trim().to_string(),
        state: address.state.trim().to_string(),
        pincode: address.pincode.trim().to_string(),
        country: address.country,
    }
}

fn check_address(errors: &mut Vec<FieldError>, prefix: &str, address: &AddressBlock) {
    check_length(
        errors,
        &format!("{prefix}_address"),
        &address.address,
        10,
        500,
    );

    let state_len = address.state.chars().count();
    if !(2..=50).contains(&state_len)
        || !address
            .state
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ')
    {
        errors.push(FieldError::new(
            format!("{prefix}_state"),
            "must be 2-50 letters or spaces",
        ));
    }

    check_digits(errors, &format!("{prefix}_pincode"), &address.pincode, 6);
}

fn check_length(errors: &mut Vec<FieldError>, field: &str, value: &str, min: usize, max: usize) {
    let length = value.chars().count();
    if length < min || length > max {
        errors.push(FieldError::new(
            field,
            format!("must be between {min} and {max} characters"),
        ));
    }
}

fn check_digits(errors: &mut Vec<FieldError>, field: &str, value: &str, digits: usize) {
    if value.len() != digits || !value.chars().all(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(
            field,
            format!("must be exactly {digits} digits"),
        ));
    }
}

pub(crate) fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    value.chars().count() <= MAX_EMAIL_LENGTH
        && !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

/// An upload that passed every check, ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub document_type: DocumentType,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Upload rules: extension allow-list, image-only slots, size cap, and the required set
/// for each document kind.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validates the full upload set, returning it ordered as the kind lists its
    /// required documents.
    pub fn check(
        &self,
        kind: DocumentKind,
        files: Vec<UploadedFile>,
    ) -> Result<Vec<ValidatedUpload>, ValidationError> {
        let required = kind.required_uploads();
        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(files.len());

        for file in files {
            let document_type = DocumentType::from_label(&file.field)
                .ok_or_else(|| ValidationError::UnknownUpload(file.field.clone()))?;
            if document_type == DocumentType::ApplicationForm {
                return Err(ValidationError::GeneratedDocument);
            }
            if !required.contains(&document_type) {
                return Err(ValidationError::UnexpectedUpload(document_type));
            }
            if !seen.insert(document_type) {
                return Err(ValidationError::DuplicateUpload(document_type));
            }
            accepted.push(self.check_file(document_type, file)?);
        }

        if let Some(missing) = required.iter().find(|slot| !seen.contains(*slot)) {
            return Err(ValidationError::MissingUpload(*missing));
        }

        accepted.sort_by_key(|upload| {
            required
                .iter()
                .position(|slot| *slot == upload.document_type)
        });
        Ok(accepted)
    }

    fn check_file(
        &self,
        document_type: DocumentType,
        file: UploadedFile,
    ) -> Result<ValidatedUpload, ValidationError> {
        let extension = extension_of(&file.filename).ok_or_else(|| ValidationError::Extension {
            field: file.field.clone(),
            filename: file.filename.clone(),
        })?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::Extension {
                field: file.field,
                filename: file.filename,
            });
        }
        if document_type.images_only() && !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ValidationError::ImageRequired(document_type));
        }
        if file.bytes.is_empty() {
            return Err(ValidationError::EmptyUpload(document_type));
        }
        if file.bytes.len() > self.max_bytes {
            return Err(ValidationError::TooLarge {
                document_type,
                size: file.bytes.len(),
                limit: self.max_bytes,
            });
        }

        let filename = sanitize_filename(&file.filename);
        let mime_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(ValidatedUpload {
            document_type,
            filename,
            mime_type,
            bytes: file.bytes,
        })
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, extension) = filename.rsplit_once('.')?;
    Some(extension.to_ascii_lowercase())
}

/// Reduce a client-supplied name to a safe ASCII file name.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
