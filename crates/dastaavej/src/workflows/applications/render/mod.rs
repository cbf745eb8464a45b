//! Generated "application form" summary document.

mod photo;
mod pdf;

use chrono::NaiveDate;

use super::domain::{ApplicantDetails, ApplicationNumber, DocumentKind};

pub use pdf::PdfFormRenderer;

pub const APPLICATION_FORM_MIME: &str = "application/pdf";

/// Inputs for one rendered form.
#[derive(Debug, Clone, Copy)]
pub struct FormContent<'a> {
    pub kind: DocumentKind,
    pub number: &'a ApplicationNumber,
    pub applicant: &'a ApplicantDetails,
    /// Raw bytes of the uploaded photo, embedded when they decode as JPEG or PNG.
    pub photo: Option<&'a [u8]>,
    pub application_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("form content does not fit on one page")]
    Overflow,
    #[error("form rendering failed: {0}")]
    Layout(String),
}

pub trait FormRenderer: Send + Sync {
    fn render(&self, content: &FormContent<'_>) -> Result<Vec<u8>, RenderError>;
}
