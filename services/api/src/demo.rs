use crate::infra::Portal;
use chrono::NaiveDate;
use clap::Args;
use dastaavej::config::PortalConfig;
use dastaavej::error::AppError;
use dastaavej::notify::{MailMessage, Notifier, NotifyError};
use dastaavej::storage::MemoryStorage;
use dastaavej::store::MemoryStore;
use dastaavej::workflows::accounts::{
    AccountService, AccountStore, Authenticator, Principal, Registration, Role,
};
use dastaavej::workflows::applications::{
    AddressBlock, ApplicantForm, ApplicationRecord, ApplicationStatus, Country, DocumentKind,
    DocumentType, DocumentView, Gender, Notification, PanCardDetails, PassportDetails, Relation,
    UploadedFile,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const DEMO_PASSWORD: &str = "Secure#Pass1";
const SAMPLE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
const SAMPLE_PDF: &[u8] = b"%PDF-1.4\n% scanned supporting document\n%%EOF\n";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Document to apply for: passport or pan_card
    #[arg(long, default_value = "passport", value_parser = parse_kind)]
    pub(crate) kind: DocumentKind,
    /// Reject the application instead of approving it
    #[arg(long)]
    pub(crate) reject: bool,
    /// Write the generated application form PDF to this path
    #[arg(long)]
    pub(crate) form_pdf: Option<PathBuf>,
}

fn parse_kind(raw: &str) -> Result<DocumentKind, String> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "passport" => Ok(DocumentKind::Passport),
        "pan_card" | "pan" => Ok(DocumentKind::PanCard),
        other => Err(format!("unknown document kind '{other}' (passport, pan_card)")),
    }
}

/// Collects mail so the demo can print what would have been delivered.
#[derive(Default)]
struct DemoOutbox {
    sent: Mutex<Vec<MailMessage>>,
}

impl DemoOutbox {
    fn messages(&self) -> Vec<MailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for DemoOutbox {
    fn send(&self, message: MailMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("demo outbox poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}

struct DemoSummary {
    record: ApplicationRecord,
    preview: DocumentView,
    form_pdf: Vec<u8>,
    notifications: Vec<Notification>,
    unread: usize,
    mail: Vec<MailMessage>,
    stored_blobs: usize,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        kind,
        reject,
        form_pdf,
    } = args;
    let decision = if reject {
        ApplicationStatus::Rejected
    } else {
        ApplicationStatus::Approved
    };

    println!("Dastaavej portal demo ({kind})");
    let summary = walkthrough(kind, decision)?;
    render_summary(&summary);

    if let Some(path) = form_pdf {
        std::fs::write(&path, &summary.form_pdf)?;
        println!("\nApplication form written to {}", path.display());
    }
    Ok(())
}

fn demo_config() -> PortalConfig {
    PortalConfig {
        data_path: None,
        max_upload_bytes: 16 * 1024 * 1024,
        draft_ttl_minutes: 60,
        verification_ttl_hours: 72,
        session_ttl_hours: 24,
        admin_email: "admin@dastaavej.local".to_string(),
        public_url: "http://127.0.0.1:3000".to_string(),
    }
}

fn walkthrough(kind: DocumentKind, decision: ApplicationStatus) -> Result<DemoSummary, AppError> {
    let storage = Arc::new(MemoryStorage::with_preview_base("https://files.dastaavej.local"));
    let outbox = Arc::new(DemoOutbox::default());
    let portal = Portal::assemble(
        &demo_config(),
        Arc::new(MemoryStore::new()),
        Arc::clone(&storage),
        Arc::clone(&outbox),
    );
    let accounts = &portal.accounts;
    let applications = &portal.applications;

    accounts.register(registration("AshaVerma1", Role::Citizen, None))?;
    let agency = accounts.register(registration(
        "Officer01",
        Role::Agency,
        Some("GOV-2231".to_string()),
    ))?;
    if let Some(token) = agency.verification_token.as_deref() {
        accounts.verify_agency(token)?;
    }

    let citizen = signed_in(accounts, "AshaVerma1")?;
    let officer = signed_in(accounts, "Officer01")?;

    let draft = applications.start_draft(&citizen, kind, sample_form(kind))?;
    let submitted = applications.submit_draft(&citizen, draft.id, sample_files(kind))?;
    let id = submitted.application.id;

    let queue = applications.review_queue(&officer, None)?;
    println!(
        "- {} pending application(s) in the agency queue",
        queue.len()
    );

    applications.transition(&officer, id, ApplicationStatus::UnderReview, None)?;
    let comment = match decision {
        ApplicationStatus::Rejected => "Address proof is illegible; please resubmit",
        _ => "Documents verified",
    };
    let record = applications.transition(&officer, id, decision, Some(comment.to_string()))?;

    let preview = applications.document_link(&citizen, id, DocumentType::Photo)?;
    let form_pdf = applications
        .download(&citizen, id, DocumentType::ApplicationForm)?
        .bytes;
    let feed = applications.notifications(&citizen)?;

    Ok(DemoSummary {
        record,
        preview,
        form_pdf,
        notifications: feed.notifications,
        unread: feed.unread,
        mail: outbox.messages(),
        stored_blobs: storage.len(),
    })
}

fn signed_in<R, N>(accounts: &AccountService<R, N>, username: &str) -> Result<Principal, AppError>
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    let session = accounts.login(username, DEMO_PASSWORD)?;
    Ok(accounts.authenticate(&session.token)?)
}

fn registration(username: &str, role: Role, government_id: Option<String>) -> Registration {
    Registration {
        username: username.to_string(),
        email: format!("{}@example.org", username.to_lowercase()),
        password: DEMO_PASSWORD.to_string(),
        confirm_password: DEMO_PASSWORD.to_string(),
        role,
        government_id,
    }
}

fn sample_form(kind: DocumentKind) -> ApplicantForm {
    let (passport, pan_card) = match kind {
        DocumentKind::Passport => (
            Some(PassportDetails {
                next_of_kin: "Ravi Verma".to_string(),
                next_of_kin_relation: Relation::Sibling,
                next_of_kin_phone: "9123456780".to_string(),
            }),
            None,
        ),
        DocumentKind::PanCard => (
            None,
            Some(PanCardDetails {
                father_name: "Mohan Verma".to_string(),
                aadhaar_number: "123456789012".to_string(),
            }),
        ),
    };

    ApplicantForm {
        full_name: "Asha Verma".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap_or_default(),
        gender: Gender::Female,
        permanent_address: AddressBlock {
            address: "12 Residency Road, Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560025".to_string(),
            country: Country::India,
        },
        same_as_permanent: true,
        current_address: None,
        phone: "9876543210".to_string(),
        email: "asha@example.org".to_string(),
        passport,
        pan_card,
    }
}

fn sample_files(kind: DocumentKind) -> Vec<UploadedFile> {
    kind.required_uploads()
        .iter()
        .map(|document_type| {
            let (filename, bytes) = if document_type.images_only() {
                (format!("{}.jpg", document_type.label()), SAMPLE_JPEG)
            } else {
                (format!("{}.pdf", document_type.label()), SAMPLE_PDF)
            };
            UploadedFile {
                field: document_type.label().to_string(),
                filename,
                bytes: bytes.to_vec(),
            }
        })
        .collect()
}

fn render_summary(summary: &DemoSummary) {
    let application = &summary.record.application;
    println!(
        "\nApplication {} for {} is {}",
        application.number, application.applicant.full_name, application.status
    );

    println!("Documents ({} blobs in storage):", summary.stored_blobs);
    for document in &summary.record.documents {
        println!(
            "  - {}: {} ({})",
            document.document_type.display_name(),
            document.filename,
            document.mime_type
        );
    }

    println!("History:");
    for update in &summary.record.history {
        println!(
            "  - {} at {}{}",
            update.status.describe(),
            update.updated_at.format("%Y-%m-%d %H:%M:%S"),
            update
                .comment
                .as_deref()
                .map(|comment| format!(" ({comment})"))
                .unwrap_or_default()
        );
    }

    match &summary.preview {
        DocumentView::Link { url } => println!("Photo preview: {url}"),
        DocumentView::Content(content) => println!(
            "Photo preview served inline ({} bytes)",
            content.bytes.len()
        ),
    }
    println!("Generated form: {} bytes of PDF", summary.form_pdf.len());

    println!("Notifications ({} unread):", summary.unread);
    for notification in &summary.notifications {
        println!("  - {}: {}", notification.title, notification.message);
    }

    println!("Mail sent:");
    for message in &summary.mail {
        println!("  - to {}: {}", message.recipient, message.subject);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passport_walkthrough_ends_approved() {
        let summary =
            walkthrough(DocumentKind::Passport, ApplicationStatus::Approved).expect("demo runs");

        assert_eq!(summary.record.application.status, ApplicationStatus::Approved);
        assert!(summary
            .record
            .application
            .number
            .as_str()
            .starts_with("PASSPORT-"));
        assert_eq!(summary.record.documents.len(), 5);
        assert_eq!(summary.stored_blobs, 5);
        let statuses: Vec<_> = summary
            .record
            .history
            .iter()
            .map(|update| update.status)
            .collect();
        assert_eq!(
            statuses,
            vec![ApplicationStatus::UnderReview, ApplicationStatus::Approved]
        );
        assert!(summary.form_pdf.starts_with(b"%PDF"));
        assert!(matches!(summary.preview, DocumentView::Link { .. }));
        assert_eq!(summary.unread, 2);
    }

    #[test]
    fn pan_card_walkthrough_can_end_rejected() {
        let summary =
            walkthrough(DocumentKind::PanCard, ApplicationStatus::Rejected).expect("demo runs");

        assert_eq!(summary.record.application.status, ApplicationStatus::Rejected);
        assert!(summary
            .record
            .documents
            .iter()
            .any(|document| document.document_type == DocumentType::Signature));
        assert!(summary
            .mail
            .iter()
            .any(|message| message.recipient == "admin@dastaavej.local"));
    }

    #[test]
    fn kind_parser_accepts_common_spellings() {
        assert_eq!(parse_kind("Passport"), Ok(DocumentKind::Passport));
        assert_eq!(parse_kind("pan-card"), Ok(DocumentKind::PanCard));
        assert!(parse_kind("driving_licence").is_err());
    }
}
