use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::notify::{MailMessage, Notifier, NotifyError};
use crate::storage::{BlobId, MemoryStorage, StorageError, StorageGateway};
use crate::store::MemoryStore;
use crate::workflows::accounts::{
    AccountServiceError, Authenticator, Principal, Role, User, UserId, UserRepository,
};
use crate::workflows::applications::{
    AddressBlock, ApplicantForm, ApplicationService, ApplicationSettings, Country, Gender,
    PanCardDetails, PassportDetails, Relation, UploadedFile,
};

pub(super) const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
pub(super) const PDF_BYTES: &[u8] = b"%PDF-1.4\n% scanned document\n%%EOF\n";

/// Citizen photo with a transparent background, as phones often export it.
pub(super) fn transparent_png() -> Vec<u8> {
    let photo = image::RgbaImage::from_fn(6, 8, |x, _| {
        if x % 2 == 0 {
            image::Rgba([0, 0, 0, 0])
        } else {
            image::Rgba([90, 60, 30, 255])
        }
    });
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(photo)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encodes");
    bytes.into_inner()
}

pub(super) fn contains_bytes(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_bytes())
}

/// Text of roughly `length` characters made of ordinary words.
pub(super) fn words(length: usize) -> String {
    let mut text = "Residency Road ".repeat(length / 15 + 1);
    text.truncate(length);
    text.trim_end().to_string()
}

pub(super) type TestService = ApplicationService<MemoryStore, MemoryStorage, MemoryNotifier>;

pub(super) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(super) fn address() -> AddressBlock {
    AddressBlock {
        address: "12 Residency Road, Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        pincode: "560025".to_string(),
        country: Country::India,
    }
}

pub(super) fn passport_form() -> ApplicantForm {
    ApplicantForm {
        full_name: "Asha Verma".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).expect("valid date"),
        gender: Gender::Female,
        permanent_address: address(),
        same_as_permanent: true,
        current_address: None,
        phone: "9876543210".to_string(),
        email: "asha@example.org".to_string(),
        passport: Some(PassportDetails {
            next_of_kin: "Ravi Verma".to_string(),
            next_of_kin_relation: Relation::Sibling,
            next_of_kin_phone: "9123456780".to_string(),
        }),
        pan_card: None,
    }
}

pub(super) fn pan_card_form() -> ApplicantForm {
    ApplicantForm {
        full_name: "Kiran Rao".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1985, 11, 3).expect("valid date"),
        gender: Gender::Male,
        permanent_address: address(),
        same_as_permanent: true,
        current_address: None,
        phone: "9988776655".to_string(),
        email: "kiran@example.org".to_string(),
        passport: None,
        pan_card: Some(PanCardDetails {
            father_name: "Mohan Rao".to_string(),
            aadhaar_number: "123456789012".to_string(),
        }),
    }
}

pub(super) fn upload(field: &str, filename: &str, bytes: &[u8]) -> UploadedFile {
    UploadedFile {
        field: field.to_string(),
        filename: filename.to_string(),
        bytes: bytes.to_vec(),
    }
}

pub(super) fn passport_files() -> Vec<UploadedFile> {
    vec![
        upload("id_proof", "aadhaar.pdf", PDF_BYTES),
        upload("photo", "photo.jpg", JPEG_BYTES),
        upload("address_proof", "electricity bill.pdf", PDF_BYTES),
        upload("dob_proof", "birth-certificate.png", JPEG_BYTES),
    ]
}

pub(super) fn pan_card_files() -> Vec<UploadedFile> {
    vec![
        upload("id_proof", "voter-id.pdf", PDF_BYTES),
        upload("photo", "photo.jpeg", JPEG_BYTES),
        upload("address_proof", "rent-agreement.pdf", PDF_BYTES),
        upload("signature", "signature.png", JPEG_BYTES),
    ]
}

fn user(username: &str, role: Role, verified: bool) -> User {
    User {
        id: UserId::new(),
        username: username.to_string(),
        email: format!("{}@example.org", username.to_lowercase()),
        password_hash: "not-a-real-hash".to_string(),
        role,
        government_id: (role == Role::Agency).then(|| "GOV-7781".to_string()),
        verified,
        created_at: Utc::now(),
    }
}

pub(super) fn add_user(store: &MemoryStore, username: &str, role: Role, verified: bool) -> User {
    let user = user(username, role, verified);
    store
        .insert_user(user.clone(), None)
        .expect("user is stored");
    user
}

pub(super) fn citizen(store: &MemoryStore, username: &str) -> Principal {
    add_user(store, username, Role::Citizen, true).principal()
}

pub(super) fn officer(store: &MemoryStore) -> Principal {
    add_user(store, "Officer01", Role::Agency, true).principal()
}

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryStore>,
    Arc<MemoryStorage>,
    Arc<MemoryNotifier>,
) {
    build_service_with(MemoryStorage::new(), ApplicationSettings::default())
}

pub(super) fn build_service_with(
    storage: MemoryStorage,
    settings: ApplicationSettings,
) -> (
    TestService,
    Arc<MemoryStore>,
    Arc<MemoryStorage>,
    Arc<MemoryNotifier>,
) {
    let store = Arc::new(MemoryStore::new());
    let storage = Arc::new(storage);
    let notifier = Arc::new(MemoryNotifier::default());
    let service = ApplicationService::new(
        Arc::clone(&store),
        Arc::clone(&storage),
        Arc::clone(&notifier),
        settings,
    );
    (service, store, storage, notifier)
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub(super) fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, message: MailMessage) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport("smtp relay offline".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(message);
        Ok(())
    }
}

/// Storage that fails exactly one `put`, the n-th one (1-based), then recovers.
#[derive(Debug, Default)]
pub(super) struct FlakyStorage {
    pub(super) inner: MemoryStorage,
    fail_on: Mutex<Option<usize>>,
    puts: Mutex<usize>,
}

impl FlakyStorage {
    pub(super) fn failing_on(put: usize) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_on: Mutex::new(Some(put)),
            puts: Mutex::new(0),
        }
    }
}

impl StorageGateway for FlakyStorage {
    fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<BlobId, StorageError> {
        let mut puts = self.puts.lock().expect("storage mutex poisoned");
        *puts += 1;
        let mut fail_on = self.fail_on.lock().expect("storage mutex poisoned");
        if *fail_on == Some(*puts) {
            *fail_on = None;
            return Err(StorageError::Unavailable("drive quota exceeded".to_string()));
        }
        self.inner.put(bytes, name, mime_type)
    }

    fn get(&self, blob: &BlobId) -> Result<Vec<u8>, StorageError> {
        self.inner.get(blob)
    }

    fn preview_link(&self, blob: &BlobId) -> Result<Option<String>, StorageError> {
        self.inner.preview_link(blob)
    }

    fn discard(&self, blob: &BlobId) -> Result<(), StorageError> {
        self.inner.discard(blob)
    }
}

/// Fixed token table standing in for the account service.
#[derive(Default)]
pub(super) struct TokenTable {
    tokens: HashMap<String, Principal>,
}

impl TokenTable {
    pub(super) fn with(mut self, token: &str, principal: Principal) -> Self {
        self.tokens.insert(token.to_string(), principal);
        self
    }
}

impl Authenticator for TokenTable {
    fn authenticate(&self, token: &str) -> Result<Principal, AccountServiceError> {
        self.tokens
            .get(token)
            .copied()
            .ok_or(AccountServiceError::Unauthenticated)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable");
    serde_json::from_slice(&bytes).expect("body is json")
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable")
        .to_vec()
}
