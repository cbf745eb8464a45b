//! Behaviour every [`PortalStore`] must share, run against each implementation.

use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use super::{PortalStore, RepositoryError};
use crate::storage::BlobId;
use crate::workflows::accounts::{Role, Session, TokenRedemption, User, UserId, VerificationToken};
use crate::workflows::applications::{
    plan_transition, AddressBlock, ApplicantDetails, Application, ApplicationId,
    ApplicationNumber, ApplicationStatus, Country, Document, DocumentId, DocumentKind,
    DocumentType, DraftApplication, DraftId, Gender, KindDetails, NewSubmission,
    PassportDetails, Relation,
};

pub(super) fn user(username: &str, role: Role) -> User {
    User {
        id: UserId::new(),
        username: username.to_string(),
        email: format!("{}@example.org", username.to_lowercase()),
        password_hash: "hash".to_string(),
        role,
        government_id: None,
        verified: role == Role::Citizen,
        created_at: Utc::now(),
    }
}

fn details() -> ApplicantDetails {
    let address = AddressBlock {
        address: "12 Residency Road, Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        pincode: "560025".to_string(),
        country: Country::India,
    };
    ApplicantDetails {
        full_name: "Asha Verma".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).expect("valid date"),
        gender: Gender::Female,
        permanent_address: address.clone(),
        current_address: address,
        phone: "9876543210".to_string(),
        email: "asha@example.org".to_string(),
        details: KindDetails::Passport(PassportDetails {
            next_of_kin: "Ravi Verma".to_string(),
            next_of_kin_relation: Relation::Sibling,
            next_of_kin_phone: "9123456780".to_string(),
        }),
    }
}

pub(super) fn submission(owner: UserId, number: &str) -> NewSubmission {
    let now = Utc::now();
    let application = Application {
        id: ApplicationId::new(),
        number: ApplicationNumber(number.to_string()),
        owner,
        kind: DocumentKind::Passport,
        status: ApplicationStatus::Pending,
        applicant: details(),
        created_at: now,
        updated_at: now,
    };
    let documents = vec![
        Document {
            id: DocumentId(Uuid::new_v4()),
            application_id: application.id,
            document_type: DocumentType::Photo,
            blob: BlobId(format!("blob-photo-{number}")),
            filename: "photo.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            uploaded_at: now,
        },
        Document {
            id: DocumentId(Uuid::new_v4()),
            application_id: application.id,
            document_type: DocumentType::ApplicationForm,
            blob: BlobId(format!("blob-form-{number}")),
            filename: format!("{number}_application_form.pdf"),
            mime_type: "application/pdf".to_string(),
            uploaded_at: now,
        },
    ];
    NewSubmission {
        application,
        documents,
        consumed_draft: None,
    }
}

fn draft(owner: UserId, expires_in: Duration) -> DraftApplication {
    let now = Utc::now();
    DraftApplication {
        id: DraftId::new(),
        owner,
        kind: DocumentKind::Passport,
        applicant: details(),
        created_at: now,
        expires_at: now + expires_in,
    }
}

fn agency_token(user_id: UserId, token_hash: &str, issued_hours_ago: i64) -> VerificationToken {
    let issued = Utc::now() - Duration::hours(issued_hours_ago);
    VerificationToken {
        token_hash: token_hash.to_string(),
        user_id,
        issued_at: issued,
        expires_at: issued + Duration::hours(72),
        consumed: false,
    }
}

pub(super) fn duplicate_application_numbers_conflict<S: PortalStore>(store: &S) {
    let owner = UserId::new();
    store
        .insert_submission(submission(owner, "PASSPORT-00000001"))
        .expect("first insert succeeds");

    let second = store.insert_submission(submission(owner, "PASSPORT-00000001"));
    assert!(matches!(second, Err(RepositoryError::Conflict)));
    let differently_cased = store.insert_submission(submission(owner, "passport-00000001"));
    assert!(matches!(differently_cased, Err(RepositoryError::Conflict)));
    assert_eq!(store.list_for_owner(&owner).expect("list").len(), 1);
}

pub(super) fn commit_rechecks_status_at_commit_time<S: PortalStore>(store: &S) {
    let owner = UserId::new();
    let reviewer = UserId::new();
    let record = store
        .insert_submission(submission(owner, "PASSPORT-00000002"))
        .expect("insert succeeds");

    let approve = plan_transition(
        &record.application,
        ApplicationStatus::Approved,
        Some("verified".to_string()),
        reviewer,
        Utc::now(),
    )
    .expect("pending may be approved");
    let reject = plan_transition(
        &record.application,
        ApplicationStatus::Rejected,
        None,
        reviewer,
        Utc::now(),
    )
    .expect("pending may be rejected");

    let committed = store.commit_transition(approve).expect("first commit wins");
    assert_eq!(committed.application.status, ApplicationStatus::Approved);
    match store.commit_transition(reject) {
        Err(RepositoryError::StaleStatus { current }) => {
            assert_eq!(current, ApplicationStatus::Approved)
        }
        other => panic!("expected stale status, got {other:?}"),
    }

    let stored = store
        .fetch(&record.application.id)
        .expect("fetch")
        .expect("record exists");
    assert_eq!(stored.application.status, ApplicationStatus::Approved);
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].comment.as_deref(), Some("verified"));
    assert_eq!(store.notifications_for(&owner).expect("feed").len(), 1);
}

pub(super) fn missing_application_cannot_transition<S: PortalStore>(store: &S) {
    let record = submission(UserId::new(), "PASSPORT-0000000b");
    let plan = plan_transition(
        &record.application,
        ApplicationStatus::UnderReview,
        None,
        UserId::new(),
        Utc::now(),
    )
    .expect("pending may move under review");

    assert!(matches!(
        store.commit_transition(plan),
        Err(RepositoryError::NotFound)
    ));
    assert!(store
        .notifications_for(&record.application.owner)
        .expect("feed")
        .is_empty());
}

pub(super) fn submission_consumes_its_draft<S: PortalStore>(store: &S) {
    let owner = UserId::new();
    let draft = draft(owner, Duration::hours(1));
    store.insert_draft(draft.clone()).expect("draft stored");
    assert_eq!(
        store.fetch_draft(&draft.id).expect("fetch"),
        Some(draft.clone())
    );

    let mut promoted = submission(owner, "PASSPORT-00000003");
    promoted.consumed_draft = Some(draft.id);
    store.insert_submission(promoted).expect("promotion succeeds");

    assert!(store.fetch_draft(&draft.id).expect("fetch").is_none());

    let mut replay = submission(owner, "PASSPORT-00000004");
    replay.consumed_draft = Some(draft.id);
    assert!(matches!(
        store.insert_submission(replay),
        Err(RepositoryError::NotFound)
    ));
    assert_eq!(store.list_for_owner(&owner).expect("list").len(), 1);
}

pub(super) fn expired_drafts_are_purged<S: PortalStore>(store: &S) {
    let owner = UserId::new();
    let stale = draft(owner, Duration::hours(-1));
    let fresh = draft(owner, Duration::hours(1));
    store.insert_draft(stale.clone()).expect("stored");
    store.insert_draft(fresh.clone()).expect("stored");

    assert_eq!(store.purge_expired_drafts(Utc::now()).expect("purge"), 1);
    assert!(store.fetch_draft(&stale.id).expect("fetch").is_none());
    assert!(store.fetch_draft(&fresh.id).expect("fetch").is_some());
}

pub(super) fn usernames_and_emails_are_unique<S: PortalStore>(store: &S) {
    let first = user("CitizenOne1", Role::Citizen);
    store.insert_user(first.clone(), None).expect("first user");
    assert_eq!(
        store.user_by_username("CitizenOne1").expect("lookup"),
        Some(first)
    );

    let same_name = user("CitizenOne1", Role::Citizen);
    assert!(matches!(
        store.insert_user(same_name, None),
        Err(RepositoryError::Constraint(field)) if field == "username"
    ));

    let mut same_email = user("CitizenTwo2", Role::Citizen);
    same_email.email = "CITIZENONE1@example.org".to_string();
    assert!(matches!(
        store.insert_user(same_email, None),
        Err(RepositoryError::Constraint(field)) if field == "email"
    ));
}

pub(super) fn tokens_redeem_once<S: PortalStore>(store: &S) {
    let official = user("OfficerOne1", Role::Agency);
    store
        .insert_user(official.clone(), Some(agency_token(official.id, "digest-1", 0)))
        .expect("agency registered");

    let now = Utc::now();
    match store.redeem_token("digest-1", now).expect("redeem") {
        TokenRedemption::Redeemed(user) => assert!(user.verified),
        other => panic!("expected redemption, got {other:?}"),
    }
    assert_eq!(
        store.redeem_token("digest-1", now).expect("redeem"),
        TokenRedemption::AlreadyConsumed
    );
    assert_eq!(
        store.redeem_token("missing", now).expect("redeem"),
        TokenRedemption::Unknown
    );
    assert!(
        store
            .fetch_user(&official.id)
            .expect("fetch")
            .expect("exists")
            .verified
    );
}

pub(super) fn expired_tokens_are_refused<S: PortalStore>(store: &S) {
    let official = user("OfficerTwo2", Role::Agency);
    store
        .insert_user(official.clone(), Some(agency_token(official.id, "digest-2", 80)))
        .expect("agency registered");

    assert_eq!(
        store.redeem_token("digest-2", Utc::now()).expect("redeem"),
        TokenRedemption::Expired
    );
    assert!(
        !store
            .fetch_user(&official.id)
            .expect("fetch")
            .expect("exists")
            .verified
    );

    store.remove_user(&official.id).expect("user removed");
    assert!(store.fetch_user(&official.id).expect("fetch").is_none());
    assert_eq!(
        store.redeem_token("digest-2", Utc::now()).expect("redeem"),
        TokenRedemption::Unknown
    );
}

pub(super) fn expired_sessions_are_purged<S: PortalStore>(store: &S) {
    let citizen = user("CitizenThree3", Role::Citizen);
    store.insert_user(citizen.clone(), None).expect("user stored");
    let now = Utc::now();
    let session = |token_hash: &str, expires_at| Session {
        token_hash: token_hash.to_string(),
        user_id: citizen.id,
        created_at: now - Duration::hours(30),
        expires_at,
    };
    store
        .insert_session(session("stale", now - Duration::hours(6)))
        .expect("stored");
    store
        .insert_session(session("live", now + Duration::hours(6)))
        .expect("stored");
    assert!(matches!(
        store.insert_session(session("live", now + Duration::hours(1))),
        Err(RepositoryError::Conflict)
    ));

    assert_eq!(store.purge_expired_sessions(now).expect("purge"), 1);
    assert!(store.fetch_session("stale").expect("fetch").is_none());
    assert_eq!(
        store.fetch_session("live").expect("fetch"),
        Some(session("live", now + Duration::hours(6)))
    );

    assert!(store.remove_session("live").expect("logout"));
    assert!(!store.remove_session("live").expect("second logout"));
}

pub(super) fn statuses_are_counted<S: PortalStore>(store: &S) {
    let owner = UserId::new();
    let reviewer = UserId::new();
    let mut records = Vec::new();
    for serial in 0..4 {
        records.push(
            store
                .insert_submission(submission(owner, &format!("PASSPORT-1000000{serial}")))
                .expect("insert succeeds"),
        );
    }
    for (record, status) in records
        .iter()
        .zip([ApplicationStatus::UnderReview, ApplicationStatus::Approved])
    {
        let plan = plan_transition(&record.application, status, None, reviewer, Utc::now())
            .expect("pending may move on");
        store.commit_transition(plan).expect("commit");
    }

    let counts = store.count_by_status().expect("counts");
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.under_review, 1);
    assert_eq!(counts.approved, 1);
    assert_eq!(counts.rejected, 0);
    assert_eq!(counts.total, 4);
    assert_eq!(
        store
            .list_by_status(ApplicationStatus::Pending)
            .expect("queue")
            .len(),
        2
    );
}

pub(super) fn records_keep_documents_history_and_feed_order<S: PortalStore>(store: &S) {
    let owner = UserId::new();
    let reviewer = UserId::new();
    let original = submission(owner, "PASSPORT-0000000c");
    let record = store
        .insert_submission(original.clone())
        .expect("insert succeeds");
    assert_eq!(record.application, original.application);
    assert_eq!(record.documents.len(), 2);

    let review = plan_transition(
        &record.application,
        ApplicationStatus::UnderReview,
        None,
        reviewer,
        Utc::now(),
    )
    .expect("pending may move under review");
    let reviewed = store.commit_transition(review).expect("review commit");
    let approve = plan_transition(
        &reviewed.application,
        ApplicationStatus::Approved,
        Some("documents verified".to_string()),
        reviewer,
        Utc::now() + Duration::seconds(1),
    )
    .expect("under review may be approved");
    store.commit_transition(approve).expect("approve commit");

    let stored = store
        .fetch_by_number(&ApplicationNumber("passport-0000000C".to_string()))
        .expect("fetch")
        .expect("lookup ignores case");
    assert_eq!(stored.application.applicant, original.application.applicant);
    assert_eq!(
        stored
            .document(DocumentType::ApplicationForm)
            .map(|document| document.blob.clone()),
        Some(BlobId("blob-form-PASSPORT-0000000c".to_string()))
    );
    let statuses: Vec<_> = stored.history.iter().map(|update| update.status).collect();
    assert_eq!(
        statuses,
        vec![ApplicationStatus::UnderReview, ApplicationStatus::Approved]
    );

    let feed = store.notifications_for(&owner).expect("feed");
    assert_eq!(feed.len(), 2);
    assert!(feed[0].message.contains("approved"));
    assert_eq!(store.mark_notifications_read(&owner).expect("mark"), 2);
    assert_eq!(store.mark_notifications_read(&owner).expect("mark"), 0);
    assert!(store
        .notifications_for(&owner)
        .expect("feed")
        .iter()
        .all(|notification| notification.read));
}
