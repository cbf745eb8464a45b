use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::storage::{MemoryStorage, StorageGateway};
use crate::workflows::accounts::Principal;
use crate::workflows::applications::{
    application_router, ApplicationService, ApplicationSettings, ApplicationStatus,
    DocumentKind, DocumentType, UploadedFile,
};

const BOUNDARY: &str = "dastaavej-test-boundary";

struct Harness {
    router: Router,
    service: Arc<TestService>,
    citizen: Principal,
    officer: Principal,
}

fn harness() -> Harness {
    let (service, store, _, _) = build_service();
    let citizen = citizen(&store, "AshaVerma1");
    let officer = officer(&store);
    let service = Arc::new(service);
    let tokens = TokenTable::default()
        .with("citizen-token", citizen)
        .with("officer-token", officer);
    let router = application_router(Arc::clone(&service), Arc::new(tokens));
    Harness {
        router,
        service,
        citizen,
        officer,
    }
}

fn multipart_body(form: Option<&Value>, files: &[UploadedFile]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(form) = form {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"form\"\r\nContent-Type: application/json\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(form.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for file in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                file.field, file.filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn submission_request(
    token: Option<&str>,
    form: Option<&Value>,
    files: &[UploadedFile],
) -> Request<Body> {
    let mut request = Request::post("/api/v1/applications").header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    request
        .body(Body::from(multipart_body(form, files)))
        .expect("request builds")
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request builds")
}

fn post_json(uri: &str, token: &str, payload: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn passport_payload() -> Value {
    json!({
        "document_kind": "passport",
        "form": passport_form(),
    })
}

#[tokio::test]
async fn submission_requires_a_bearer_token() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(submission_request(
            None,
            Some(&passport_payload()),
            &passport_files(),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "unauthenticated");
}

#[tokio::test]
async fn multipart_submission_creates_application() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(submission_request(
            Some("citizen-token"),
            Some(&passport_payload()),
            &passport_files(),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "pending");
    assert_eq!(payload["document_kind"], "passport");
    assert!(payload["application_number"]
        .as_str()
        .is_some_and(|number| number.starts_with("PASSPORT-")));
    assert_eq!(payload["documents"].as_array().map(Vec::len), Some(5));
    assert!(payload["documents"][0].get("blob").is_none());
    assert_eq!(
        payload["allowed_transitions"],
        json!(["under_review", "approved", "rejected"])
    );

    let listed = harness
        .service
        .list_for_citizen(&harness.citizen)
        .expect("listing");
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn invalid_form_returns_field_errors() {
    let harness = harness();
    let mut form = passport_form();
    form.phone = "98765".to_string();
    let payload = json!({ "document_kind": "passport", "form": form });

    let response = harness
        .router
        .oneshot(submission_request(
            Some("citizen-token"),
            Some(&payload),
            &passport_files(),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["retryable"], false);
    assert_eq!(body["fields"][0]["field"], "phone");
}

#[tokio::test]
async fn missing_form_part_is_rejected() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(submission_request(Some("citizen-token"), None, &passport_files()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn agency_submission_is_forbidden() {
    let harness = harness();
    let response = harness
        .router
        .oneshot(submission_request(
            Some("officer-token"),
            Some(&passport_payload()),
            &passport_files(),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json_body(response).await["kind"], "authorization");
}

#[tokio::test]
async fn transition_route_enforces_the_status_graph() {
    let harness = harness();
    let record = harness
        .service
        .submit(
            &harness.citizen,
            DocumentKind::Passport,
            passport_form(),
            passport_files(),
        )
        .expect("submission succeeds");
    let uri = format!(
        "/api/v1/applications/{}/transitions",
        record.application.id
    );

    let response = harness
        .router
        .clone()
        .oneshot(post_json(
            &uri,
            "citizen-token",
            &json!({ "status": "approved" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness
        .router
        .clone()
        .oneshot(post_json(
            &uri,
            "officer-token",
            &json!({ "status": "approved", "comment": "verified" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "approved");
    assert_eq!(payload["history"][0]["comment"], "verified");

    let response = harness
        .router
        .oneshot(post_json(
            &uri,
            "officer-token",
            &json!({ "status": "rejected" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(response).await["kind"], "invalid_transition");
}

#[tokio::test]
async fn listing_depends_on_role() {
    let harness = harness();
    harness
        .service
        .submit(
            &harness.citizen,
            DocumentKind::Passport,
            passport_form(),
            passport_files(),
        )
        .expect("submission succeeds");

    let response = harness
        .router
        .clone()
        .oneshot(get("/api/v1/applications", "citizen-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["applications"].as_array().map(Vec::len), Some(1));

    let response = harness
        .router
        .clone()
        .oneshot(get("/api/v1/applications?status=approved", "officer-token"))
        .await
        .expect("route executes");
    let payload = read_json_body(response).await;
    assert_eq!(payload["applications"], json!([]));

    let response = harness
        .router
        .oneshot(get("/api/v1/applications?status=archived", "officer-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn detail_and_lookup_routes() {
    let harness = harness();
    let record = harness
        .service
        .submit(
            &harness.citizen,
            DocumentKind::Passport,
            passport_form(),
            passport_files(),
        )
        .expect("submission succeeds");

    let response = harness
        .router
        .clone()
        .oneshot(get(
            &format!(
                "/api/v1/applications/number/{}",
                record.application.number.as_str().to_lowercase()
            ),
            "officer-token",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["id"], json!(record.application.id));

    let response = harness
        .router
        .clone()
        .oneshot(get("/api/v1/applications/not-a-uuid", "citizen-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = harness
        .router
        .oneshot(get(
            &format!("/api/v1/applications/{}", uuid::Uuid::new_v4()),
            "officer-token",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_routes_serve_inline_and_attachment() {
    let harness = harness();
    let record = harness
        .service
        .submit(
            &harness.citizen,
            DocumentKind::Passport,
            passport_form(),
            passport_files(),
        )
        .expect("submission succeeds");
    let base = format!("/api/v1/applications/{}/documents", record.application.id);

    let response = harness
        .router
        .clone()
        .oneshot(get(&format!("{base}/id_proof"), "citizen-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"aadhaar.pdf\""
    );
    assert_eq!(read_body(response).await, PDF_BYTES);

    let response = harness
        .router
        .clone()
        .oneshot(get(
            &format!("{base}/application_form/download"),
            "officer-token",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .is_ok_and(|value| value.starts_with("attachment;")));
    assert!(read_body(response).await.starts_with(b"%PDF-"));

    let response = harness
        .router
        .oneshot(get(&format!("{base}/passport_scan"), "citizen-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_route_returns_links_when_storage_offers_them() {
    let (service, store, _, _) = build_service_with(
        MemoryStorage::with_preview_base("https://docs.example.org"),
        ApplicationSettings::default(),
    );
    let asha = citizen(&store, "AshaVerma1");
    let record = service
        .submit(&asha, DocumentKind::Passport, passport_form(), passport_files())
        .expect("submission succeeds");
    let router = application_router(
        Arc::new(service),
        Arc::new(TokenTable::default().with("citizen-token", asha)),
    );

    let response = router
        .oneshot(get(
            &format!(
                "/api/v1/applications/{}/documents/photo",
                record.application.id
            ),
            "citizen-token",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert!(payload["url"]
        .as_str()
        .is_some_and(|url| url.starts_with("https://docs.example.org/")));
}

#[tokio::test]
async fn two_phase_submission_over_http() {
    let harness = harness();
    let response = harness
        .router
        .clone()
        .oneshot(post_json(
            "/api/v1/applications/drafts",
            "citizen-token",
            &json!({ "document_kind": "pan_card", "form": pan_card_form() }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let draft = read_json_body(response).await;
    assert_eq!(
        draft["required_uploads"],
        json!(["id_proof", "photo", "address_proof", "signature"])
    );
    let draft_id = draft["draft_id"].as_str().expect("draft id").to_string();

    let request = Request::post(format!("/api/v1/applications/drafts/{draft_id}/submit"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::AUTHORIZATION, "Bearer citizen-token")
        .body(Body::from(multipart_body(None, &pan_card_files())))
        .expect("request builds");
    let response = harness
        .router
        .oneshot(request)
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(read_json_body(response).await["document_kind"], "pan_card");
}

#[tokio::test]
async fn notification_routes_report_and_clear_unread() {
    let harness = harness();
    let record = harness
        .service
        .submit(
            &harness.citizen,
            DocumentKind::Passport,
            passport_form(),
            passport_files(),
        )
        .expect("submission succeeds");
    harness
        .service
        .transition(
            &harness.officer,
            record.application.id,
            ApplicationStatus::UnderReview,
            None,
        )
        .expect("review starts");

    let response = harness
        .router
        .clone()
        .oneshot(get("/api/v1/notifications", "citizen-token"))
        .await
        .expect("route executes");
    let feed = read_json_body(response).await;
    assert_eq!(feed["unread"], 1);
    assert_eq!(feed["notifications"][0]["title"], "Application Status Updated");

    let response = harness
        .router
        .oneshot(
            Request::post("/api/v1/notifications/read")
                .header(header::AUTHORIZATION, "Bearer citizen-token")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(read_json_body(response).await["updated"], 1);
}

#[tokio::test]
async fn storage_outage_reports_retry_draft() {
    let store = Arc::new(crate::store::MemoryStore::new());
    let asha = citizen(&store, "AshaVerma1");
    let service = ApplicationService::new(
        Arc::clone(&store),
        Arc::new(FlakyStorage::failing_on(1)),
        Arc::new(MemoryNotifier::default()),
        ApplicationSettings::default(),
    );
    let router = application_router(
        Arc::new(service),
        Arc::new(TokenTable::default().with("citizen-token", asha)),
    );

    let response = router
        .oneshot(submission_request(
            Some("citizen-token"),
            Some(&passport_payload()),
            &passport_files(),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "storage_unavailable");
    assert_eq!(body["retryable"], true);
    assert!(body["draft_id"].is_string());
}

fn raw_post(uri: &str, token: Option<&str>, body: &'static str) -> Request<Body> {
    let mut request = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    request.body(Body::from(body)).expect("request builds")
}

#[tokio::test]
async fn malformed_transition_body_is_judged_after_authentication() {
    let harness = harness();
    let record = harness
        .service
        .submit(
            &harness.citizen,
            DocumentKind::Passport,
            passport_form(),
            passport_files(),
        )
        .expect("submission succeeds");
    let uri = format!(
        "/api/v1/applications/{}/transitions",
        record.application.id
    );

    let response = harness
        .router
        .clone()
        .oneshot(raw_post(&uri, None, "{\"status\": "))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json_body(response).await["kind"], "unauthenticated");

    let response = harness
        .router
        .clone()
        .oneshot(raw_post(&uri, Some("officer-token"), "{\"status\": "))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "malformed_request");
    assert_eq!(body["retryable"], false);

    let response = harness
        .router
        .oneshot(raw_post(&uri, Some("officer-token"), "{\"status\": \"archived\"}"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json_body(response).await["kind"], "malformed_request");
}

#[tokio::test]
async fn missing_blob_is_a_permanent_not_found() {
    let (service, store, storage, _) = build_service();
    let asha = citizen(&store, "AshaVerma1");
    let record = service
        .submit(&asha, DocumentKind::Passport, passport_form(), passport_files())
        .expect("submission succeeds");
    let blob = record
        .document(DocumentType::IdProof)
        .map(|document| document.blob.clone())
        .expect("id proof stored");
    storage.discard(&blob).expect("blob removed");
    let router = application_router(
        Arc::new(service),
        Arc::new(TokenTable::default().with("citizen-token", asha)),
    );

    let response = router
        .oneshot(get(
            &format!(
                "/api/v1/applications/{}/documents/id_proof/download",
                record.application.id
            ),
            "citizen-token",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "document_missing");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn summary_route_counts_applications_for_agency() {
    let harness = harness();
    for _ in 0..2 {
        harness
            .service
            .submit(
                &harness.citizen,
                DocumentKind::Passport,
                passport_form(),
                passport_files(),
            )
            .expect("submission succeeds");
    }

    let response = harness
        .router
        .clone()
        .oneshot(get("/api/v1/applications/summary", "officer-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["pending"], 2);
    assert_eq!(body["under_review"], 0);
    assert_eq!(body["total"], 2);

    let response = harness
        .router
        .oneshot(get("/api/v1/applications/summary", "citizen-token"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
