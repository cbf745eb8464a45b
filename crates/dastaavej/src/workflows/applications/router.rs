use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use super::domain::{
    ApplicantForm, ApplicationId, ApplicationNumber, ApplicationStatus, DocumentKind,
    DocumentType, DraftId, UploadedFile,
};
use super::repository::{ApplicationStore, ApplicationSummary};
use super::service::{ApplicationService, ApplicationServiceError, DocumentContent, DocumentView};
use super::validation::ValidationError;
use crate::error::{error_body, error_response};
use crate::notify::Notifier;
use crate::storage::StorageGateway;
use crate::store::RepositoryError;
use crate::workflows::accounts::router::{account_error_response, unauthenticated};
use crate::workflows::accounts::{Authenticator, Principal, Role};
use crate::workflows::http::{bearer_token, json_payload, run_blocking};

/// Handler state: the service plus whatever resolves bearer tokens.
pub struct ApplicationRoutes<R, S, N> {
    service: Arc<ApplicationService<R, S, N>>,
    auth: Arc<dyn Authenticator>,
}

impl<R, S, N> Clone for ApplicationRoutes<R, S, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<R, S, N> ApplicationRoutes<R, S, N>
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    pub fn new(service: Arc<ApplicationService<R, S, N>>, auth: Arc<dyn Authenticator>) -> Self {
        Self { service, auth }
    }

    async fn principal(&self, headers: &HeaderMap) -> Result<Principal, Response> {
        let token = bearer_token(headers).ok_or_else(unauthenticated)?.to_string();
        let auth = Arc::clone(&self.auth);
        run_blocking(move || auth.authenticate(&token))
            .await?
            .map_err(account_error_response)
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub document_kind: DocumentKind,
    pub form: ApplicantForm,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// Router exposing submission, review, retrieval, and notification endpoints.
pub fn application_router<R, S, N>(
    service: Arc<ApplicationService<R, S, N>>,
    auth: Arc<dyn Authenticator>,
) -> Router
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let routes = ApplicationRoutes::new(service, auth);
    let max_upload = routes.service.max_upload_bytes();
    let body_limit = max_upload
        .saturating_mul(DocumentType::ALL.len())
        .saturating_add(1024 * 1024);

    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_handler::<R, S, N>).get(list_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/summary",
            get(summary_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/drafts",
            post(start_draft_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/drafts/:draft_id/submit",
            post(submit_draft_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/number/:application_number",
            get(lookup_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(detail_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/transitions",
            post(transition_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/documents/:document_type",
            get(document_handler::<R, S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/documents/:document_type/download",
            get(download_handler::<R, S, N>),
        )
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<R, S, N>),
        )
        .route(
            "/api/v1/notifications/read",
            post(mark_read_handler::<R, S, N>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(routes)
}

macro_rules! authenticated {
    ($routes:expr, $headers:expr) => {
        match $routes.principal(&$headers).await {
            Ok(principal) => principal,
            Err(response) => return response,
        }
    };
}

pub(crate) async fn submit_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let (form_part, files) = match read_multipart(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let Some(raw) = form_part else {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            "missing 'form' part with the application details",
            false,
        );
    };
    let request: SubmissionRequest = match serde_json::from_slice(&raw) {
        Ok(request) => request,
        Err(err) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                format!("malformed application form: {err}"),
                false,
            )
        }
    };

    let service = Arc::clone(&routes.service);
    let outcome = run_blocking(move || {
        service.submit(&principal, request.document_kind, request.form, files)
    })
    .await;

    match outcome {
        Ok(Ok(record)) => (StatusCode::CREATED, Json(record.detail())).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn start_draft_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    payload: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let service = Arc::clone(&routes.service);
    let outcome =
        run_blocking(move || service.start_draft(&principal, request.document_kind, request.form))
            .await;

    match outcome {
        Ok(Ok(draft)) => {
            let payload = json!({
                "draft_id": draft.id.0,
                "document_kind": draft.kind,
                "expires_at": draft.expires_at,
                "required_uploads": draft.kind.required_uploads(),
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn submit_draft_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Path(draft_id): Path<String>,
    multipart: Multipart,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let Ok(draft_id) = Uuid::parse_str(&draft_id).map(DraftId) else {
        return service_error_response(ApplicationServiceError::DraftNotFound);
    };
    let files = match read_multipart(multipart).await {
        Ok((_, files)) => files,
        Err(response) => return response,
    };

    let service = Arc::clone(&routes.service);
    let outcome = run_blocking(move || service.submit_draft(&principal, draft_id, files)).await;

    match outcome {
        Ok(Ok(record)) => (StatusCode::CREATED, Json(record.detail())).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn list_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match ApplicationStatus::from_label(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation",
                    format!("unknown status filter '{raw}'"),
                    false,
                )
            }
        },
    };

    let service = Arc::clone(&routes.service);
    let outcome = run_blocking(move || match principal.role {
        Role::Citizen => service.list_for_citizen(&principal),
        Role::Agency => service.review_queue(&principal, status),
    })
    .await;

    match outcome {
        Ok(Ok(applications)) => {
            let items: Vec<ApplicationSummary> =
                applications.iter().map(ApplicationSummary::from).collect();
            (StatusCode::OK, Json(json!({ "applications": items }))).into_response()
        }
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn summary_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.status_counts(&principal)).await {
        Ok(Ok(counts)) => (StatusCode::OK, Json(counts)).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn detail_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let Some(id) = parse_application_id(&application_id) else {
        return service_error_response(ApplicationServiceError::NotFound);
    };

    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.application(&principal, id)).await {
        Ok(Ok(record)) => (StatusCode::OK, Json(record.detail())).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn lookup_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Path(application_number): Path<String>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let number = ApplicationNumber(application_number.trim().to_string());

    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.lookup(&principal, &number)).await {
        Ok(Ok(record)) => (StatusCode::OK, Json(record.detail())).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn transition_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let Some(id) = parse_application_id(&application_id) else {
        return service_error_response(ApplicationServiceError::NotFound);
    };

    let service = Arc::clone(&routes.service);
    let outcome = run_blocking(move || {
        service.transition(&principal, id, request.status, request.comment)
    })
    .await;

    match outcome {
        Ok(Ok(record)) => (StatusCode::OK, Json(record.detail())).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn document_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Path((application_id, document_type)): Path<(String, String)>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let (id, document_type) = match parse_document_path(&application_id, &document_type) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.document_link(&principal, id, document_type)).await {
        Ok(Ok(DocumentView::Link { url })) => {
            (StatusCode::OK, Json(json!({ "url": url }))).into_response()
        }
        Ok(Ok(DocumentView::Content(content))) => content_response(content, "inline"),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn download_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
    Path((application_id, document_type)): Path<(String, String)>,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let (id, document_type) = match parse_document_path(&application_id, &document_type) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.download(&principal, id, document_type)).await {
        Ok(Ok(content)) => content_response(content, "attachment"),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn notifications_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.notifications(&principal)).await {
        Ok(Ok(feed)) => (StatusCode::OK, Json(feed)).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn mark_read_handler<R, S, N>(
    State(routes): State<ApplicationRoutes<R, S, N>>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationStore + 'static,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let principal = authenticated!(routes, headers);
    let service = Arc::clone(&routes.service);
    match run_blocking(move || service.mark_notifications_read(&principal)).await {
        Ok(Ok(updated)) => (StatusCode::OK, Json(json!({ "updated": updated }))).into_response(),
        Ok(Err(err)) => service_error_response(err),
        Err(response) => response,
    }
}

fn parse_application_id(raw: &str) -> Option<ApplicationId> {
    Uuid::parse_str(raw.trim()).ok().map(ApplicationId)
}

fn parse_document_path(
    application_id: &str,
    document_type: &str,
) -> Result<(ApplicationId, DocumentType), Response> {
    let id = parse_application_id(application_id)
        .ok_or_else(|| service_error_response(ApplicationServiceError::NotFound))?;
    let document_type = DocumentType::from_label(document_type).ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("unknown document type '{document_type}'"),
            false,
        )
    })?;
    Ok((id, document_type))
}

/// Splits a submission body into the optional `form` JSON part and the file parts.
/// Empty file inputs are skipped.
async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(Option<Vec<u8>>, Vec<UploadedFile>), Response> {
    let mut form = None;
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err)),
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "form" {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            form = Some(bytes.to_vec());
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if filename.is_empty() && bytes.is_empty() {
            continue;
        }
        files.push(UploadedFile {
            field: name,
            filename,
            bytes: bytes.to_vec(),
        });
    }

    Ok((form, files))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> Response {
    error_response(err.status(), "malformed_request", err.body_text(), false)
}

fn content_response(content: DocumentContent, disposition: &str) -> Response {
    let disposition = format!("{disposition}; filename=\"{}\"", content.filename);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        content.bytes,
    )
        .into_response()
}

pub(crate) fn service_error_response(err: ApplicationServiceError) -> Response {
    use ApplicationServiceError as E;

    let (status, kind, retryable) = match &err {
        E::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", false),
        E::Authorization(_) => (StatusCode::FORBIDDEN, "authorization", false),
        E::InvalidTransition { .. } | E::Repository(RepositoryError::StaleStatus { .. }) => {
            (StatusCode::CONFLICT, "invalid_transition", false)
        }
        E::StorageUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", true)
        }
        E::StorageFailed(_) => (StatusCode::BAD_GATEWAY, "storage_failed", false),
        E::BlobMissing(_) => (StatusCode::NOT_FOUND, "document_missing", false),
        E::NotFound
        | E::DocumentNotFound(_)
        | E::DraftNotFound
        | E::Repository(RepositoryError::NotFound) => (StatusCode::NOT_FOUND, "not_found", false),
        E::DraftExpired => (StatusCode::GONE, "draft_expired", false),
        E::Repository(RepositoryError::Conflict | RepositoryError::Constraint(_)) => {
            (StatusCode::CONFLICT, "conflict", true)
        }
        E::Repository(RepositoryError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", true)
        }
        E::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", false),
    };

    if status.is_server_error() {
        error!(error = %err, kind, "application request failed");
    }

    let mut body = error_body(kind, &err, retryable);
    match &err {
        E::Validation(ValidationError::Fields(fields)) => {
            body["fields"] = json!(fields
                .iter()
                .map(|field| json!({ "field": field.field, "message": field.message }))
                .collect::<Vec<_>>());
        }
        E::StorageUnavailable {
            retry_draft: Some(draft),
            ..
        } => {
            body["draft_id"] = json!(draft.0);
        }
        _ => {}
    }
    (status, Json(body)).into_response()
}
