use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::Registration;
use super::repository::AccountStore;
use super::service::{AccountService, AccountServiceError};
use crate::error::{error_body, error_response};
use crate::notify::Notifier;
use crate::store::RepositoryError;
use crate::workflows::applications::ValidationError;
use crate::workflows::http::{bearer_token, json_payload, run_blocking};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Registration, verification, and session endpoints.
pub fn account_router<R, N>(service: Arc<AccountService<R, N>>) -> Router
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/auth/register", post(register_handler::<R, N>))
        .route("/api/v1/auth/login", post(login_handler::<R, N>))
        .route("/api/v1/auth/logout", post(logout_handler::<R, N>))
        .route("/api/v1/auth/me", get(me_handler::<R, N>))
        .route(
            "/api/v1/auth/verify-agency/:token",
            get(verify_agency_handler::<R, N>),
        )
        .with_state(service)
}

pub(crate) async fn register_handler<R, N>(
    State(service): State<Arc<AccountService<R, N>>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Response
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    let registration = match json_payload(payload) {
        Ok(registration) => registration,
        Err(response) => return response,
    };
    let outcome = run_blocking(move || service.register(registration)).await;
    match outcome {
        Ok(Ok(registered)) => {
            let message = if registered.account.verified {
                "registration complete"
            } else {
                "registration pending administrator verification"
            };
            let payload = json!({
                "account": registered.account,
                "message": message,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Ok(Err(err)) => account_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn login_handler<R, N>(
    State(service): State<Arc<AccountService<R, N>>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    let request = match json_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let outcome = run_blocking(move || service.login(&request.username, &request.password)).await;
    match outcome {
        Ok(Ok(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(Err(err)) => account_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn logout_handler<R, N>(
    State(service): State<Arc<AccountService<R, N>>>,
    headers: HeaderMap,
) -> Response
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    let Some(token) = bearer_token(&headers).map(str::to_string) else {
        return account_error_response(AccountServiceError::Unauthenticated);
    };
    match run_blocking(move || service.logout(&token)).await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => account_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn me_handler<R, N>(
    State(service): State<Arc<AccountService<R, N>>>,
    headers: HeaderMap,
) -> Response
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    let Some(token) = bearer_token(&headers).map(str::to_string) else {
        return account_error_response(AccountServiceError::Unauthenticated);
    };
    match run_blocking(move || service.account(&token)).await {
        Ok(Ok(account)) => (StatusCode::OK, Json(account)).into_response(),
        Ok(Err(err)) => account_error_response(err),
        Err(response) => response,
    }
}

pub(crate) async fn verify_agency_handler<R, N>(
    State(service): State<Arc<AccountService<R, N>>>,
    Path(token): Path<String>,
) -> Response
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    match run_blocking(move || service.verify_agency(&token)).await {
        Ok(Ok(account)) => {
            let payload = json!({
                "account": account,
                "message": "agency official account has been verified",
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(Err(err)) => account_error_response(err),
        Err(response) => response,
    }
}

pub(crate) fn account_error_response(err: AccountServiceError) -> Response {
    let (status, kind, retryable) = match &err {
        AccountServiceError::Validation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "validation", false)
        }
        AccountServiceError::Duplicate(_) => (StatusCode::CONFLICT, "conflict", false),
        AccountServiceError::InvalidCredentials | AccountServiceError::Unauthenticated => {
            (StatusCode::UNAUTHORIZED, "unauthenticated", false)
        }
        AccountServiceError::PendingVerification => {
            (StatusCode::FORBIDDEN, "authorization", false)
        }
        AccountServiceError::InvalidToken => (StatusCode::NOT_FOUND, "not_found", false),
        AccountServiceError::TokenExpired | AccountServiceError::TokenConsumed => {
            (StatusCode::GONE, "token_unusable", false)
        }
        AccountServiceError::Notification(_)
        | AccountServiceError::Repository(RepositoryError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", true)
        }
        AccountServiceError::Password(_) | AccountServiceError::Repository(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal", false)
        }
    };

    if status.is_server_error() {
        error!(error = %err, "account request failed");
    }

    let mut body = error_body(kind, &err, retryable);
    if let AccountServiceError::Validation(ValidationError::Fields(fields)) = &err {
        body["fields"] = json!(fields
            .iter()
            .map(|field| json!({ "field": field.field, "message": field.message }))
            .collect::<Vec<_>>());
    }
    (status, Json(body)).into_response()
}

pub(crate) fn unauthenticated() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        AccountServiceError::Unauthenticated,
        false,
    )
}
