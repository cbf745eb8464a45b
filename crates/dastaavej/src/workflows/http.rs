//! Request plumbing shared by the workflow routers.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use tracing::error;

use crate::error::error_response;

/// Token from an `Authorization: Bearer <token>` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Unwrap a JSON body, answering parse failures in the portal's error shape.
///
/// Handlers take the extractor as a `Result` so authentication runs before the body is
/// judged.
pub(crate) fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        error_response(
            rejection.status(),
            "malformed_request",
            rejection.body_text(),
            false,
        )
    })
}

/// Run service work that may block (database queries, storage calls) off the async workers.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        error!(error = %err, "blocking worker failed");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "request could not be completed",
            true,
        )
    })
}
