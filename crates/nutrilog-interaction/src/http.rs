//! Shared HTTP error mapping for the API clients.

use reqwest::StatusCode;
use serde::Deserialize;

use nutrilog_core::error::NutrilogError;

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// True for statuses where the same call may succeed on retry.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Maps a non-success response to a [`NutrilogError::Remote`],
/// preferring the structured error message when the body carries one.
pub(crate) fn map_http_error(service: &str, status: StatusCode, body: String) -> NutrilogError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    NutrilogError::Remote {
        message: format!("{service} returned {status}: {message}"),
        retryable: is_retryable_status(status),
    }
}
