//! Maps [`fyllo::Error`] onto HTTP responses.
//!
//! The status code is chosen from the error's stable [`ErrorCode`]; the body
//! always carries the numeric code, its short message, and the error's own
//! description:
//!
//! ```json
//! { "code": 40001002, "message": "Current Timestamp Less Than Last", "cause": "..." }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fyllo::{Error, ErrorCode};
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u32,
    message: &'static str,
    cause: String,
}

/// HTTP status for an error code. Codes without an entry are client errors.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::RequestParam => StatusCode::BAD_REQUEST,
        ErrorCode::ProviderNotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorCode::TimestampRewind | ErrorCode::TickStalled | ErrorCode::SegmentQueryFailed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorCode::SequenceOutOfRange
        | ErrorCode::SegmentRangeFailed
        | ErrorCode::Internal
        | ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        if status.is_server_error() {
            tracing::warn!(code = code.as_u32(), error = %self.0, "request failed");
        }

        let body = ErrorBody {
            code: code.as_u32(),
            message: code.message(),
            cause: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
