use axum::http::header::{HeaderValue, ALLOW, CONTENT_RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use crate::thumbnails::ThumbnailError;
use crate::transcoder::TranscodeError;
use lamery_core::{ErrorEnvelope, LameryError};

pub struct AppError {
    pub status: StatusCode,
    pub body: ErrorEnvelope,
    pub headers: HeaderMap,
}

impl AppError {
    fn new(status: StatusCode, body: ErrorEnvelope) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorEnvelope::not_found(path))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ErrorEnvelope::new("bad_request", message, "Check the request parameters"),
        )
    }

    /// 416 carrying `Content-Range: bytes */{size}`
    pub fn range_not_satisfiable(size: u64) -> Self {
        let mut err = Self::new(
            StatusCode::RANGE_NOT_SATISFIABLE,
            ErrorEnvelope::new(
                "range_not_satisfiable",
                "Range Not Satisfiable",
                format!("The file is {} bytes long", size),
            ),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
            err.headers.insert(CONTENT_RANGE, value);
        }
        err
    }

    pub fn method_not_allowed() -> Self {
        let mut err = Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorEnvelope::new(
                "method_not_allowed",
                "Method Not Allowed",
                "Only GET is supported",
            ),
        );
        err.headers.insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
        err
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorEnvelope::internal(&msg.to_string()),
        )
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.body.code, self.body.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.body.message, "request failed");
        }
        (self.status, self.headers, axum::Json(self.body)).into_response()
    }
}

impl From<LameryError> for AppError {
    fn from(err: LameryError) -> Self {
        AppError::internal(err)
    }
}

impl From<ThumbnailError> for AppError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::Unsupported(_) | ThumbnailError::UnknownFormat(_) => {
                AppError::bad_request(err.to_string())
            }
            _ => AppError::internal(err),
        }
    }
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        AppError::internal(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal(format!("background task failed: {}", err))
    }
}

/// Fallback for every route's non-GET methods
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_error_carries_content_range() {
        let response = AppError::range_not_satisfiable(100).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */100");
    }

    #[test]
    fn missing_root_is_internal() {
        let err = AppError::from(LameryError::RootNotFound("/srv/media".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.message, "Storage root not found: /srv/media");
    }

    #[test]
    fn unsupported_thumbnail_is_bad_request() {
        let err = AppError::from(ThumbnailError::Unsupported("text".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body.message, "Thumbnails are not available for text files");
    }

    #[test]
    fn method_not_allowed_lists_get() {
        let response = AppError::method_not_allowed().into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    }
}
