//! Range-aware file responses.

use crate::error::AppError;
use crate::http_cache::{self, Validators, REVALIDATE};
use crate::range::{parse_range, ByteRange, RangeError};
use axum::body::Body;
use axum::http::header::{
    HeaderValue, ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
    RANGE, VARY,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use lamery_core::FileEntry;
use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

/// `Content-Disposition` value with an RFC 5987 encoded file name
pub fn content_disposition(kind: Disposition, filename: &str) -> String {
    let kind = match kind {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    format!("{}; filename*=UTF-8''{}", kind, urlencoding::encode(filename))
}

pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// 304 carrying the current validators
pub fn not_modified(validators: &Validators, cache_control: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    validators.apply(&mut headers, cache_control);
    (StatusCode::NOT_MODIFIED, headers).into_response()
}

/// Serve `file` (located at `absolute`) honoring `Range`, `If-Range`,
/// `If-None-Match` and `If-Modified-Since`.
pub async fn serve_file(
    absolute: &Path,
    file: &FileEntry,
    request: &HeaderMap,
    disposition: Disposition,
) -> Result<Response, AppError> {
    let validators = Validators::for_file(file);

    let range = match request.get(RANGE).and_then(|v| v.to_str().ok()) {
        Some(value) if validators.if_range_passes(request) => match parse_range(value, file.size) {
            Ok(range) => Some(range),
            Err(RangeError::Malformed) => {
                return Err(AppError::bad_request(format!("Malformed Range header: {}", value)))
            }
            Err(RangeError::Unsatisfiable) => {
                return Err(AppError::range_not_satisfiable(file.size))
            }
        },
        Some(_) => None,
        None => {
            if validators.not_modified(request) {
                return Ok(not_modified(&validators, REVALIDATE));
            }
            None
        }
    };

    let mut handle = match tokio::fs::File::open(absolute).await {
        Ok(handle) => handle,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(AppError::not_found(&file.path)),
        Err(err) => return Err(AppError::internal(err)),
    };

    let mut headers = HeaderMap::new();
    validators.apply(&mut headers, REVALIDATE);
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(VARY, HeaderValue::from_static("Range"));
    http_cache::insert(&mut headers, CONTENT_TYPE, &content_type_for(&file.name));
    http_cache::insert(
        &mut headers,
        CONTENT_DISPOSITION,
        &content_disposition(disposition, &file.name),
    );

    let (status, ByteRange { start, end }) = match range {
        Some(range) => {
            http_cache::insert(&mut headers, CONTENT_RANGE, &range.content_range(file.size));
            (StatusCode::PARTIAL_CONTENT, range)
        }
        None => (
            StatusCode::OK,
            ByteRange {
                start: 0,
                end: file.size.saturating_sub(1),
            },
        ),
    };
    let length = if file.size == 0 { 0 } else { end - start + 1 };
    http_cache::insert(&mut headers, CONTENT_LENGTH, &length.to_string());

    if start > 0 {
        handle.seek(SeekFrom::Start(start)).await?;
    }
    let body = Body::from_stream(ReaderStream::new(handle.take(length)));

    Ok((status, headers, body).into_response())
}

/// Stream a whole file with a fixed content type (thumbnails)
pub async fn serve_whole(
    absolute: &Path,
    content_type: &str,
    validators: &Validators,
) -> Result<Response, AppError> {
    let handle = tokio::fs::File::open(absolute).await?;
    let length = handle.metadata().await?.len();

    let mut headers = HeaderMap::new();
    validators.apply(&mut headers, REVALIDATE);
    http_cache::insert(&mut headers, CONTENT_TYPE, content_type);
    http_cache::insert(&mut headers, CONTENT_LENGTH, &length.to_string());

    let body = Body::from_stream(ReaderStream::new(handle));
    Ok((StatusCode::OK, headers, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{ETAG, IF_NONE_MATCH, IF_RANGE};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, std::path::PathBuf, FileEntry) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let bytes: Vec<u8> = (0..100u8).collect();
        std::fs::write(&path, &bytes).unwrap();
        let file = FileEntry::new("/data.bin", 100, 1_700_000_000_000);
        (dir, path, file)
    }

    fn request(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn full_response() {
        let (_dir, path, file) = fixture();
        let response = serve_file(&path, &file, &HeaderMap::new(), Disposition::Inline)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers()[VARY], "Range");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "inline; filename*=UTF-8''data.bin"
        );
        assert_eq!(body_bytes(response).await.len(), 100);
    }

    #[tokio::test]
    async fn partial_response() {
        let (_dir, path, file) = fixture();
        let headers = request(&[(RANGE, "bytes=10-19")]);
        let response = serve_file(&path, &file, &headers, Disposition::Inline)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 10-19/100");
        assert_eq!(response.headers()[VARY], "Range");
        assert_eq!(body_bytes(response).await, (10..20u8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn unsatisfiable_range() {
        let (_dir, path, file) = fixture();
        let headers = request(&[(RANGE, "bytes=150-200")]);
        let err = serve_file(&path, &file, &headers, Disposition::Inline)
            .await
            .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */100");
    }

    #[tokio::test]
    async fn malformed_range_is_bad_request() {
        let (_dir, path, file) = fixture();
        let headers = request(&[(RANGE, "pages=1-2")]);
        let err = serve_file(&path, &file, &headers, Disposition::Inline)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn matching_etag_short_circuits() {
        let (_dir, path, file) = fixture();
        let etag = Validators::for_file(&file).etag;
        let headers = request(&[(IF_NONE_MATCH, etag.as_str())]);
        let response = serve_file(&path, &file, &headers, Disposition::Inline)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[ETAG], etag.as_str());
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn stale_if_range_serves_everything() {
        let (_dir, path, file) = fixture();
        let headers = request(&[(RANGE, "bytes=0-9"), (IF_RANGE, "\"old\"")]);
        let response = serve_file(&path, &file, &headers, Disposition::Attachment)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[VARY], "Range");
        assert!(response.headers()[CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment;"));
    }

    #[tokio::test]
    async fn empty_file_has_empty_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();
        let file = FileEntry::new("/empty.txt", 0, 0);
        let response = serve_file(&path, &file, &HeaderMap::new(), Disposition::Inline)
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_LENGTH], "0");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert!(body_bytes(response).await.is_empty());
    }

    #[test]
    fn disposition_encodes_unicode() {
        assert_eq!(
            content_disposition(Disposition::Attachment, "résumé 1.pdf"),
            "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9%201.pdf"
        );
    }
}
