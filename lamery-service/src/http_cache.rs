//! Cache validators and conditional-request evaluation for byte responses.

use axum::http::header::{
    HeaderName, HeaderValue, CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE,
    LAST_MODIFIED,
};
use axum::http::HeaderMap;
use lamery_core::hash::entry_etag;
use lamery_core::{Entry, FileEntry};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub const REVALIDATE: &str = "private, max-age=0, must-revalidate";
pub const NO_STORE: &str = "private, no-store";

const HTTP_DATE: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// `ETag` and `Last-Modified` of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    pub etag: String,
    pub last_modified: String,
    modified_secs: i64,
}

impl Validators {
    pub fn for_entry(entry: &Entry) -> Self {
        let modified_secs = entry.mtime().div_euclid(1000);
        Self {
            etag: entry_etag(entry),
            last_modified: http_date(modified_secs),
            modified_secs,
        }
    }

    pub fn for_file(file: &FileEntry) -> Self {
        Self::for_entry(&Entry::File(file.clone()))
    }

    /// Whether the client's cached copy is current (answer 304).
    ///
    /// `If-None-Match` takes precedence; `If-Modified-Since` is only consulted
    /// when it is absent.
    pub fn not_modified(&self, headers: &HeaderMap) -> bool {
        if let Some(value) = header_str(headers, &IF_NONE_MATCH) {
            return value
                .split(',')
                .map(str::trim)
                .any(|tag| tag == "*" || opaque_tag(tag) == opaque_tag(&self.etag));
        }
        header_str(headers, &IF_MODIFIED_SINCE)
            .and_then(parse_http_date)
            .is_some_and(|since| self.modified_secs <= since.unix_timestamp())
    }

    /// Whether a `Range` may be honored; true when `If-Range` is absent
    pub fn if_range_passes(&self, headers: &HeaderMap) -> bool {
        match header_str(headers, &IF_RANGE) {
            None => true,
            Some(value) => value == self.etag || value == self.last_modified,
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap, cache_control: &'static str) {
        insert(headers, ETAG, &self.etag);
        insert(headers, LAST_MODIFIED, &self.last_modified);
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(cache_control));
    }
}

/// IMF-fixdate for a Unix timestamp in seconds
pub fn http_date(secs: i64) -> String {
    OffsetDateTime::from_unix_timestamp(secs)
        .ok()
        .and_then(|dt| dt.format(HTTP_DATE).ok())
        .unwrap_or_default()
}

pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), HTTP_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn opaque_tag(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
