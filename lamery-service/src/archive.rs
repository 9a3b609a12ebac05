//! Zip archives streamed while they are being built.

use crate::error::AppError;
use crate::files::{content_disposition, Disposition};
use crate::http_cache::{self, Validators, NO_STORE};
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipDateTime, ZipEntryBuilder};
use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use futures_util::{stream, StreamExt};
use lamery_core::path::{file_name, storage_to_absolute, ROOT};
use lamery_core::{Catalog, Entry, UNBOUNDED};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::DuplexStream;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tokio_util::io::ReaderStream;

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
}

impl ArchiveFormat {
    pub fn parse(value: Option<&str>) -> Result<Self, AppError> {
        match value.unwrap_or("zip") {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            other => Err(AppError::bad_request(format!(
                "Unknown archive format: {}",
                other
            ))),
        }
    }
}

/// One file inside the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub absolute: PathBuf,
    /// Name inside the archive, relative to the archived directory
    pub name: String,
    pub mtime: i64,
}

/// Members for an entry: a file alone under its own name, or every file
/// below a directory named relative to it.
pub fn collect_members(root: &Path, catalog: &Catalog, entry: &Entry) -> Vec<ArchiveMember> {
    match entry {
        Entry::File(file) => vec![ArchiveMember {
            absolute: storage_to_absolute(root, &file.path),
            name: file.name.clone(),
            mtime: file.mtime,
        }],
        Entry::Directory(dir) => {
            let prefix_len = if dir.path == ROOT { 1 } else { dir.path.len() + 1 };
            catalog
                .filter_files(&dir.path, UNBOUNDED)
                .into_iter()
                .map(|file| ArchiveMember {
                    absolute: storage_to_absolute(root, &file.path),
                    name: file.path[prefix_len..].to_string(),
                    mtime: file.mtime,
                })
                .collect()
        }
    }
}

/// Download name for an archived entry
pub fn archive_name(entry: &Entry) -> String {
    let base = match file_name(entry.path()) {
        "" => "archive",
        name => name,
    };
    format!("{}.zip", base)
}

/// Respond with a zip of `members`.
///
/// The archive is written into an in-memory pipe by a background task while
/// the response body drains the other end. A failure after headers are sent
/// surfaces as a body error, which aborts the connection.
pub fn zip_response(entry: &Entry, members: Vec<ArchiveMember>) -> Response {
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
    let builder = tokio::spawn(write_zip(writer, members));

    let outcome = stream::once(async move {
        match builder.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "archive stream aborted");
                Some(Err(err))
            }
            Err(err) => Some(Err(io::Error::other(err))),
        }
    })
    .filter_map(|item| async move { item });

    let body = Body::from_stream(ReaderStream::new(reader).chain(outcome));

    let mut headers = HeaderMap::new();
    Validators::for_entry(entry).apply(&mut headers, NO_STORE);
    http_cache::insert(&mut headers, CONTENT_TYPE, "application/zip");
    http_cache::insert(
        &mut headers,
        CONTENT_DISPOSITION,
        &content_disposition(Disposition::Attachment, &archive_name(entry)),
    );

    (StatusCode::OK, headers, body).into_response()
}

async fn write_zip(writer: DuplexStream, members: Vec<ArchiveMember>) -> io::Result<()> {
    let mut zip = ZipFileWriter::with_tokio(writer);

    for member in members {
        let file = match tokio::fs::File::open(&member.absolute).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(name = %member.name, "file vanished before archiving");
                continue;
            }
            Err(err) => return Err(err),
        };

        let builder = ZipEntryBuilder::new(member.name.clone().into(), Compression::Deflate)
            .last_modification_date(zip_date(member.mtime));
        let mut entry = zip.write_entry_stream(builder).await.map_err(io::Error::other)?;
        futures_util::io::copy(file.compat(), &mut entry).await?;
        entry.close().await.map_err(io::Error::other)?;
    }

    zip.close().await.map_err(io::Error::other)?;
    Ok(())
}

/// Zip timestamps cannot predate 1980
fn zip_date(mtime_ms: i64) -> ZipDateTime {
    let floor = Utc
        .with_ymd_and_hms(1980, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let when = DateTime::from_timestamp_millis(mtime_ms)
        .filter(|dt| dt.year() >= 1980)
        .unwrap_or(floor);
    ZipDateTime::from_chrono(&when)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamery_core::config::SearchConfig;
    use lamery_core::{DirectoryEntry, FileEntry, StorageIndex};

    fn catalog() -> Catalog {
        Catalog::new(
            StorageIndex::from_entries(vec![
                Entry::Directory(DirectoryEntry::new("/", 0)),
                Entry::Directory(DirectoryEntry::new("/photos", 0)),
                Entry::Directory(DirectoryEntry::new("/photos/2023", 0)),
                Entry::File(FileEntry::new("/photos/a.jpg", 1, 0)),
                Entry::File(FileEntry::new("/photos/2023/b.jpg", 1, 0)),
                Entry::File(FileEntry::new("/notes.txt", 1, 0)),
            ]),
            &SearchConfig::default(),
        )
    }

    #[test]
    fn directory_members_are_relative() {
        let catalog = catalog();
        let dir = catalog.get("/photos").unwrap();
        let mut names: Vec<String> = collect_members(Path::new("/srv"), &catalog, &dir)
            .into_iter()
            .map(|m| m.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["2023/b.jpg", "a.jpg"]);
    }

    #[test]
    fn root_members_drop_leading_slash() {
        let catalog = catalog();
        let root = catalog.get("/").unwrap();
        let members = collect_members(Path::new("/srv"), &catalog, &root);
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|m| !m.name.starts_with('/')));
        assert!(members
            .iter()
            .any(|m| m.absolute == Path::new("/srv/photos/2023/b.jpg")));
    }

    #[test]
    fn single_file_uses_base_name() {
        let catalog = catalog();
        let file = catalog.get("/photos/2023/b.jpg").unwrap();
        let members = collect_members(Path::new("/srv"), &catalog, &file);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "b.jpg");
    }

    #[test]
    fn archive_names() {
        let catalog = catalog();
        assert_eq!(archive_name(&catalog.get("/").unwrap()), "archive.zip");
        assert_eq!(archive_name(&catalog.get("/photos").unwrap()), "photos.zip");
    }

    #[test]
    fn format_parsing() {
        assert_eq!(ArchiveFormat::parse(None).unwrap(), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::parse(Some("tar")).unwrap(), ArchiveFormat::Tar);
        assert!(ArchiveFormat::parse(Some("rar")).is_err());
    }

    #[tokio::test]
    async fn streams_a_valid_zip() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello archive").unwrap();
        let members = vec![
            ArchiveMember {
                absolute: dir.path().join("a.txt"),
                name: "a.txt".to_string(),
                mtime: 1_700_000_000_000,
            },
            ArchiveMember {
                absolute: dir.path().join("missing.txt"),
                name: "missing.txt".to_string(),
                mtime: 0,
            },
        ];
        let entry = Entry::Directory(DirectoryEntry::new("/docs", 0));
        let response = zip_response(&entry, members);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/zip");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename*=UTF-8''docs.zip"
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        // end of central directory record
        assert!(bytes.windows(4).any(|w| w == b"PK\x05\x06"));
        assert!(bytes.windows(5).any(|w| w == b"a.txt"));
        assert!(!bytes.windows(11).any(|w| w == b"missing.txt"));
    }
}
