//! Subtitle track discovery and WebVTT delivery.

use crate::error::AppError;
use crate::transcoder::{Probe, Transcoder};
use axum::body::{Body, Bytes};
use futures_util::{stream, StreamExt};
use lamery_core::media::{is_subtitle_ext, language_name_iso6391, language_name_iso6392};
use lamery_core::path::{file_stem, parent_path};
use lamery_core::{Catalog, FileEntry};
use serde::Serialize;
use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio_util::io::ReaderStream;

const FIRST_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubtitleTrack {
    /// A subtitle stream inside the video container
    Embedded {
        stream: usize,
        codec: Option<String>,
        lang: Option<String>,
        #[serde(rename = "langName")]
        lang_name: Option<String>,
        title: Option<String>,
    },
    /// A sidecar file next to the video, e.g. `movie.en.srt`
    External {
        path: String,
        lang: Option<String>,
        #[serde(rename = "langName")]
        lang_name: Option<String>,
    },
}

/// Embedded subtitle streams, numbered in container order
pub fn embedded_tracks(probe: &Probe) -> Vec<SubtitleTrack> {
    probe
        .subtitle_streams()
        .enumerate()
        .map(|(n, stream)| {
            let lang = stream.tags.get("language").cloned();
            SubtitleTrack::Embedded {
                stream: n,
                codec: stream.codec_name.clone(),
                lang_name: lang
                    .as_deref()
                    .and_then(language_name_iso6392)
                    .map(str::to_string),
                lang,
                title: stream.tags.get("title").cloned(),
            }
        })
        .collect()
}

/// Subtitle files in the video's directory named `<video stem>.<hint>.<ext>`
/// or `<video stem>.<ext>`
pub fn sidecar_tracks(catalog: &Catalog, video: &FileEntry) -> Vec<SubtitleTrack> {
    let stem = file_stem(&video.name);
    let prefix = format!("{}.", stem);

    let mut sidecars: Vec<FileEntry> = catalog
        .filter_files(parent_path(&video.path), 0)
        .into_iter()
        .filter(|f| f.path != video.path && is_subtitle_ext(&f.ext) && f.name.starts_with(&prefix))
        .collect();
    sidecars.sort_by(|a, b| alphanumeric_sort::compare_str(&a.name, &b.name));

    sidecars
        .into_iter()
        .map(|f| {
            let hint = file_stem(&f.name)
                .strip_prefix(stem)
                .map(|rest| rest.trim_start_matches('.'))
                .filter(|rest| !rest.is_empty())
                .map(str::to_string);
            SubtitleTrack::External {
                lang_name: hint
                    .as_deref()
                    .and_then(language_name_iso6391)
                    .map(str::to_string),
                lang: hint,
                path: f.path,
            }
        })
        .collect()
}

/// All subtitle tracks for a video. A failed probe only drops the embedded tracks.
pub async fn list_tracks(
    transcoder: &Transcoder,
    catalog: &Catalog,
    absolute: &Path,
    video: &FileEntry,
) -> Vec<SubtitleTrack> {
    let mut tracks = match transcoder.probe(absolute).await {
        Ok(probe) => embedded_tracks(&probe),
        Err(err) => {
            tracing::warn!(path = %video.path, error = %err, "probe failed; listing sidecars only");
            Vec::new()
        }
    };
    tracks.extend(sidecar_tracks(catalog, video));
    tracks
}

/// Parse the `stream` query parameter (default 0)
pub fn parse_stream_index(value: Option<&str>) -> Result<usize, AppError> {
    match value {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::bad_request("Invalid stream index.")),
    }
}

/// Run ffmpeg and stream its WebVTT output.
///
/// The first chunk is read before returning so a conversion that fails
/// outright still becomes a 500. Past that point a non-zero exit ends the
/// body with an error. Dropping the body kills the process.
pub async fn webvtt_body(
    transcoder: &Transcoder,
    input: &Path,
    stream: Option<usize>,
) -> Result<Body, AppError> {
    let mut child = transcoder.spawn_webvtt(input, stream)?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::internal("transcoder stdout unavailable"))?;

    let mut first = vec![0u8; FIRST_CHUNK];
    let read = stdout.read(&mut first).await?;
    if read == 0 {
        let status = child.wait().await?;
        if !status.success() {
            return Err(AppError::internal(format!(
                "subtitle conversion failed ({})",
                status
            )));
        }
        return Ok(Body::empty());
    }
    first.truncate(read);

    let rest = stream::unfold(
        Some((child, ReaderStream::new(stdout))),
        |state: Option<(Child, ReaderStream<tokio::process::ChildStdout>)>| async move {
            let (mut child, mut reader) = state?;
            match reader.next().await {
                Some(Ok(bytes)) => Some((Ok(bytes), Some((child, reader)))),
                Some(Err(err)) => Some((Err(err), None)),
                None => match child.wait().await {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some((
                        Err(io::Error::other(format!("transcoder exited with {}", status))),
                        None,
                    )),
                    Err(err) => Some((Err(err), None)),
                },
            }
        },
    );

    let head = stream::once(async move { Ok::<Bytes, io::Error>(Bytes::from(first)) });
    Ok(Body::from_stream(head.chain(rest)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamery_core::config::SearchConfig;
    use lamery_core::{DirectoryEntry, Entry, StorageIndex};

    fn catalog() -> Catalog {
        Catalog::new(
            StorageIndex::from_entries(vec![
                Entry::Directory(DirectoryEntry::new("/", 0)),
                Entry::Directory(DirectoryEntry::new("/tv", 0)),
                Entry::File(FileEntry::new("/tv/movie.mkv", 100, 0)),
                Entry::File(FileEntry::new("/tv/movie.en.srt", 1, 0)),
                Entry::File(FileEntry::new("/tv/movie.fr.ass", 1, 0)),
                Entry::File(FileEntry::new("/tv/movie.vtt", 1, 0)),
                Entry::File(FileEntry::new("/tv/movie.nfo", 1, 0)),
                Entry::File(FileEntry::new("/tv/movies.en.srt", 1, 0)),
                Entry::File(FileEntry::new("/tv/other.en.srt", 1, 0)),
            ]),
            &SearchConfig::default(),
        )
    }

    #[test]
    fn sidecars_match_video_stem() {
        let catalog = catalog();
        let video = catalog.get_file("/tv/movie.mkv").unwrap();
        let tracks = sidecar_tracks(&catalog, &video);
        assert_eq!(
            tracks,
            vec![
                SubtitleTrack::External {
                    path: "/tv/movie.en.srt".to_string(),
                    lang: Some("en".to_string()),
                    lang_name: Some("English".to_string()),
                },
                SubtitleTrack::External {
                    path: "/tv/movie.fr.ass".to_string(),
                    lang: Some("fr".to_string()),
                    lang_name: Some("French".to_string()),
                },
                SubtitleTrack::External {
                    path: "/tv/movie.vtt".to_string(),
                    lang: None,
                    lang_name: None,
                },
            ]
        );
    }

    #[test]
    fn embedded_tracks_are_numbered_in_order() {
        let probe: Probe = serde_json::from_str(
            r#"{"streams": [
                {"index": 0, "codec_type": "video"},
                {"index": 3, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "jpn", "title": "Full"}},
                {"index": 5, "codec_type": "subtitle", "codec_name": "ass"}
            ]}"#,
        )
        .unwrap();
        let tracks = embedded_tracks(&probe);
        assert_eq!(tracks.len(), 2);
        assert_eq!(
            tracks[0],
            SubtitleTrack::Embedded {
                stream: 0,
                codec: Some("subrip".to_string()),
                lang: Some("jpn".to_string()),
                lang_name: Some("Japanese".to_string()),
                title: Some("Full".to_string()),
            }
        );
        assert!(matches!(tracks[1], SubtitleTrack::Embedded { stream: 1, lang: None, .. }));
    }

    #[test]
    fn track_json_shape() {
        let track = SubtitleTrack::External {
            path: "/tv/movie.en.srt".to_string(),
            lang: Some("en".to_string()),
            lang_name: Some("English".to_string()),
        };
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["kind"], "external");
        assert_eq!(json["langName"], "English");
    }

    #[test]
    fn stream_index_parsing() {
        assert_eq!(parse_stream_index(None).unwrap(), 0);
        assert_eq!(parse_stream_index(Some("2")).unwrap(), 2);
        let err = parse_stream_index(Some("two")).unwrap_err();
        assert_eq!(err.body.message, "Invalid stream index.");
        assert!(parse_stream_index(Some("-1")).is_err());
    }
}
