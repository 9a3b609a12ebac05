use crate::archive::{self, ArchiveFormat};
use crate::error::{method_not_allowed, AppError};
use crate::files::{self, Disposition};
use crate::http_cache::{self, Validators, REVALIDATE};
use crate::state::SharedState;
use crate::subtitles::{self, SubtitleTrack};
use crate::thumbnails::{ThumbnailError, ThumbnailFormat};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use lamery_core::index::{IndexStatus, SearchResults, Statistics};
use lamery_core::media::{is_subtitle_ext, FileType};
use lamery_core::path::{normalize_path, storage_to_absolute, ROOT};
use lamery_core::{Entry, FileEntry};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/status", get(status).fallback(method_not_allowed))
        .route("/api/entries/{*path}", get(entry).fallback(method_not_allowed))
        .route("/api/list", get(list).fallback(method_not_allowed))
        .route("/api/list/{*path}", get(list).fallback(method_not_allowed))
        .route("/api/search", get(search).fallback(method_not_allowed))
        .route("/api/search/{*path}", get(search).fallback(method_not_allowed))
        .route("/api/statistics", get(statistics).fallback(method_not_allowed))
        .route("/api/files/{*path}", get(file).fallback(method_not_allowed))
        .route("/api/thumbnails/{*path}", get(thumbnail).fallback(method_not_allowed))
        .route("/api/archives", get(archive).fallback(method_not_allowed))
        .route("/api/archives/{*path}", get(archive).fallback(method_not_allowed))
        .route("/api/tracks/{*path}", get(tracks).fallback(method_not_allowed))
        .route("/api/subtitles/{*path}", get(subtitle).fallback(method_not_allowed))
        .fallback(unknown_route)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn unknown_route(uri: Uri) -> AppError {
    AppError::not_found(uri.path())
}

/// Storage path from an optional wildcard capture
fn storage_path(captured: Option<Path<String>>) -> String {
    match captured {
        Some(Path(raw)) => normalize_path(&raw),
        None => ROOT.to_string(),
    }
}

fn require_file(entry: Option<FileEntry>, path: &str) -> Result<FileEntry, AppError> {
    entry.ok_or_else(|| AppError::not_found(path))
}

// GET /status
#[derive(Serialize)]
pub struct StatusResponse {
    pub ready: bool,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexStatus>,
}

async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let ready = state.index.get();
    Json(StatusResponse {
        ready: ready.is_some(),
        uptime_secs: state.started.elapsed().as_secs(),
        root: ready.map(|r| r.root().display().to_string()),
        index: ready.map(|r| r.catalog().status()),
    })
}

// GET /api/entries/{*path}
async fn entry(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
) -> Result<Json<Entry>, AppError> {
    let index = state.index.ready().await?;
    let path = normalize_path(&raw);
    index
        .catalog()
        .get(&path)
        .map(Json)
        .ok_or_else(|| AppError::not_found(&path))
}

// GET /api/list[/{*path}]?depth=N
#[derive(Deserialize)]
pub struct ListQuery {
    pub depth: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub path: String,
    pub entries: Vec<Entry>,
}

async fn list(
    State(state): State<SharedState>,
    captured: Option<Path<String>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let index = state.index.ready().await?;
    let path = storage_path(captured);
    let depth = match query.depth.as_deref() {
        None => 0,
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| AppError::bad_request(format!("Invalid depth: {}", raw)))?,
    };
    let entries = index
        .catalog()
        .list(&path, depth)
        .ok_or_else(|| AppError::not_found(&path))?;
    Ok(Json(ListResponse { path, entries }))
}

// GET /api/search[/{*path}]?query=...
#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

async fn search(
    State(state): State<SharedState>,
    captured: Option<Path<String>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResults>, AppError> {
    let index = state.index.ready().await?;
    let scope = storage_path(captured);
    if index.catalog().get_directory(&scope).is_none() {
        return Err(AppError::not_found(&scope));
    }

    let catalog = index.catalog().clone();
    let results =
        tokio::task::spawn_blocking(move || catalog.search(&params.query, &scope)).await?;
    Ok(Json(results))
}

// GET /api/statistics
async fn statistics(State(state): State<SharedState>) -> Result<Json<Statistics>, AppError> {
    let catalog = state.index.ready().await?.catalog().clone();
    let stats = tokio::task::spawn_blocking(move || catalog.statistics()).await?;
    Ok(Json(stats))
}

// GET /api/files/{*path}?attach=true
#[derive(Deserialize)]
pub struct FileQuery {
    pub attach: Option<String>,
}

async fn file(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let index = state.index.ready().await?;
    let path = normalize_path(&raw);
    let file = require_file(index.catalog().get_file(&path), &path)?;

    let disposition = match query.attach.as_deref() {
        Some("true") | Some("1") => Disposition::Attachment,
        _ => Disposition::Inline,
    };
    let absolute = storage_to_absolute(index.root(), &file.path);
    files::serve_file(&absolute, &file, &headers, disposition).await
}

// GET /api/thumbnails/{*path}?format=jpeg|webp
#[derive(Deserialize)]
pub struct ThumbnailQuery {
    pub format: Option<String>,
}

async fn thumbnail(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
    Query(query): Query<ThumbnailQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let format = ThumbnailFormat::parse(query.format.as_deref())?;
    let index = state.index.ready().await?;
    let path = normalize_path(&raw);
    let file = require_file(index.catalog().get_file(&path), &path)?;

    if !state.thumbnails.supports(&file) {
        let kind = FileType::from_ext(&file.ext).as_str().to_string();
        return Err(ThumbnailError::Unsupported(kind).into());
    }

    let validators = Validators::for_file(&file);
    if validators.not_modified(&headers) {
        return Ok(files::not_modified(&validators, REVALIDATE));
    }

    let source = storage_to_absolute(index.root(), &file.path);
    let cached = state.thumbnails.get_or_create(&source, &file, format).await?;
    files::serve_whole(&cached, format.content_type(), &validators).await
}

// GET /api/archives[/{*path}]?format=zip|tar
#[derive(Deserialize)]
pub struct ArchiveQuery {
    pub format: Option<String>,
}

async fn archive(
    State(state): State<SharedState>,
    captured: Option<Path<String>>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Response, AppError> {
    if ArchiveFormat::parse(query.format.as_deref())? == ArchiveFormat::Tar {
        return Err(AppError::bad_request("Only zip archives are supported"));
    }

    let index = state.index.ready().await?;
    let path = storage_path(captured);
    let entry = index
        .catalog()
        .get(&path)
        .ok_or_else(|| AppError::not_found(&path))?;

    let root = index.root().to_path_buf();
    let catalog = index.catalog().clone();
    let (entry, members) = tokio::task::spawn_blocking(move || {
        let members = archive::collect_members(&root, &catalog, &entry);
        (entry, members)
    })
    .await?;

    tracing::debug!(path = %path, members = members.len(), "streaming archive");
    Ok(archive::zip_response(&entry, members))
}

// GET /api/tracks/{*path}
async fn tracks(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<SubtitleTrack>>, AppError> {
    let index = state.index.ready().await?;
    let path = normalize_path(&raw);
    let video = require_file(index.catalog().get_file(&path), &path)?;
    if FileType::from_ext(&video.ext) != FileType::Video {
        return Err(AppError::bad_request(format!("Not a video: {}", path)));
    }

    let absolute = storage_to_absolute(index.root(), &video.path);
    let tracks =
        subtitles::list_tracks(&state.transcoder, index.catalog(), &absolute, &video).await;
    Ok(Json(tracks))
}

// GET /api/subtitles/{*path}?stream=N
#[derive(Deserialize)]
pub struct SubtitleQuery {
    pub stream: Option<String>,
}

async fn subtitle(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
    Query(query): Query<SubtitleQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let index = state.index.ready().await?;
    let path = normalize_path(&raw);
    let file = require_file(index.catalog().get_file(&path), &path)?;

    // sidecar files convert whole; videos pick an embedded stream
    let stream = if is_subtitle_ext(&file.ext) {
        None
    } else if FileType::from_ext(&file.ext) == FileType::Video {
        Some(subtitles::parse_stream_index(query.stream.as_deref())?)
    } else {
        return Err(AppError::bad_request(format!(
            "No subtitles can be extracted from {}",
            path
        )));
    };

    let validators = Validators::for_file(&file);
    if validators.not_modified(&headers) {
        return Ok(files::not_modified(&validators, REVALIDATE));
    }

    let absolute = storage_to_absolute(index.root(), &file.path);
    let body = subtitles::webvtt_body(&state.transcoder, &absolute, stream).await?;

    let mut response_headers = HeaderMap::new();
    validators.apply(&mut response_headers, REVALIDATE);
    http_cache::insert(&mut response_headers, CONTENT_TYPE, "text/vtt; charset=utf-8");
    Ok((StatusCode::OK, response_headers, body).into_response())
}
