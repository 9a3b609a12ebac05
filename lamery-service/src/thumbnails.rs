//! Content-addressed thumbnail cache.
//!
//! Layout: `<cache>/<format>/<key[..2]>/<key>.<ext>` where `key` is derived
//! from the file's weak hash and the output format. A thumbnail is rendered
//! into a temp file next to its final location and renamed into place, so a
//! reader sees either nothing or the complete file.

use crate::transcoder::{FrameFormat, TranscodeError, Transcoder};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use lamery_core::hash::derived_key;
use lamery_core::media::FileType;
use lamery_core::FileEntry;
use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ThumbnailFormat {
    #[default]
    Jpeg,
    Webp,
}

impl ThumbnailFormat {
    /// Parse the `format` query parameter (default jpeg)
    pub fn parse(value: Option<&str>) -> Result<Self, ThumbnailError> {
        match value {
            None | Some("jpeg") | Some("jpg") => Ok(Self::Jpeg),
            Some("webp") => Ok(Self::Webp),
            Some(other) => Err(ThumbnailError::UnknownFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Thumbnails are not available for {0} files")]
    Unsupported(String),

    #[error("Unsupported thumbnail format: {0}")]
    UnknownFormat(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no video stream found")]
    NoVideo,

    #[error("thumbnail task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Renders a thumbnail of `source` into `output`
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    fn supports(&self, file: &FileEntry) -> bool;

    async fn generate(
        &self,
        source: &Path,
        file: &FileEntry,
        format: ThumbnailFormat,
        output: &Path,
    ) -> Result<(), ThumbnailError>;
}

/// Images through the `image` crate, videos through an ffmpeg frame grab
pub struct MediaThumbnailer {
    transcoder: Transcoder,
    max_dimension: u32,
    quality: u8,
    seek_cap: Duration,
}

impl MediaThumbnailer {
    pub fn new(transcoder: Transcoder, max_dimension: u32, quality: u8, seek_cap: Duration) -> Self {
        Self {
            transcoder,
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
            seek_cap,
        }
    }

    async fn video(&self, source: &Path, format: ThumbnailFormat, output: &Path) -> Result<(), ThumbnailError> {
        let probe = self.transcoder.probe(source).await?;
        let dimensions = probe.video_dimensions().ok_or(ThumbnailError::NoVideo)?;
        let seek = probe
            .duration()
            .map(|d| (d / 2).min(self.seek_cap))
            .unwrap_or_default();
        let frame_format = match format {
            ThumbnailFormat::Jpeg => FrameFormat::Jpeg,
            ThumbnailFormat::Webp => FrameFormat::Webp,
        };
        self.transcoder
            .extract_frame(
                source,
                output,
                seek,
                fit_within(dimensions, self.max_dimension),
                frame_format,
                self.quality,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ThumbnailGenerator for MediaThumbnailer {
    fn supports(&self, file: &FileEntry) -> bool {
        matches!(FileType::from_ext(&file.ext), FileType::Image | FileType::Video)
    }

    async fn generate(
        &self,
        source: &Path,
        file: &FileEntry,
        format: ThumbnailFormat,
        output: &Path,
    ) -> Result<(), ThumbnailError> {
        match FileType::from_ext(&file.ext) {
            FileType::Image => {
                let (source, output) = (source.to_path_buf(), output.to_path_buf());
                let (max, quality) = (self.max_dimension, self.quality);
                tokio::task::spawn_blocking(move || render_image(&source, &output, max, quality, format))
                    .await?
            }
            FileType::Video => self.video(source, format, output).await,
            other => Err(ThumbnailError::Unsupported(other.as_str().to_string())),
        }
    }
}

/// Largest size fitting in a `max`-sided square, keeping aspect ratio and never enlarging
pub fn fit_within((width, height): (u32, u32), max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width.max(1), height.max(1));
    }
    let scale = f64::from(max) / f64::from(width.max(height));
    let scaled = |v: u32| ((f64::from(v) * scale).round() as u32).clamp(1, max);
    (scaled(width), scaled(height))
}

fn render_image(
    source: &Path,
    output: &Path,
    max: u32,
    quality: u8,
    format: ThumbnailFormat,
) -> Result<(), ThumbnailError> {
    let image = ImageReader::open(source)?.with_guessed_format()?.decode()?;
    let image = if image.width() > max || image.height() > max {
        image.thumbnail(max, max)
    } else {
        image
    };

    let mut out = BufWriter::new(std::fs::File::create(output)?);
    match format {
        ThumbnailFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
        ThumbnailFormat::Webp => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(&mut out).write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                ExtendedColorType::Rgba8,
            )?;
        }
    }
    out.flush()?;
    Ok(())
}

pub struct ThumbnailCache<G> {
    dir: PathBuf,
    generator: G,
    inflight: InflightMap,
}

impl<G: ThumbnailGenerator> ThumbnailCache<G> {
    pub fn new(dir: PathBuf, generator: G) -> Self {
        Self {
            dir,
            generator,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn supports(&self, file: &FileEntry) -> bool {
        self.generator.supports(file)
    }

    pub fn cache_path(&self, file: &FileEntry, format: ThumbnailFormat) -> PathBuf {
        let key = derived_key(file, format.as_str());
        self.dir
            .join(format.as_str())
            .join(&key[..2])
            .join(format!("{}.{}", key, format.extension()))
    }

    /// Path of the cached thumbnail, rendering it first on a miss.
    ///
    /// Concurrent misses for the same key render once; the rest wait and
    /// reuse the published file.
    pub async fn get_or_create(
        &self,
        source: &Path,
        file: &FileEntry,
        format: ThumbnailFormat,
    ) -> Result<PathBuf, ThumbnailError> {
        if !self.generator.supports(file) {
            return Err(ThumbnailError::Unsupported(
                FileType::from_ext(&file.ext).as_str().to_string(),
            ));
        }

        let path = self.cache_path(file, format);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        let claim = self.claim(derived_key(file, format.as_str()));
        let _guard = claim.lock.lock().await;
        self.render_once(source, file, format, &path).await?;
        Ok(path)
    }

    async fn render_once(
        &self,
        source: &Path,
        file: &FileEntry,
        format: ThumbnailFormat,
        path: &Path,
    ) -> Result<(), ThumbnailError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        let Some(parent) = path.parent() else {
            return Err(ThumbnailError::Io(std::io::Error::other("cache path has no parent")));
        };
        tokio::fs::create_dir_all(parent).await?;

        let temp = tempfile::Builder::new()
            .prefix(".tmp-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(parent)?
            .into_temp_path();

        self.generator.generate(source, file, format, &temp).await?;

        temp.persist(path).map_err(|e| ThumbnailError::Io(e.error))?;
        tracing::debug!(path = %file.path, format = format.as_str(), "thumbnail cached");
        Ok(())
    }

    fn claim(&self, key: String) -> SlotClaim<'_> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(inflight.entry(key.clone()).or_default());
        SlotClaim {
            inflight: &self.inflight,
            key,
            lock,
        }
    }
}

type InflightMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// A request's hold on a render slot. Dropping the last claim for a key
/// removes the slot, including when the request is cancelled mid-render.
struct SlotClaim<'a> {
    inflight: &'a InflightMap,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // one reference lives in the map, one in this claim
        if Arc::strong_count(&self.lock) == 2
            && inflight
                .get(&self.key)
                .is_some_and(|slot| Arc::ptr_eq(slot, &self.lock))
        {
            inflight.remove(&self.key);
        }
    }
}
