use crate::error::AppError;
use crate::thumbnails::{MediaThumbnailer, ThumbnailCache};
use crate::transcoder::Transcoder;
use lamery_core::{Catalog, Config, LiveIndex};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::OnceCell;

pub type SharedState = Arc<AppState>;

/// A started live index
pub struct ReadyIndex {
    root: PathBuf,
    catalog: Arc<Catalog>,
    live: Mutex<LiveIndex>,
}

impl ReadyIndex {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}

/// Owns the live index lifecycle. The first caller of [`IndexService::ready`]
/// starts the walk; every concurrent caller awaits that same walk.
pub struct IndexService {
    config: Config,
    cell: OnceCell<ReadyIndex>,
}

impl IndexService {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    pub async fn ready(&self) -> Result<&ReadyIndex, AppError> {
        self.cell
            .get_or_try_init(|| async {
                let config = self.config.clone();
                let live = tokio::task::spawn_blocking(move || LiveIndex::start(&config)).await??;
                Ok::<_, AppError>(ReadyIndex {
                    root: live.root().to_path_buf(),
                    catalog: live.catalog(),
                    live: Mutex::new(live),
                })
            })
            .await
    }

    /// The index if bootstrap has finished, without waiting for it
    pub fn get(&self) -> Option<&ReadyIndex> {
        self.cell.get()
    }

    pub async fn stop(&self) {
        let Some(ready) = self.cell.get() else {
            return;
        };
        tokio::task::block_in_place(|| {
            ready.live.lock().unwrap_or_else(|e| e.into_inner()).stop();
        });
        tracing::info!("storage index stopped");
    }
}

pub struct AppState {
    pub index: IndexService,
    pub thumbnails: ThumbnailCache<MediaThumbnailer>,
    pub transcoder: Transcoder,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let transcoder = Transcoder::new(&config.transcoder);
        let thumbnailer = MediaThumbnailer::new(
            transcoder.clone(),
            config.thumbnails.max_dimension,
            config.thumbnails.quality,
            config.video_seek_cap(),
        );
        let thumbnails = ThumbnailCache::new(config.thumbnail_cache_dir(), thumbnailer);
        Self {
            index: IndexService::new(config),
            thumbnails,
            transcoder,
            started: Instant::now(),
        }
    }
}
