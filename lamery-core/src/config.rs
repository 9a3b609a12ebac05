//! Configuration for lamery

use crate::LameryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Lamery Configuration

[storage]
# Directory tree to mirror (overridden by --root / LISTING_PATH)
root = "."

[ignore]
# Glob patterns excluded from the index
patterns = [".git", ".DS_Store", "Thumbs.db"]

[search]
# Allow partial trailing tokens ("mov" matches "movie")
prefix = true
# Edit distance tolerance as a fraction of the query token length
fuzzy = 0.3333
# "and" requires every query token to match, "or" accepts any
combine = "and"
# Maximum matches returned by the search endpoint
max_results = 500

[thumbnails]
# Bounding square for generated thumbnails
max_dimension = 300
# Encoder quality (1-100)
quality = 60
# Video thumbnails seek to the midpoint, capped at this offset
video_seek_cap = "2m"
# Cache directory (defaults to <temp>/lamery/thumbs)
# cache_dir = "/var/cache/lamery/thumbs"

[transcoder]
ffmpeg = "ffmpeg"
ffprobe = "ffprobe"
"#;

/// Lamery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ignore: IgnoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    #[serde(default = "default_ignore_patterns")]
    pub patterns: Vec<String>,
}

/// How multiple query tokens are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Every query token must match some document token
    #[default]
    And,
    /// Any matching token is enough
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_prefix")]
    pub prefix: bool,
    #[serde(default = "default_fuzzy")]
    pub fuzzy: f64,
    #[serde(default)]
    pub combine: CombineMode,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_video_seek_cap")]
    pub video_seek_cap: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".git".to_string(),
        ".DS_Store".to_string(),
        "Thumbs.db".to_string(),
    ]
}
fn default_prefix() -> bool {
    true
}
fn default_fuzzy() -> f64 {
    1.0 / 3.0
}
fn default_max_results() -> usize {
    500
}
fn default_max_dimension() -> u32 {
    300
}
fn default_quality() -> u8 {
    60
}
fn default_video_seek_cap() -> String {
    "2m".to_string()
}
fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            patterns: default_ignore_patterns(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            fuzzy: default_fuzzy(),
            combine: CombineMode::default(),
            max_results: default_max_results(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            quality: default_quality(),
            video_seek_cap: default_video_seek_cap(),
            cache_dir: None,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| LameryError::ConfigParse(e.to_string()))
    }

    /// Maximum seek offset for video thumbnails
    pub fn video_seek_cap(&self) -> Duration {
        parse_duration(&self.thumbnails.video_seek_cap).unwrap_or(Duration::from_secs(120))
    }

    /// Directory holding generated thumbnails
    pub fn thumbnail_cache_dir(&self) -> PathBuf {
        self.thumbnails
            .cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("lamery").join("thumbs"))
    }
}

/// `30s`, `5m`, `1h` or `1d`; a bare number counts seconds
fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let count: u64 = digits.parse().ok()?;

    let scale = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    count.checked_mul(scale).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.storage.root, PathBuf::from("."));
        assert_eq!(config.search.max_results, 500);
        assert_eq!(config.search.combine, CombineMode::And);
        assert_eq!(config.thumbnails.max_dimension, 300);
        assert_eq!(config.thumbnails.quality, 60);
        assert!(config.thumbnails.cache_dir.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.search.prefix);
        assert!((config.search.fuzzy - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(config.ignore.patterns.len(), 3);
        assert_eq!(config.transcoder.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_duration_units() {
        let cases = [("45", 45), ("30s", 30), ("2m", 120), ("1h", 3600), ("1d", 86_400)];
        for (text, secs) in cases {
            assert_eq!(parse_duration(text), Some(Duration::from_secs(secs)), "{}", text);
        }
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5w"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_video_seek_cap() {
        assert_eq!(Config::default().video_seek_cap(), Duration::from_secs(120));

        let config = Config::from_toml("[thumbnails]\nvideo_seek_cap = \"bogus\"").unwrap();
        assert_eq!(config.video_seek_cap(), Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_combine_mode_is_rejected() {
        let err = Config::from_toml("[search]\ncombine = \"xor\"").unwrap_err();
        assert!(matches!(err, LameryError::ConfigParse(_)));
    }
}
