//! ffmpeg/ffprobe invocation.
//!
//! Every child is spawned with `kill_on_drop`, so dropping the future or the
//! handle (client abort, handler error) terminates the process.

use lamery_core::config::TranscoderConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

const STDERR_LIMIT: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("unreadable probe output: {0}")]
    Probe(#[from] serde_json::Error),
}

/// Output container for an extracted video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Webp,
}

impl FrameFormat {
    fn muxer(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "mjpeg",
            FrameFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Probe {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    #[serde(default)]
    pub format: Option<ProbeFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub codec_name: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    #[serde(default)]
    pub duration: Option<String>,
}

impl Probe {
    pub fn duration(&self) -> Option<Duration> {
        let secs: f64 = self.format.as_ref()?.duration.as_deref()?.parse().ok()?;
        (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    }

    /// Width and height of the first video stream
    pub fn video_dimensions(&self) -> Option<(u32, u32)> {
        self.streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("video"))
            .find_map(|s| Some((s.width?, s.height?)))
    }

    /// Subtitle streams in container order
    pub fn subtitle_streams(&self) -> impl Iterator<Item = &ProbeStream> {
        self.streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("subtitle"))
    }
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Transcoder {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
        }
    }

    /// Container and stream metadata via `ffprobe`
    pub async fn probe(&self, input: &Path) -> Result<Probe, TranscodeError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input);
        let stdout = run(&self.ffprobe, cmd).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }

    /// Grab one frame at `seek`, scaled to exactly `width`x`height` and
    /// encoded at `quality` (1 to 100)
    pub async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        seek: Duration,
        (width, height): (u32, u32),
        format: FrameFormat,
        quality: u8,
    ) -> Result<(), TranscodeError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-y", "-ss"])
            .arg(format!("{:.3}", seek.as_secs_f64()))
            .arg("-i")
            .arg(input)
            .args(["-map", "0:v:0", "-an", "-frames:v", "1", "-vf"])
            .arg(format!("scale={}:{}", width, height))
            .arg("-q:v")
            .arg(qscale(quality).to_string())
            .args(["-f", format.muxer()])
            .arg(output);
        run(&self.ffmpeg, cmd).await.map(|_| ())
    }

    /// Start converting subtitles to WebVTT on stdout.
    ///
    /// With `stream` set, that subtitle stream of a container is selected;
    /// otherwise `input` is itself a subtitle file.
    pub fn spawn_webvtt(&self, input: &Path, stream: Option<usize>) -> Result<Child, TranscodeError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-i"]).arg(input);
        if let Some(stream) = stream {
            cmd.arg("-map").arg(format!("0:s:{}", stream));
        }
        cmd.args(["-f", "webvtt", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd.spawn().map_err(|source| TranscodeError::Spawn {
            program: self.ffmpeg.display().to_string(),
            source,
        })
    }
}

/// ffmpeg's `-q:v` scale runs the other way: lower is better, 1 is best
fn qscale(quality: u8) -> u8 {
    (10 - quality.clamp(1, 100) / 10).max(1)
}

async fn run(program: &Path, mut cmd: Command) -> Result<Vec<u8>, TranscodeError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|source| TranscodeError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.len() > STDERR_LIMIT {
            let cut = (0..=STDERR_LIMIT)
                .rev()
                .find(|i| stderr.is_char_boundary(*i))
                .unwrap_or(0);
            stderr.truncate(cut);
        }
        return Err(TranscodeError::Failed {
            program: program.display().to_string(),
            status: output.status,
            stderr,
        });
    }
    Ok(output.stdout)
}
