//! Boundary to the external media downloader.
//!
//! The job runner only talks to a [`Downloader`]; the concrete backend in
//! this crate drives the `yt-dlp` executable.

use futures::future::BoxFuture;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::mpsc;

use crate::jobs::JobError;

mod ytdlp;
pub use ytdlp::{YtDlp, YtDlpOptions};

#[cfg(test)]
pub mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[default]
    Video,
    Audio,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Video => "video",
            MediaFormat::Audio => "audio",
        }
    }
}

impl FromStr for MediaFormat {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaFormat::Video),
            "audio" => Ok(MediaFormat::Audio),
            other => Err(JobError::InvalidFormat(other.to_string())),
        }
    }
}

/// Audio extraction applied after the download finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranscode {
    pub codec: String,
    pub bitrate_kbps: u32,
}

impl AudioTranscode {
    /// File extension yt-dlp gives the extracted audio for this codec.
    pub fn extension(&self) -> &str {
        match self.codec.as_str() {
            "aac" | "alac" => "m4a",
            "vorbis" => "ogg",
            other => other,
        }
    }
}

impl Default for AudioTranscode {
    fn default() -> Self {
        Self {
            codec: "mp3".to_string(),
            bitrate_kbps: 192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadParams {
    pub format_selector: &'static str,
    pub transcode: Option<AudioTranscode>,
}

impl DownloadParams {
    pub fn for_format(format: MediaFormat, audio: &AudioTranscode) -> Self {
        match format {
            MediaFormat::Video => Self {
                format_selector: "best",
                transcode: None,
            },
            MediaFormat::Audio => Self {
                format_selector: "bestaudio",
                transcode: Some(audio.clone()),
            },
        }
    }

    /// Base name the file will have once post-processing is done. `fetched`
    /// is the file as the download step left it, before audio extraction.
    pub fn output_name(&self, fetched: &Path) -> Option<String> {
        match &self.transcode {
            Some(transcode) => base_name(&fetched.with_extension(transcode.extension())),
            None => base_name(fetched),
        }
    }
}

pub fn base_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub params: DownloadParams,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        /// Exact size when known, otherwise the downloader's estimate.
        total_bytes: Option<u64>,
    },
    Finished {
        filename: PathBuf,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("downloader finished without reporting an output file")]
    MissingOutput,

    #[error("download task aborted: {0}")]
    Aborted(String),
}

pub trait Downloader: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches `request.url` into `request.output_dir`, reporting progress on
    /// `progress` as it goes.
    fn download<'a>(
        &'a self,
        request: &'a DownloadRequest,
        progress: ProgressSender,
    ) -> BoxFuture<'a, Result<DownloadOutcome, DownloadError>>;
}
