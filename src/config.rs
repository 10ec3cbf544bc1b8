use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::{AudioTranscode, YtDlpOptions};
use crate::jobs::RunnerOptions;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(short, long, default_value_t = 5067, help = "Port to run the application on")]
    pub port: u16,
    #[arg(long, default_value = "0.0.0.0", help = "Host to bind the application to")]
    pub host: String,
    #[arg(
        short,
        long = "download-folder",
        default_value = "downloads",
        help = "Folder to store downloaded files"
    )]
    pub download_folder: PathBuf,
    #[arg(long, help = "Run in debug mode")]
    pub debug: bool,
    #[arg(
        long = "yt-dlp",
        env = "YTDLP_BIN",
        default_value = "yt-dlp",
        help = "yt-dlp executable"
    )]
    pub yt_dlp: PathBuf,
    #[arg(long, default_value = "mp3", help = "Codec for audio downloads")]
    pub audio_codec: String,
    #[arg(long, default_value_t = 192, help = "Audio bitrate in kbps")]
    pub audio_quality: u32,
    #[arg(
        long,
        default_value_t = 10,
        help = "Seconds to wait for running downloads on shutdown"
    )]
    pub shutdown_grace_secs: u64,
}

/// Settings fixed at process start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub debug: bool,
    pub yt_dlp: YtDlpOptions,
    pub audio: AudioTranscode,
    pub shutdown_grace: Duration,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            download_dir: args.download_folder,
            debug: args.debug,
            yt_dlp: YtDlpOptions {
                program: args.yt_dlp,
                ..YtDlpOptions::default()
            },
            audio: AudioTranscode {
                codec: args.audio_codec,
                bitrate_kbps: args.audio_quality,
            },
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
        }
    }
}

impl ServerConfig {
    /// Host and port as handed to the listener; host names are resolved
    /// when binding.
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            output_dir: self.download_dir.clone(),
            audio: self.audio.clone(),
        }
    }
}
