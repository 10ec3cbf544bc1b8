use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

use super::{
    DownloadError, DownloadOutcome, DownloadRequest, Downloader, ProgressEvent, ProgressSender,
};

#[derive(Debug, Clone)]
pub enum Ending {
    /// Succeed with `output_dir/<name>`.
    Succeed(String),
    Fail(String),
    Panic,
}

/// In-process downloader that replays a fixed script.
///
/// Events are sent, then the downloader parks on `gate` if one is set, and
/// finally ends the way `ending` says.
pub struct ScriptedDownloader {
    pub events: Vec<ProgressEvent>,
    pub gate: Option<Arc<Notify>>,
    pub ending: Ending,
}

impl ScriptedDownloader {
    pub fn succeeding(name: &str) -> Self {
        Self {
            events: Vec::new(),
            gate: None,
            ending: Ending::Succeed(name.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            events: Vec::new(),
            gate: None,
            ending: Ending::Fail(message.to_string()),
        }
    }

    pub fn with_events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

pub fn downloading(downloaded_bytes: u64, total_bytes: u64) -> ProgressEvent {
    ProgressEvent::Downloading {
        downloaded_bytes,
        total_bytes: Some(total_bytes),
    }
}

impl Downloader for ScriptedDownloader {
    fn name(&self) -> &str {
        "scripted"
    }

    fn download<'a>(
        &'a self,
        request: &'a DownloadRequest,
        progress: ProgressSender,
    ) -> BoxFuture<'a, Result<DownloadOutcome, DownloadError>> {
        Box::pin(async move {
            for event in &self.events {
                let _ = progress.send(event.clone());
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.ending {
                Ending::Succeed(name) => Ok(DownloadOutcome {
                    path: request.output_dir.join(PathBuf::from(name)),
                }),
                Ending::Fail(message) => Err(DownloadError::Failed(message.clone())),
                Ending::Panic => panic!("scripted downloader panicked"),
            }
        })
    }
}
