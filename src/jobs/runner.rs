use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use super::error::{JobError, JobResult};
use super::job::{Job, JobId};
use super::registry::JobRegistry;
use crate::downloader::{
    AudioTranscode, DownloadError, DownloadOutcome, DownloadParams, DownloadRequest, Downloader,
    MediaFormat, ProgressEvent, base_name,
};

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub output_dir: PathBuf,
    pub audio: AudioTranscode,
}

/// Launches one background task per download and feeds its progress into
/// the [`JobRegistry`].
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    downloader: Arc<dyn Downloader>,
    options: Arc<RunnerOptions>,
    tasks: TaskTracker,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        downloader: Arc<dyn Downloader>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            registry,
            downloader,
            options: Arc::new(options),
            tasks: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validates raw request fields and starts the job. The url is checked
    /// before the format.
    pub async fn submit(&self, url: Option<&str>, format: &str) -> JobResult<JobId> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let Some(url) = url else {
            return Err(JobError::MissingUrl);
        };
        let format = format.parse::<MediaFormat>()?;
        self.start(url, format).await
    }

    /// Registers a job in the downloading state and returns its id without
    /// waiting for the download itself.
    pub async fn start(&self, url: &str, format: MediaFormat) -> JobResult<JobId> {
        if url.trim().is_empty() {
            return Err(JobError::MissingUrl);
        }

        let id = self.registry.allocate_id();
        self.registry.create(id.clone(), Job::begin).await?;

        let request = DownloadRequest {
            url: url.to_string(),
            params: DownloadParams::for_format(format, &self.options.audio),
            output_dir: self.options.output_dir.clone(),
        };

        tracing::info!(
            job_id = %id,
            url,
            format = format.as_str(),
            downloader = self.downloader.name(),
            "download started"
        );

        self.tasks.spawn(run_job(
            Arc::clone(&self.registry),
            Arc::clone(&self.downloader),
            id.clone(),
            request,
        ));

        Ok(id)
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Closes the task tracker and waits up to `grace` for running
    /// downloads. Returns true when every job finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(
                pending,
                tracked = self.registry.len().await,
                "waiting for in-flight downloads"
            );
        }
        tokio::time::timeout(grace, self.tasks.wait()).await.is_ok()
    }
}

async fn run_job(
    registry: Arc<JobRegistry>,
    downloader: Arc<dyn Downloader>,
    id: JobId,
    request: DownloadRequest,
) {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let params = request.params.clone();

    // Run the download in its own task so a panic inside the downloader
    // surfaces as a JoinError instead of leaving the job downloading.
    let download =
        tokio::spawn(async move { downloader.download(&request, progress_tx).await });

    while let Some(event) = progress_rx.recv().await {
        apply_event(&registry, &id, &params, event).await;
    }

    let outcome = match download.await {
        Ok(outcome) => outcome,
        Err(err) => Err(DownloadError::Aborted(err.to_string())),
    };

    finish(&registry, &id, outcome).await;
}

async fn apply_event(
    registry: &JobRegistry,
    id: &JobId,
    params: &DownloadParams,
    event: ProgressEvent,
) {
    let result = match event {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes: Some(total),
        } => {
            registry
                .update(id.as_str(), |job| job.record_progress(downloaded_bytes, total))
                .await
        }
        ProgressEvent::Downloading {
            total_bytes: None, ..
        } => Ok(()),
        ProgressEvent::Finished { filename } => match params.output_name(&filename) {
            Some(name) => {
                tracing::debug!(job_id = %id, filename = %name, "downloader finished file");
                registry
                    .update(id.as_str(), |job| {
                        job.complete(name);
                    })
                    .await
            }
            None => Ok(()),
        },
    };

    if let Err(err) = result {
        tracing::error!(job_id = %id, error = %err, "dropping progress event");
    }
}

/// Settles the job. The outcome path is the post-processed file, so its name
/// is recorded unchanged.
async fn finish(
    registry: &JobRegistry,
    id: &JobId,
    outcome: Result<DownloadOutcome, DownloadError>,
) {
    let result = match outcome.map(|o| base_name(&o.path)) {
        Ok(Some(name)) => {
            tracing::info!(job_id = %id, filename = %name, "download completed");
            registry
                .update(id.as_str(), |job| {
                    job.complete(name);
                })
                .await
        }
        Ok(None) => {
            tracing::warn!(job_id = %id, "download produced no usable file name");
            registry
                .update(id.as_str(), |job| {
                    job.fail(DownloadError::MissingOutput.to_string())
                })
                .await
        }
        Err(err) => {
            tracing::warn!(job_id = %id, error = %err, "download failed");
            registry
                .update(id.as_str(), |job| job.fail(err.to_string()))
                .await
        }
    };

    if let Err(err) = result {
        tracing::error!(job_id = %id, error = %err, "job vanished before completion");
    }
}
