use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

/// Identifier handed out to clients when a download is started.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        JobId(value.to_string())
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed,
    Error,
}

const FALLBACK_ERROR: &str = "download failed";

/// Tracked lifecycle of one download request.
///
/// `filename` is only ever set while `status` is `Completed` and
/// `error_message` only while it is `Error`. Once a job has failed it is
/// frozen: every transition below becomes a no-op.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub filename: Option<String>,
    #[serde(rename = "error")]
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            filename: None,
            error_message: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Error
    }

    pub fn begin(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Downloading;
            self.progress = 0;
        }
    }

    /// Applies a byte count report. Progress never goes backwards and stays
    /// below 100 until the job completes.
    pub fn record_progress(&mut self, downloaded: u64, total: u64) {
        if self.status != JobStatus::Downloading || total == 0 {
            return;
        }
        let percent = (u128::from(downloaded) * 100 / u128::from(total)).min(99) as u8;
        self.progress = self.progress.max(percent);
    }

    /// Returns false when the transition was refused.
    pub fn complete(&mut self, filename: String) -> bool {
        if self.is_failed() || filename.is_empty() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.filename = Some(filename);
        self.error_message = None;
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_failed() {
            return;
        }
        let mut message = message.into();
        if message.trim().is_empty() {
            message = FALLBACK_ERROR.to_string();
        }
        self.status = JobStatus::Error;
        self.error_message = Some(message);
        self.filename = None;
    }
}
