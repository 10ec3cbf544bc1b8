use super::job::JobId;

pub type JobResult<T> = std::result::Result<T, JobError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Format must be either \"audio\" or \"video\"")]
    InvalidFormat(String),

    #[error("Download not found")]
    NotFound(String),

    #[error("download id {0} is already registered")]
    DuplicateId(JobId),
}
