use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::error::{JobError, JobResult};
use super::job::{Job, JobId};

/// In-memory store of every job issued by this process.
///
/// Records are never evicted, so the map grows for the lifetime of the
/// process.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    next_id: AtomicU64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out the next identifier. Ids are never reused, even across
    /// concurrent callers.
    pub fn allocate_id(&self) -> JobId {
        JobId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts a fresh record and runs `init` on it before the write lock is
    /// released, so readers never observe the record before `init` ran.
    pub async fn create<F>(&self, id: JobId, init: F) -> JobResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(JobError::DuplicateId(id));
        }
        let mut job = Job::new(id.clone());
        init(&mut job);
        jobs.insert(id, job.clone());
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> JobResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Runs `mutator` against the stored record while holding the write lock.
    pub async fn update<F, R>(&self, id: &str, mutator: F) -> JobResult<R>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) => Ok(mutator(job)),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = JobRegistry::new();
        let id = registry.allocate_id();
        assert_eq!(id.as_str(), "1");

        let created = registry.create(id.clone(), |_| ()).await.unwrap();
        assert_eq!(created.id, id);
        assert_eq!(created.status, JobStatus::Pending);

        let fetched = registry.get("1").await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let registry = JobRegistry::new();
        registry.create(JobId::from(3), |_| ()).await.unwrap();
        let err = registry.create(JobId::from(3), Job::begin).await.unwrap_err();
        assert_eq!(err, JobError::DuplicateId(JobId::from(3)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let registry = JobRegistry::new();
        let err = registry.get("999").await.unwrap_err();
        assert_eq!(err, JobError::NotFound("999".to_string()));
        assert_eq!(err.to_string(), "Download not found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_create_applies_init_before_visible() {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.allocate_id();

        let reader = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..1000 {
                    if let Ok(job) = registry.get(id.as_str()).await {
                        return job;
                    }
                    tokio::task::yield_now().await;
                }
                panic!("job {} never appeared", id);
            })
        };

        let created = registry.create(id.clone(), Job::begin).await.unwrap();
        assert_eq!(created.status, JobStatus::Downloading);
        assert_eq!(created.progress, 0);

        let seen = reader.await.unwrap();
        assert_eq!(seen.status, JobStatus::Downloading);
        assert_eq!(registry.get(id.as_str()).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_update() {
        let registry = JobRegistry::new();
        let id = registry.allocate_id();
        registry.create(id.clone(), |_| ()).await.unwrap();

        let progress = registry
            .update(id.as_str(), |job| {
                job.begin();
                job.record_progress(1, 4);
                job.progress
            })
            .await
            .unwrap();
        assert_eq!(progress, 25);
        assert_eq!(registry.get(id.as_str()).await.unwrap().progress, 25);

        let err = registry.update("nope", |job| job.begin()).await.unwrap_err();
        assert_eq!(err, JobError::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn test_ids_unique_under_concurrency() {
        let registry = Arc::new(JobRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let id = registry.allocate_id();
                registry.create(id.clone(), Job::begin).await.unwrap();
                id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 64);
        assert_eq!(registry.len().await, 64);
    }
}
