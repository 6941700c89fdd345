//! In-flight and recently finished jobs.
//!
//! The [`Registry`] is read by any number of requests, but each entry has a
//! single writer: the [`JobTicket`] handed out by [`Registry::register`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use common::JobState;

use crate::error::ApiError;
use crate::storage::StoredMatch;

#[derive(Debug, Clone)]
pub enum Job {
    Pending,
    Done { stored: Arc<StoredMatch>, at: Instant },
    Failed { code: &'static str, reason: String, at: Instant },
}

impl Job {
    pub fn state(&self) -> JobState {
        match self {
            Self::Pending => JobState::Pending,
            Self::Done { .. } => JobState::Done,
            Self::Failed { .. } => JobState::Failed,
        }
    }

    fn finished_at(&self) -> Option<Instant> {
        match self {
            Self::Pending => None,
            Self::Done { at, .. } | Self::Failed { at, .. } => Some(*at),
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    jobs: RwLock<HashMap<String, Job>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims `match_id` for a new job, `None` if it is already taken.
    pub fn register(self: &Arc<Self>, match_id: &str) -> Option<JobTicket> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(match_id) {
            return None;
        }
        jobs.insert(match_id.to_owned(), Job::Pending);

        Some(JobTicket {
            registry: self.clone(),
            match_id: match_id.to_owned(),
            settled: false,
        })
    }

    pub fn get(&self, match_id: &str) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(match_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes finished jobs older than `age`. Pending jobs are never touched.
    pub fn prune(&self, age: Duration) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, job| {
            job.finished_at()
                .map(|at| now.duration_since(at) < age)
                .unwrap_or(true)
        });
        before - jobs.len()
    }

    fn settle(&self, match_id: &str, job: Option<Job>) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match job {
            Some(job) => {
                jobs.insert(match_id.to_owned(), job);
            }
            None => {
                jobs.remove(match_id);
            }
        }
    }
}

/// Write access to one registry entry.
///
/// Consumed by [`JobTicket::complete`] or [`JobTicket::fail`]. Dropping it
/// without either (a cancelled request) removes the entry.
#[derive(Debug)]
pub struct JobTicket {
    registry: Arc<Registry>,
    match_id: String,
    settled: bool,
}

impl JobTicket {
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn complete(mut self, stored: Arc<StoredMatch>) {
        self.settled = true;
        self.registry.settle(
            &self.match_id,
            Some(Job::Done {
                stored,
                at: Instant::now(),
            }),
        );
    }

    pub fn fail(mut self, err: &ApiError) {
        self.settled = true;
        self.registry.settle(
            &self.match_id,
            Some(Job::Failed {
                code: err.code(),
                reason: err.to_string(),
                at: Instant::now(),
            }),
        );
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(match_id = %self.match_id, "Job abandoned");
            self.registry.settle(&self.match_id, None);
        }
    }
}

/// Bounded pool of blocking workers for the CPU heavy part of a job.
#[derive(Debug, Clone)]
pub struct Workers {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Workers {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` on a blocking thread once a worker slot is free.
    ///
    /// The slot is held until `job` returns, even if the caller stopped
    /// waiting for it. On timeout `token` is cancelled so the job can stop
    /// early.
    pub async fn run<T, F>(&self, token: CancellationToken, job: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T, ApiError> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Internal("worker pool is closed".to_owned()))?;

        let job_token = token.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&job_token)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Worker failed: {:?}", e);
                Err(ApiError::Internal("analysis worker panicked".to_owned()))
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Job timed out");
                token.cancel();
                Err(ApiError::Timeout)
            }
        }
    }
}
