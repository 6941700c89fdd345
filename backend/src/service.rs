//! The ingestion facade shared by all request handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::error::ApiError;
use crate::jobs::{Job, Registry, Workers};
use crate::rank::RankLookup;
use crate::storage::{MatchStorage, StoredMatch};
use crate::SpooledDemo;

pub const SERVICE_NAME: &str = "demo-ingest";

const MAX_MATCH_ID_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_upload_bytes: u64,
    pub spool_dir: Option<std::path::PathBuf>,
    pub retention: Duration,
    pub heatmap: Option<analysis::heatmap::Config>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 500 * 1024 * 1024,
            spool_dir: None,
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            heatmap: Some(analysis::heatmap::Config::default()),
        }
    }
}

pub struct Service {
    pub storage: Arc<dyn MatchStorage>,
    pub cache: Option<ResultCache>,
    pub ranks: Arc<dyn RankLookup>,
    pub registry: Arc<Registry>,
    pub workers: Workers,
    pub settings: Settings,
}

/// Accepts letters, digits, `-` and `_`, since ids end up in file names and urls.
pub fn validate_match_id(match_id: &str) -> Result<(), ApiError> {
    let valid = !match_id.is_empty()
        && match_id.len() <= MAX_MATCH_ID_LEN
        && match_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "match id must be 1 to {} characters of [A-Za-z0-9_-]",
            MAX_MATCH_ID_LEN
        )))
    }
}

impl Service {
    /// Analyses a spooled upload and persists the result.
    ///
    /// The returned future owns the job: dropping it before completion
    /// cancels the analysis and forgets the match id.
    #[tracing::instrument(skip(self, demo), fields(digest = %demo.digest, size = demo.size))]
    pub async fn submit(
        &self,
        demo: SpooledDemo,
        requested_id: Option<String>,
    ) -> Result<Arc<StoredMatch>, ApiError> {
        let match_id = match requested_id {
            Some(id) => {
                validate_match_id(&id)?;
                id
            }
            None => uuid::Uuid::now_v7().to_string(),
        };

        if self.storage.load(match_id.clone()).await?.is_some() {
            return Err(ApiError::Validation(format!(
                "match id {} is already in use",
                match_id
            )));
        }
        let ticket = self.registry.register(&match_id).ok_or_else(|| {
            ApiError::Validation(format!("match id {} is already in use", match_id))
        })?;

        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();

        let result = self.process(&match_id, demo, token).await;
        guard.disarm();

        match result {
            Ok(stored) => {
                tracing::info!(match_id = %match_id, "Job completed");
                ticket.complete(stored.clone());
                Ok(stored)
            }
            Err(e) => {
                tracing::info!(match_id = %match_id, code = e.code(), "Job failed: {}", e);
                ticket.fail(&e);
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        match_id: &str,
        demo: SpooledDemo,
        token: CancellationToken,
    ) -> Result<Arc<StoredMatch>, ApiError> {
        let digest = demo.digest.clone();

        if let Some(cache) = self.cache.as_ref() {
            if let Some(mut cached) = cache.get(&digest).await {
                tracing::info!("Serving from cache");
                cached.statistics.match_id = match_id.to_owned();
                cached.stored_at = chrono::Utc::now();

                self.storage.store(cached.clone()).await?;
                return Ok(Arc::new(cached));
            }
        }

        let input = crate::analysis::AnalysisInput {
            match_id: match_id.to_owned(),
            path: demo.file.path().to_path_buf(),
        };
        let options = analysis::Options {
            heatmap: self.settings.heatmap.clone(),
            ..Default::default()
        };

        let (mut statistics, heatmaps) = self
            .workers
            .run(token, move |token| {
                // Keeps the spool file alive until the worker is done with it
                let _spool = demo;
                crate::analysis::analyse(&input, &options, token)
            })
            .await?;

        crate::rank::enrich(self.ranks.as_ref(), &mut statistics).await;

        let stored = StoredMatch::new(statistics, heatmaps);
        self.storage.store(stored.clone()).await?;

        if let Some(cache) = self.cache.as_ref() {
            cache.put(&digest, &stored).await;
        }

        Ok(Arc::new(stored))
    }

    /// Finished jobs from the registry first, the storage otherwise.
    pub async fn get_match(&self, match_id: &str) -> Result<Arc<StoredMatch>, ApiError> {
        match self.registry.get(match_id) {
            Some(Job::Done { stored, .. }) => return Ok(stored),
            Some(Job::Pending) | Some(Job::Failed { .. }) => {
                return Err(ApiError::NotFound(match_id.to_owned()))
            }
            None => {}
        }

        self.storage
            .load(match_id.to_owned())
            .await?
            .ok_or_else(|| ApiError::NotFound(match_id.to_owned()))
    }

    pub async fn status(&self, match_id: &str) -> Result<common::JobStatusBody, ApiError> {
        let (status, reason) = match self.registry.get(match_id) {
            Some(Job::Failed { code, reason, .. }) => {
                (common::JobState::Failed, Some(format!("{}: {}", code, reason)))
            }
            Some(job) => (job.state(), None),
            None => {
                self.get_match(match_id).await?;
                (common::JobState::Done, None)
            }
        };

        Ok(common::JobStatusBody {
            match_id: match_id.to_owned(),
            status,
            reason,
        })
    }

    pub async fn health(&self) -> Result<common::HealthStatus, ApiError> {
        self.storage
            .ping()
            .await
            .map_err(|e| ApiError::Dependency(e.to_string()))?;

        Ok(common::HealthStatus {
            status: "ok".to_owned(),
            service: SERVICE_NAME.to_owned(),
        })
    }
}
